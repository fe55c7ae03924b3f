use crate::domain::value_objects::{
    ClientId, OperationKind, OperationPayload, OperationStatus, Scope,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub client_id: ClientId,
    pub kind: OperationKind,
    pub payload: OperationPayload,
    pub target: Scope,
    pub status: OperationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// ストレージが採番する挿入順
    pub sequence: Option<i64>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl PendingOperation {
    /// ユーザー操作の時点で client_id を採番する
    pub fn new(kind: OperationKind, target: Scope, payload: OperationPayload) -> Self {
        Self::with_client_id(ClientId::generate(), kind, target, payload)
    }

    pub fn with_client_id(
        client_id: ClientId,
        kind: OperationKind,
        target: Scope,
        payload: OperationPayload,
    ) -> Self {
        Self {
            client_id,
            kind,
            payload,
            target,
            status: OperationStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            sequence: None,
            next_attempt_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }

    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed
    }
}
