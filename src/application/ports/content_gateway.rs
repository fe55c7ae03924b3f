use crate::domain::entities::{ConfirmedItem, PendingOperation};
use crate::domain::value_objects::{ClientId, OperationKind, OperationPayload, Scope};
use crate::shared::error::AppError;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub client_id: ClientId,
    pub kind: OperationKind,
    pub target: Scope,
    pub payload: OperationPayload,
}

impl From<&PendingOperation> for SubmitRequest {
    fn from(operation: &PendingOperation) -> Self {
        Self {
            client_id: operation.client_id.clone(),
            kind: operation.kind,
            target: operation.target.clone(),
            payload: operation.payload.clone(),
        }
    }
}

/// 投稿作成・メッセージ送信エンドポイント
///
/// client_id で冪等であること（重複送信には最初の結果を返す）。
/// 一時的な障害は `AppError::TransientNetwork`、検証拒否は `AppError::Validation` で返す。
#[async_trait]
pub trait ContentGateway: Send + Sync {
    async fn submit(&self, request: SubmitRequest) -> Result<ConfirmedItem, AppError>;
}
