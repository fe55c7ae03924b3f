use crate::domain::entities::PendingOperation;
use crate::domain::value_objects::{ClientId, OperationPayload, OperationStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 送信試行の結果として記録する内容
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptUpdate {
    pub status: OperationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// 永続化されたオフライン操作キュー
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// 追加した場合は採番された sequence、既存の client_id なら None
    async fn insert(&self, operation: &PendingOperation) -> Result<Option<i64>, AppError>;

    /// 挿入順で全件取得
    async fn list(&self) -> Result<Vec<PendingOperation>, AppError>;

    async fn get(&self, client_id: &ClientId) -> Result<Option<PendingOperation>, AppError>;

    async fn update_status(
        &self,
        client_id: &ClientId,
        status: OperationStatus,
        error: Option<&str>,
    ) -> Result<bool, AppError>;

    async fn save_attempt(
        &self,
        client_id: &ClientId,
        update: &AttemptUpdate,
    ) -> Result<bool, AppError>;

    async fn update_payload(
        &self,
        client_id: &ClientId,
        payload: &OperationPayload,
    ) -> Result<bool, AppError>;

    async fn delete(&self, client_id: &ClientId) -> Result<bool, AppError>;

    /// from 状態の操作をまとめて to 状態へ戻す
    async fn reset_status(
        &self,
        from: OperationStatus,
        to: OperationStatus,
    ) -> Result<u64, AppError>;
}
