use crate::application::ports::operation_store::{AttemptUpdate, OperationStore};
use crate::domain::entities::PendingOperation;
use crate::domain::value_objects::{ClientId, OperationPayload, OperationStatus, Scope};
use crate::shared::error::AppError;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued { sequence: i64 },
    /// 同じ client_id の操作が既にキューにある
    AlreadyQueued,
}

/// 未確定のユーザー操作を保持する永続 FIFO キュー
pub struct OperationQueue {
    store: Arc<dyn OperationStore>,
}

impl OperationQueue {
    pub fn new(store: Arc<dyn OperationStore>) -> Self {
        Self { store }
    }

    pub async fn enqueue(&self, mut operation: PendingOperation) -> Result<EnqueueOutcome, AppError> {
        operation.status = OperationStatus::Queued;
        operation.sequence = None;

        match self.store.insert(&operation).await? {
            Some(sequence) => {
                tracing::debug!(
                    target: "offline::queue",
                    client_id = %operation.client_id,
                    kind = operation.kind.as_str(),
                    scope = %operation.target,
                    sequence,
                    "operation enqueued"
                );
                Ok(EnqueueOutcome::Queued { sequence })
            }
            None => {
                tracing::debug!(
                    target: "offline::queue",
                    client_id = %operation.client_id,
                    "operation already queued"
                );
                Ok(EnqueueOutcome::AlreadyQueued)
            }
        }
    }

    /// 作成順（挿入順）で返す
    pub async fn list(&self) -> Result<Vec<PendingOperation>, AppError> {
        self.store.list().await
    }

    pub async fn get(&self, client_id: &ClientId) -> Result<Option<PendingOperation>, AppError> {
        self.store.get(client_id).await
    }

    pub async fn contains(&self, client_id: &ClientId) -> Result<bool, AppError> {
        Ok(self.store.get(client_id).await?.is_some())
    }

    pub async fn mark_status(
        &self,
        client_id: &ClientId,
        status: OperationStatus,
        error: Option<&str>,
    ) -> Result<(), AppError> {
        if !self.store.update_status(client_id, status, error).await? {
            return Err(AppError::NotFound(format!("Pending operation {client_id}")));
        }
        Ok(())
    }

    pub async fn record_attempt(
        &self,
        client_id: &ClientId,
        update: AttemptUpdate,
    ) -> Result<(), AppError> {
        if !self.store.save_attempt(client_id, &update).await? {
            return Err(AppError::NotFound(format!("Pending operation {client_id}")));
        }
        Ok(())
    }

    pub async fn update_payload(
        &self,
        client_id: &ClientId,
        payload: &OperationPayload,
    ) -> Result<(), AppError> {
        if !self.store.update_payload(client_id, payload).await? {
            return Err(AppError::NotFound(format!("Pending operation {client_id}")));
        }
        Ok(())
    }

    pub async fn remove(&self, client_id: &ClientId) -> Result<bool, AppError> {
        let removed = self.store.delete(client_id).await?;
        if removed {
            tracing::debug!(target: "offline::queue", client_id = %client_id, "operation removed");
        }
        Ok(removed)
    }

    pub async fn failed(&self) -> Result<Vec<PendingOperation>, AppError> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(PendingOperation::is_failed)
            .collect())
    }

    /// キャッシュから退避してはいけない client_id
    pub async fn unresolved_client_ids(&self, scope: &Scope) -> Result<HashSet<ClientId>, AppError> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|op| &op.target == scope && op.status.is_unresolved())
            .map(|op| op.client_id)
            .collect())
    }

    /// 前回セッションで送信途中だった操作を queued に戻す
    pub async fn recover_interrupted(&self) -> Result<u64, AppError> {
        let recovered = self
            .store
            .reset_status(OperationStatus::Submitting, OperationStatus::Queued)
            .await?;
        if recovered > 0 {
            tracing::info!(
                target: "offline::queue",
                recovered,
                "requeued operations interrupted mid-submission"
            );
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::OperationKind;
    use crate::infrastructure::database::ConnectionPool;
    use crate::infrastructure::offline::SqliteOperationStore;

    async fn setup_queue() -> OperationQueue {
        let pool = ConnectionPool::from_memory().await.unwrap();
        pool.migrate().await.unwrap();
        OperationQueue::new(Arc::new(SqliteOperationStore::new(pool)))
    }

    fn post(client_id: &str, scope: Scope) -> PendingOperation {
        PendingOperation::with_client_id(
            ClientId::new(client_id.into()).unwrap(),
            OperationKind::CreatePost,
            scope,
            OperationPayload::text(client_id),
        )
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_per_client_id() {
        let queue = setup_queue().await;

        let first = queue.enqueue(post("c1", Scope::global_feed())).await.unwrap();
        let second = queue.enqueue(post("c1", Scope::global_feed())).await.unwrap();

        assert!(matches!(first, EnqueueOutcome::Queued { .. }));
        assert_eq!(second, EnqueueOutcome::AlreadyQueued);
        assert_eq!(queue.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_resets_status_to_queued() {
        let queue = setup_queue().await;
        let mut op = post("c1", Scope::global_feed());
        op.status = OperationStatus::Failed;

        queue.enqueue(op).await.unwrap();

        let stored = queue
            .get(&ClientId::new("c1".into()).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, OperationStatus::Queued);
    }

    #[tokio::test]
    async fn test_mark_status_on_missing_operation_is_not_found() {
        let queue = setup_queue().await;
        let err = queue
            .mark_status(
                &ClientId::new("missing".into()).unwrap(),
                OperationStatus::Failed,
                Some("boom"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unresolved_client_ids_are_scoped() {
        let queue = setup_queue().await;
        let room = Scope::conversation("room").unwrap();

        queue.enqueue(post("c1", Scope::global_feed())).await.unwrap();
        queue.enqueue(post("c2", room.clone())).await.unwrap();
        queue
            .mark_status(
                &ClientId::new("c2".into()).unwrap(),
                OperationStatus::Failed,
                Some("rejected"),
            )
            .await
            .unwrap();

        let pinned = queue.unresolved_client_ids(&room).await.unwrap();
        assert_eq!(pinned.len(), 1);
        assert!(pinned.contains(&ClientId::new("c2".into()).unwrap()));

        let failed = queue.failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("rejected"));
    }
}
