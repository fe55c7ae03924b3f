use super::mappers::pending_operation_from_row;
use super::rows::PendingOperationRow;
use crate::application::ports::operation_store::{AttemptUpdate, OperationStore};
use crate::domain::entities::PendingOperation;
use crate::domain::value_objects::{ClientId, OperationPayload, OperationStatus};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;

#[derive(Clone)]
pub struct SqliteOperationStore {
    pool: ConnectionPool,
}

impl SqliteOperationStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationStore for SqliteOperationStore {
    async fn insert(&self, operation: &PendingOperation) -> Result<Option<i64>, AppError> {
        // エンコードできないペイロードは書き込み前に弾く
        let payload = operation.payload.to_json_string()?;
        let now = Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO pending_operations (
                client_id, kind, target, payload, status, attempts,
                last_error, created_at, updated_at, next_attempt_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(client_id) DO NOTHING
            "#,
        )
        .bind(operation.client_id.as_str())
        .bind(operation.kind.as_str())
        .bind(operation.target.key())
        .bind(&payload)
        .bind(operation.status.as_str())
        .bind(i64::from(operation.attempts))
        .bind(&operation.last_error)
        .bind(operation.created_at.timestamp_millis())
        .bind(now)
        .bind(operation.next_attempt_at.map(|at| at.timestamp_millis()))
        .execute(self.pool.get_pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(result.last_insert_rowid()))
    }

    async fn list(&self) -> Result<Vec<PendingOperation>, AppError> {
        let rows = sqlx::query_as::<_, PendingOperationRow>(
            r#"
            SELECT * FROM pending_operations
            ORDER BY sequence ASC
            "#,
        )
        .fetch_all(self.pool.get_pool())
        .await?;

        rows.into_iter().map(pending_operation_from_row).collect()
    }

    async fn get(&self, client_id: &ClientId) -> Result<Option<PendingOperation>, AppError> {
        let row = sqlx::query_as::<_, PendingOperationRow>(
            r#"
            SELECT * FROM pending_operations
            WHERE client_id = ?1
            "#,
        )
        .bind(client_id.as_str())
        .fetch_optional(self.pool.get_pool())
        .await?;

        row.map(pending_operation_from_row).transpose()
    }

    async fn update_status(
        &self,
        client_id: &ClientId,
        status: OperationStatus,
        error: Option<&str>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET status = ?1, last_error = COALESCE(?2, last_error), updated_at = ?3
            WHERE client_id = ?4
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now().timestamp_millis())
        .bind(client_id.as_str())
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_attempt(
        &self,
        client_id: &ClientId,
        update: &AttemptUpdate,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET status = ?1, attempts = ?2, last_error = ?3,
                next_attempt_at = ?4, updated_at = ?5
            WHERE client_id = ?6
            "#,
        )
        .bind(update.status.as_str())
        .bind(i64::from(update.attempts))
        .bind(&update.last_error)
        .bind(update.next_attempt_at.map(|at| at.timestamp_millis()))
        .bind(Utc::now().timestamp_millis())
        .bind(client_id.as_str())
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_payload(
        &self,
        client_id: &ClientId,
        payload: &OperationPayload,
    ) -> Result<bool, AppError> {
        let payload = payload.to_json_string()?;
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET payload = ?1, updated_at = ?2
            WHERE client_id = ?3
            "#,
        )
        .bind(&payload)
        .bind(Utc::now().timestamp_millis())
        .bind(client_id.as_str())
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, client_id: &ClientId) -> Result<bool, AppError> {
        let result = sqlx::query(r#"DELETE FROM pending_operations WHERE client_id = ?1"#)
            .bind(client_id.as_str())
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_status(
        &self,
        from: OperationStatus,
        to: OperationStatus,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_operations
            SET status = ?1, updated_at = ?2
            WHERE status = ?3
            "#,
        )
        .bind(to.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(from.as_str())
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected())
    }
}
