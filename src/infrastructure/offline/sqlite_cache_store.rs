use super::mappers::cached_item_from_row;
use super::rows::CachedItemRow;
use crate::application::ports::cache_store::CacheStore;
use crate::domain::entities::{CachedItem, ItemState};
use crate::domain::value_objects::{ClientId, Scope};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, Transaction};

const UPSERT_SQL: &str = r#"
    INSERT INTO cached_items (
        item_key, scope, server_id, client_id, version,
        created_at, state, body, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(item_key) DO UPDATE SET
        scope = excluded.scope,
        server_id = excluded.server_id,
        client_id = COALESCE(excluded.client_id, cached_items.client_id),
        version = excluded.version,
        created_at = excluded.created_at,
        state = excluded.state,
        body = excluded.body,
        updated_at = excluded.updated_at
    WHERE excluded.version >= cached_items.version
"#;

#[derive(Clone)]
pub struct SqliteCacheStore {
    pool: ConnectionPool,
}

impl SqliteCacheStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    async fn upsert_in(
        tx: &mut Transaction<'_, Sqlite>,
        item: &CachedItem,
    ) -> Result<(), AppError> {
        let key = item.item_key().ok_or_else(|| {
            AppError::Validation("Cached item requires a server_id or client_id".to_string())
        })?;
        let body = serde_json::to_string(&item.body)?;

        sqlx::query(UPSERT_SQL)
            .bind(&key)
            .bind(item.scope.key())
            .bind(&item.server_id)
            .bind(item.client_id.as_ref().map(ClientId::as_str))
            .bind(item.version)
            .bind(item.created_at.timestamp_millis())
            .bind(item.state.as_str())
            .bind(&body)
            .bind(Utc::now().timestamp_millis())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn upsert(&self, item: &CachedItem) -> Result<(), AppError> {
        let mut tx = self.pool.get_pool().begin().await?;
        Self::upsert_in(&mut tx, item).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_provisional(
        &self,
        client_id: &ClientId,
        item: &CachedItem,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query(r#"DELETE FROM cached_items WHERE item_key = ?1"#)
            .bind(CachedItem::provisional_key(client_id))
            .execute(&mut *tx)
            .await?;
        Self::upsert_in(&mut tx, item).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_scope(&self, scope: &Scope) -> Result<Vec<CachedItem>, AppError> {
        let rows = sqlx::query_as::<_, CachedItemRow>(
            r#"
            SELECT * FROM cached_items
            WHERE scope = ?1
            ORDER BY created_at DESC, version DESC, item_key ASC
            "#,
        )
        .bind(scope.key())
        .fetch_all(self.pool.get_pool())
        .await?;

        rows.into_iter().map(cached_item_from_row).collect()
    }

    async fn set_client_state(
        &self,
        client_id: &ClientId,
        state: ItemState,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE cached_items
            SET state = ?1, updated_at = ?2
            WHERE client_id = ?3 AND state != 'confirmed'
            "#,
        )
        .bind(state.as_str())
        .bind(Utc::now().timestamp_millis())
        .bind(client_id.as_str())
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_server_item(&self, scope: &Scope, server_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM cached_items
            WHERE scope = ?1 AND server_id = ?2
            "#,
        )
        .bind(scope.key())
        .bind(server_id)
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_unconfirmed_for_client(&self, client_id: &ClientId) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM cached_items
            WHERE client_id = ?1 AND state != 'confirmed'
            "#,
        )
        .bind(client_id.as_str())
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<u64, AppError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.get_pool().begin().await?;
        let mut removed = 0;
        for key in keys {
            let result = sqlx::query(r#"DELETE FROM cached_items WHERE item_key = ?1"#)
                .bind(key)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;

        Ok(removed)
    }
}
