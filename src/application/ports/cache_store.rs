use crate::domain::entities::{CachedItem, ItemState};
use crate::domain::value_objects::{ClientId, Scope};
use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn upsert(&self, item: &CachedItem) -> Result<(), AppError>;

    /// 仮アイテムを確定アイテムで置き換える（1 トランザクション）
    async fn replace_provisional(
        &self,
        client_id: &ClientId,
        item: &CachedItem,
    ) -> Result<(), AppError>;

    /// スコープ内の全アイテム（新しい順）
    async fn list_scope(&self, scope: &Scope) -> Result<Vec<CachedItem>, AppError>;

    async fn set_client_state(
        &self,
        client_id: &ClientId,
        state: ItemState,
    ) -> Result<u64, AppError>;

    async fn delete_server_item(&self, scope: &Scope, server_id: &str) -> Result<bool, AppError>;

    /// client_id に紐づく未確定アイテムを削除
    async fn delete_unconfirmed_for_client(&self, client_id: &ClientId) -> Result<u64, AppError>;

    async fn delete_keys(&self, keys: &[String]) -> Result<u64, AppError>;
}
