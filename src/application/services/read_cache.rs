use crate::application::ports::cache_store::CacheStore;
use crate::application::services::operation_queue::OperationQueue;
use crate::domain::entities::{CachedItem, ItemState, PendingOperation};
use crate::domain::value_objects::{ClientId, Scope};
use crate::shared::error::AppError;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct CachePage {
    pub items: Vec<CachedItem>,
    pub next_cursor: Option<String>,
}

/// 最後に取得できたサーバーアイテムを保持するスコープ単位の有界キャッシュ
pub struct ReadCache {
    store: Arc<dyn CacheStore>,
    queue: Arc<OperationQueue>,
    max_items: usize,
    default_page_size: usize,
}

type OrderKey = (Reverse<i64>, Reverse<i64>, String);

fn order_key(item: &CachedItem) -> OrderKey {
    (
        Reverse(item.created_at.timestamp_millis()),
        Reverse(item.version),
        item.item_key().unwrap_or_default(),
    )
}

fn encode_cursor(item: &CachedItem) -> String {
    format!(
        "{}:{}:{}",
        item.created_at.timestamp_millis(),
        item.version,
        item.item_key().unwrap_or_default()
    )
}

fn decode_cursor(cursor: &str) -> Result<OrderKey, AppError> {
    let invalid = || AppError::Validation(format!("Invalid cache cursor: {cursor}"));
    let mut parts = cursor.splitn(3, ':');
    let created_at = parts
        .next()
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(invalid)?;
    let version = parts
        .next()
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(invalid)?;
    let key = parts.next().ok_or_else(invalid)?;
    Ok((Reverse(created_at), Reverse(version), key.to_string()))
}

/// 同じ client_id のコピーを 1 件にまとめる（確定版を優先）
fn collapse(items: Vec<CachedItem>) -> Vec<CachedItem> {
    let mut by_client: HashMap<ClientId, usize> = HashMap::new();
    let mut collapsed: Vec<CachedItem> = Vec::with_capacity(items.len());

    for item in items {
        if let Some(client_id) = item.client_id.clone() {
            if let Some(&idx) = by_client.get(&client_id) {
                if item.is_confirmed() && !collapsed[idx].is_confirmed() {
                    collapsed[idx] = item;
                }
                continue;
            }
            by_client.insert(client_id, collapsed.len());
        }
        collapsed.push(item);
    }

    collapsed.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
    collapsed
}

impl ReadCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        queue: Arc<OperationQueue>,
        max_items: usize,
        default_page_size: usize,
    ) -> Self {
        Self {
            store,
            queue,
            max_items: max_items.max(1),
            default_page_size: default_page_size.max(1),
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub async fn upsert(&self, item: CachedItem) -> Result<(), AppError> {
        self.upsert_batch(vec![item]).await
    }

    /// 一括 upsert 後、触れたスコープごとに上限超過分を退避する
    pub async fn upsert_batch(&self, items: Vec<CachedItem>) -> Result<(), AppError> {
        let mut scopes = BTreeSet::new();
        for item in &items {
            self.store.upsert(item).await?;
            scopes.insert(item.scope.clone());
        }
        for scope in scopes {
            self.evict_beyond(&scope, self.max_items).await?;
        }
        Ok(())
    }

    /// 楽観的表示用の仮アイテムを作る
    pub async fn insert_provisional(
        &self,
        operation: &PendingOperation,
    ) -> Result<CachedItem, AppError> {
        let item = CachedItem::provisional(
            operation.client_id.clone(),
            operation.target.clone(),
            operation.created_at,
            operation.payload.display_body(),
        );
        self.upsert(item.clone()).await?;
        Ok(item)
    }

    /// 仮アイテムを確定アイテムで置き換える（client_id で突き合わせ）
    pub async fn replace_provisional(
        &self,
        client_id: &ClientId,
        item: CachedItem,
    ) -> Result<(), AppError> {
        let scope = item.scope.clone();
        self.store.replace_provisional(client_id, &item).await?;
        self.evict_beyond(&scope, self.max_items).await?;
        Ok(())
    }

    pub async fn mark_client_state(
        &self,
        client_id: &ClientId,
        state: ItemState,
    ) -> Result<u64, AppError> {
        self.store.set_client_state(client_id, state).await
    }

    /// 削除イベントの反映。ローカルに無い ID は ConflictIgnorable
    pub async fn remove_server_item(&self, scope: &Scope, server_id: &str) -> Result<(), AppError> {
        if !self.store.delete_server_item(scope, server_id).await? {
            return Err(AppError::ConflictIgnorable(format!(
                "{server_id} is not cached in {scope}"
            )));
        }
        Ok(())
    }

    pub async fn remove_client_item(&self, client_id: &ClientId) -> Result<u64, AppError> {
        self.store.delete_unconfirmed_for_client(client_id).await
    }

    /// 表示用アイテム（重複除去済み・新しい順）
    pub async fn visible(&self, scope: &Scope) -> Result<Vec<CachedItem>, AppError> {
        Ok(collapse(self.store.list_scope(scope).await?))
    }

    pub async fn len(&self, scope: &Scope) -> Result<usize, AppError> {
        Ok(self.visible(scope).await?.len())
    }

    pub async fn get(
        &self,
        scope: &Scope,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<CachePage, AppError> {
        let limit = if limit == 0 {
            self.default_page_size
        } else {
            limit
        };
        let after = cursor.map(decode_cursor).transpose()?;

        let mut remaining = self
            .visible(scope)
            .await?
            .into_iter()
            .filter(|item| match &after {
                Some(after) => order_key(item).cmp(after) == Ordering::Greater,
                None => true,
            })
            .peekable();

        let mut items = Vec::with_capacity(limit);
        while items.len() < limit {
            match remaining.next() {
                Some(item) => items.push(item),
                None => break,
            }
        }

        let next_cursor = if remaining.peek().is_some() {
            items.last().map(encode_cursor)
        } else {
            None
        };

        Ok(CachePage { items, next_cursor })
    }

    /// 上限を超えた分を古い確定アイテムから退避する。未確定操作に紐づくアイテムは残す
    pub async fn evict_beyond(&self, scope: &Scope, max_items: usize) -> Result<usize, AppError> {
        let rows = self.store.list_scope(scope).await?;
        let visible = collapse(rows.clone());
        if visible.len() <= max_items {
            return Ok(0);
        }

        let pinned = self.queue.unresolved_client_ids(scope).await?;
        let is_pinned = |item: &CachedItem| {
            item.client_id
                .as_ref()
                .map_or(false, |client_id| pinned.contains(client_id))
        };

        // 古い順、確定済みを先に
        let mut candidates: Vec<&CachedItem> =
            visible.iter().rev().filter(|item| !is_pinned(item)).collect();
        candidates.sort_by_key(|item| !item.is_confirmed());

        let excess = visible.len() - max_items;
        let mut keys = Vec::new();
        let mut evicted = 0;
        for item in candidates.into_iter().take(excess) {
            match &item.client_id {
                Some(client_id) => keys.extend(
                    rows.iter()
                        .filter(|row| row.client_id.as_ref() == Some(client_id))
                        .filter_map(CachedItem::item_key),
                ),
                None => keys.extend(item.item_key()),
            }
            evicted += 1;
        }

        self.store.delete_keys(&keys).await?;

        if evicted > 0 {
            tracing::debug!(
                target: "offline::cache",
                scope = %scope,
                evicted,
                max_items,
                "evicted cached items beyond cap"
            );
        }
        if visible.len() - evicted > max_items {
            tracing::warn!(
                target: "offline::cache",
                scope = %scope,
                pinned = pinned.len(),
                "cache stays above cap because pending items are pinned"
            );
        }

        Ok(evicted)
    }
}
