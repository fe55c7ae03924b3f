use crate::domain::entities::CachedItem;
use crate::domain::value_objects::{ClientId, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// バックエンドが確定させたアイテム（送信応答・プッシュ共通）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedItem {
    pub server_id: String,
    pub client_id: Option<ClientId>,
    pub scope: Scope,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub body: Value,
}

impl ConfirmedItem {
    pub fn into_cached(self) -> CachedItem {
        CachedItem::confirmed(
            self.server_id,
            self.client_id,
            self.scope,
            self.version,
            self.created_at,
            self.body,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum RealtimeEvent {
    Created(ConfirmedItem),
    Deleted { scope: Scope, server_id: String },
}

impl RealtimeEvent {
    pub fn scope(&self) -> &Scope {
        match self {
            RealtimeEvent::Created(item) => &item.scope,
            RealtimeEvent::Deleted { scope, .. } => scope,
        }
    }
}
