use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingOperationRow {
    pub sequence: i64,
    pub client_id: String,
    pub kind: String,
    pub target: String,
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub next_attempt_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CachedItemRow {
    pub item_key: String,
    pub scope: String,
    pub server_id: Option<String>,
    pub client_id: Option<String>,
    pub version: i64,
    pub created_at: i64,
    pub state: String,
    pub body: String,
    pub updated_at: i64,
}
