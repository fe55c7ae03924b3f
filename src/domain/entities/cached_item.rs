use crate::domain::value_objects::{ClientId, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// 楽観的に表示中（サーバー未確認）
    Provisional,
    Confirmed,
    /// 送信が最終的に失敗した
    Unconfirmed,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Provisional => "provisional",
            ItemState::Confirmed => "confirmed",
            ItemState::Unconfirmed => "unconfirmed",
        }
    }
}

impl FromStr for ItemState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "provisional" => Ok(ItemState::Provisional),
            "confirmed" => Ok(ItemState::Confirmed),
            "unconfirmed" => Ok(ItemState::Unconfirmed),
            other => Err(format!("Unknown cached item state: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedItem {
    pub server_id: Option<String>,
    pub client_id: Option<ClientId>,
    pub scope: Scope,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub body: Value,
    pub state: ItemState,
}

impl CachedItem {
    pub fn provisional(
        client_id: ClientId,
        scope: Scope,
        created_at: DateTime<Utc>,
        body: Value,
    ) -> Self {
        Self {
            server_id: None,
            client_id: Some(client_id),
            scope,
            version: 0,
            created_at,
            body,
            state: ItemState::Provisional,
        }
    }

    pub fn confirmed(
        server_id: String,
        client_id: Option<ClientId>,
        scope: Scope,
        version: i64,
        created_at: DateTime<Utc>,
        body: Value,
    ) -> Self {
        Self {
            server_id: Some(server_id),
            client_id,
            scope,
            version,
            created_at,
            body,
            state: ItemState::Confirmed,
        }
    }

    /// ストレージ上のキー。server_id が無い間は client_id から導出する
    pub fn item_key(&self) -> Option<String> {
        match (&self.server_id, &self.client_id) {
            (Some(server_id), _) => Some(server_id.clone()),
            (None, Some(client_id)) => Some(Self::provisional_key(client_id)),
            (None, None) => None,
        }
    }

    pub fn provisional_key(client_id: &ClientId) -> String {
        format!("client:{client_id}")
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == ItemState::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_key_prefers_server_id() {
        let client_id = ClientId::new("c1".into()).unwrap();
        let provisional = CachedItem::provisional(
            client_id.clone(),
            Scope::global_feed(),
            Utc::now(),
            serde_json::json!({"content": "hello"}),
        );
        assert_eq!(provisional.item_key().as_deref(), Some("client:c1"));

        let confirmed = CachedItem::confirmed(
            "p-500".into(),
            Some(client_id),
            Scope::global_feed(),
            1,
            Utc::now(),
            serde_json::json!({"content": "hello"}),
        );
        assert_eq!(confirmed.item_key().as_deref(), Some("p-500"));
    }
}
