use serde::{Deserialize, Serialize};
use std::fmt;

const FEED_PREFIX: &str = "feed:";
const CONVERSATION_PREFIX: &str = "conversation:";

/// 操作の対象コンテキスト、キャッシュとビューの単位
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum Scope {
    Feed(String),
    Conversation(String),
}

impl Scope {
    pub fn global_feed() -> Self {
        Scope::Feed("global".to_string())
    }

    pub fn feed(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        Self::validate_id(&name)?;
        Ok(Scope::Feed(name))
    }

    pub fn conversation(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        Self::validate_id(&id)?;
        Ok(Scope::Conversation(id))
    }

    pub fn key(&self) -> String {
        match self {
            Scope::Feed(name) => format!("{FEED_PREFIX}{name}"),
            Scope::Conversation(id) => format!("{CONVERSATION_PREFIX}{id}"),
        }
    }

    pub fn parse(key: &str) -> Result<Self, String> {
        if let Some(name) = key.strip_prefix(FEED_PREFIX) {
            return Self::feed(name);
        }
        if let Some(id) = key.strip_prefix(CONVERSATION_PREFIX) {
            return Self::conversation(id);
        }
        Err(format!("Unknown scope key: {key}"))
    }

    fn validate_id(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Scope identifier cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
