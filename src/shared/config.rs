use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub connectivity: ConnectivityConfig,
    pub mentions: MentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub media_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_items_per_scope: usize,
    pub default_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionConfig {
    pub candidate_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                database_url: "sqlite:data/offline_sync.db".to_string(),
                max_connections: 5,
            },
            sync: SyncConfig {
                base_delay_ms: 1_000,
                max_delay_ms: 30_000,
                max_attempts: 5,
                media_max_attempts: 3,
            },
            cache: CacheConfig {
                max_items_per_scope: 200,
                default_page_size: 50,
            },
            connectivity: ConnectivityConfig { debounce_ms: 500 },
            mentions: MentionConfig { candidate_limit: 8 },
        }
    }
}

impl SyncConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl ConnectivityConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        // 既定値
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("OFFLINE_SYNC_DATABASE_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.storage.database_url = trimmed.to_string();
            }
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_BASE_DELAY_MS") {
            cfg.sync.base_delay_ms = value;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_MAX_DELAY_MS") {
            cfg.sync.max_delay_ms = value;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_MAX_ATTEMPTS") {
            cfg.sync.max_attempts = value.clamp(1, u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_MEDIA_MAX_ATTEMPTS") {
            cfg.sync.media_max_attempts = value.clamp(1, u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_CACHE_MAX_ITEMS") {
            cfg.cache.max_items_per_scope = value.max(1) as usize;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_DEBOUNCE_MS") {
            cfg.connectivity.debounce_ms = value;
        }
        if let Some(value) = env_u64("OFFLINE_SYNC_MENTION_LIMIT") {
            cfg.mentions.candidate_limit = value.max(1) as usize;
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.storage.database_url.trim().is_empty() {
            return Err("Storage database_url must not be empty".to_string());
        }
        if self.storage.max_connections == 0 {
            return Err("Storage max_connections must be greater than 0".to_string());
        }
        if self.sync.max_attempts == 0 {
            return Err("Sync max_attempts must be greater than 0".to_string());
        }
        if self.sync.media_max_attempts == 0 {
            return Err("Sync media_max_attempts must be greater than 0".to_string());
        }
        if self.sync.base_delay_ms > self.sync.max_delay_ms {
            return Err("Sync base_delay_ms must not exceed max_delay_ms".to_string());
        }
        if self.cache.max_items_per_scope == 0 {
            return Err("Cache max_items_per_scope must be greater than 0".to_string());
        }
        if self.cache.default_page_size == 0 {
            return Err("Cache default_page_size must be greater than 0".to_string());
        }
        if self.mentions.candidate_limit == 0 {
            return Err("Mention candidate_limit must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
