use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// 一時的なネットワーク障害（バックオフ付きで再試行）
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// バックエンドによる検証拒否（再試行しない）
    #[error("Validation error: {0}")]
    Validation(String),

    /// キュー投入前のシリアライズ失敗
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// ローカルに存在しない ID を参照するリアルタイムイベント
    #[error("Ignorable conflict: {0}")]
    ConflictIgnorable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientNetwork(_))
    }

    pub fn is_ignorable(&self) -> bool {
        matches!(self, AppError::ConflictIgnorable(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
