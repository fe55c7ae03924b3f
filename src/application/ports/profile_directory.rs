use crate::domain::entities::ProfileReference;
use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn search(&self, prefix: &str, limit: usize)
        -> Result<Vec<ProfileReference>, AppError>;
}
