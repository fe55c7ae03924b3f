use crate::domain::value_objects::MediaReference;
use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait MediaUploader: Send + Sync {
    /// Blob をアップロードし、永続 URL を返す
    async fn upload(&self, media: &MediaReference) -> Result<String, AppError>;
}
