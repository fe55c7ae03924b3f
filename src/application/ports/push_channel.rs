use crate::domain::entities::RealtimeEvent;
use crate::domain::value_objects::Scope;
use crate::shared::error::AppError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// スコープ単位のプッシュ購読（少なくとも 1 回配信）
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn subscribe(&self, scope: &Scope)
        -> Result<BoxStream<'static, RealtimeEvent>, AppError>;
}
