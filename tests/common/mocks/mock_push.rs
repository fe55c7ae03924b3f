use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use offline_sync::{AppError, PushChannel, RealtimeEvent, Scope};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MockPushChannel {
    subscribers: Arc<RwLock<Vec<(Scope, mpsc::UnboundedSender<RealtimeEvent>)>>>,
}

impl MockPushChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn emit(&self, event: RealtimeEvent) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|(_, sender)| !sender.is_closed());
        for (scope, sender) in subscribers.iter() {
            if scope == event.scope() {
                let _ = sender.unbounded_send(event.clone());
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .await
            .iter()
            .filter(|(_, sender)| !sender.is_closed())
            .count()
    }
}

#[async_trait]
impl PushChannel for MockPushChannel {
    async fn subscribe(
        &self,
        scope: &Scope,
    ) -> Result<BoxStream<'static, RealtimeEvent>, AppError> {
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers.write().await.push((scope.clone(), sender));
        Ok(receiver.boxed())
    }
}
