use crate::application::ports::push_channel::PushChannel;
use crate::application::services::read_cache::ReadCache;
use crate::application::services::sync_engine::{Confirmation, SyncEngine};
use crate::domain::entities::{CachedItem, RealtimeEvent};
use crate::domain::value_objects::{ClientId, Scope};
use crate::shared::error::AppError;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const VIEW_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    Upserted(CachedItem),
    /// 自分の操作の確定（仮アイテムの置き換え）
    Confirmed {
        client_id: ClientId,
        item: CachedItem,
    },
    Removed {
        scope: Scope,
        server_id: String,
    },
}

struct ScopeSubscription {
    watchers: usize,
    updates: broadcast::Sender<ViewUpdate>,
    task: JoinHandle<()>,
}

/// プッシュ購読をキャッシュへ合流させ、表示中ビューへ差分を流す
pub struct RealtimeMerger {
    push: Arc<dyn PushChannel>,
    cache: Arc<ReadCache>,
    engine: Arc<SyncEngine>,
    subscriptions: Mutex<HashMap<Scope, ScopeSubscription>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeMerger {
    pub fn new(
        push: Arc<dyn PushChannel>,
        cache: Arc<ReadCache>,
        engine: Arc<SyncEngine>,
    ) -> Arc<Self> {
        Arc::new(Self {
            push,
            cache,
            engine,
            subscriptions: Mutex::new(HashMap::new()),
            forwarder: Mutex::new(None),
        })
    }

    /// スコープを表示中にする。同じスコープの購読は 1 本だけ張る
    pub async fn watch(self: &Arc<Self>, scope: Scope) -> Result<ViewHandle, AppError> {
        self.ensure_forwarder();
        if let Some(receiver) = self.attach(&scope) {
            return Ok(self.handle(scope, receiver));
        }

        let stream = self.push.subscribe(&scope).await?;

        let mut subscriptions = self.lock_subscriptions();
        if let Some(existing) = subscriptions.get_mut(&scope) {
            // 並行して購読された
            existing.watchers += 1;
            let receiver = existing.updates.subscribe();
            drop(subscriptions);
            return Ok(self.handle(scope, receiver));
        }

        let (updates, receiver) = broadcast::channel(VIEW_CHANNEL_CAPACITY);
        let merger = Arc::downgrade(self);
        let task_scope = scope.clone();
        let task = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(event) = stream.next().await {
                let Some(merger) = merger.upgrade() else {
                    break;
                };
                if let Err(err) = merger.apply(event).await {
                    if err.is_ignorable() {
                        tracing::debug!(target: "offline::realtime", scope = %task_scope, error = %err, "ignored realtime event");
                    } else {
                        tracing::warn!(target: "offline::realtime", scope = %task_scope, error = %err, "failed to merge realtime event");
                    }
                }
            }
            tracing::debug!(target: "offline::realtime", scope = %task_scope, "push stream ended");
        });

        subscriptions.insert(
            scope.clone(),
            ScopeSubscription {
                watchers: 1,
                updates,
                task,
            },
        );
        drop(subscriptions);

        tracing::info!(target: "offline::realtime", scope = %scope, "subscribed to scope");
        Ok(self.handle(scope, receiver))
    }

    /// イベントをキャッシュへ反映し、表示中ビューへ通知する
    pub async fn apply(&self, event: RealtimeEvent) -> Result<ViewUpdate, AppError> {
        let update = match event {
            RealtimeEvent::Created(item) => match item.client_id.clone() {
                Some(client_id) => {
                    let mut cached = item.clone().into_cached();
                    cached.client_id = Some(client_id.clone());
                    if self.engine.confirm(&client_id, item).await? {
                        // ビューへはエンジンの確定通知経由で届く
                        return Ok(ViewUpdate::Confirmed {
                            client_id,
                            item: cached,
                        });
                    }
                    ViewUpdate::Upserted(cached)
                }
                None => {
                    let cached = item.into_cached();
                    self.cache.upsert(cached.clone()).await?;
                    ViewUpdate::Upserted(cached)
                }
            },
            RealtimeEvent::Deleted { scope, server_id } => {
                self.cache.remove_server_item(&scope, &server_id).await?;
                ViewUpdate::Removed { scope, server_id }
            }
        };

        self.publish(&update);
        Ok(update)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.lock_subscriptions().len()
    }

    pub fn shutdown(&self) {
        if let Some(forwarder) = self
            .forwarder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            forwarder.abort();
        }
        let drained: Vec<(Scope, ScopeSubscription)> =
            self.lock_subscriptions().drain().collect();
        for (scope, subscription) in drained {
            subscription.task.abort();
            tracing::debug!(target: "offline::realtime", scope = %scope, "subscription closed");
        }
    }

    /// エンジンの確定通知を表示中ビューへ流すタスクを起動する
    fn ensure_forwarder(self: &Arc<Self>) {
        let mut forwarder = self.forwarder.lock().unwrap_or_else(|e| e.into_inner());
        if forwarder.is_some() {
            return;
        }

        let mut confirmations = self.engine.subscribe_confirmations();
        let merger = Arc::downgrade(self);
        *forwarder = Some(tokio::spawn(async move {
            loop {
                match confirmations.recv().await {
                    Ok(Confirmation { client_id, item }) => {
                        let Some(merger) = merger.upgrade() else {
                            break;
                        };
                        merger.publish(&ViewUpdate::Confirmed { client_id, item });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "offline::realtime", skipped, "confirmation forwarder lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    fn attach(&self, scope: &Scope) -> Option<broadcast::Receiver<ViewUpdate>> {
        let mut subscriptions = self.lock_subscriptions();
        let existing = subscriptions.get_mut(scope)?;
        existing.watchers += 1;
        Some(existing.updates.subscribe())
    }

    fn release(&self, scope: &Scope) {
        let mut subscriptions = self.lock_subscriptions();
        let Some(existing) = subscriptions.get_mut(scope) else {
            return;
        };
        existing.watchers = existing.watchers.saturating_sub(1);
        if existing.watchers == 0 {
            if let Some(subscription) = subscriptions.remove(scope) {
                subscription.task.abort();
                tracing::info!(target: "offline::realtime", scope = %scope, "unsubscribed from scope");
            }
        }
    }

    fn publish(&self, update: &ViewUpdate) {
        let scope = match update {
            ViewUpdate::Upserted(item) | ViewUpdate::Confirmed { item, .. } => &item.scope,
            ViewUpdate::Removed { scope, .. } => scope,
        };
        if let Some(subscription) = self.lock_subscriptions().get(scope) {
            let _ = subscription.updates.send(update.clone());
        }
    }

    fn handle(
        self: &Arc<Self>,
        scope: Scope,
        receiver: broadcast::Receiver<ViewUpdate>,
    ) -> ViewHandle {
        ViewHandle {
            scope,
            receiver,
            merger: Arc::downgrade(self),
        }
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<Scope, ScopeSubscription>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RealtimeMerger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 表示中スコープへの参照。ドロップで購読を解放する
pub struct ViewHandle {
    scope: Scope,
    receiver: broadcast::Receiver<ViewUpdate>,
    merger: Weak<RealtimeMerger>,
}

impl ViewHandle {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub async fn next(&mut self) -> Option<ViewUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) => return Some(update),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        target: "offline::realtime",
                        scope = %self.scope,
                        skipped,
                        "view lagged behind realtime updates"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        if let Some(merger) = self.merger.upgrade() {
            merger.release(&self.scope);
        }
    }
}
