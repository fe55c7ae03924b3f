use crate::application::ports::content_gateway::ContentGateway;
use crate::application::ports::media_uploader::MediaUploader;
use crate::application::ports::profile_directory::ProfileDirectory;
use crate::application::ports::push_channel::PushChannel;
use crate::application::services::connectivity_monitor::ConnectivityMonitor;
use crate::application::services::mention_resolver::{MentionLookup, MentionResolver};
use crate::application::services::operation_queue::OperationQueue;
use crate::application::services::read_cache::{CachePage, ReadCache};
use crate::application::services::realtime_merge::{RealtimeMerger, ViewHandle};
use crate::application::services::retry_policy::RetryPolicy;
use crate::application::services::sync_engine::{DrainReport, SyncEngine, SyncStatus};
use crate::domain::entities::{CachedItem, Connectivity, ConnectivityState, PendingOperation};
use crate::domain::value_objects::{ClientId, OperationKind, OperationPayload, Scope};
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::offline::{SqliteCacheStore, SqliteOperationStore};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// セッションが利用する外部サービス
#[derive(Clone)]
pub struct SessionCollaborators {
    pub gateway: Arc<dyn ContentGateway>,
    pub uploader: Option<Arc<dyn MediaUploader>>,
    pub push: Arc<dyn PushChannel>,
    pub profiles: Arc<dyn ProfileDirectory>,
}

/// ログイン中のユーザー 1 人分のオフライン同期一式
pub struct OfflineSession {
    config: AppConfig,
    pool: ConnectionPool,
    connectivity: Arc<ConnectivityMonitor>,
    queue: Arc<OperationQueue>,
    cache: Arc<ReadCache>,
    engine: Arc<SyncEngine>,
    merger: Arc<RealtimeMerger>,
    mentions: MentionResolver,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineSession {
    /// 設定の DB を開いてマイグレーションを適用する。接続状態は最初の観測までオフライン扱い
    pub async fn open(
        config: AppConfig,
        collaborators: SessionCollaborators,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::Configuration)?;
        let pool = ConnectionPool::open(
            &config.storage.database_url,
            config.storage.max_connections,
        )
        .await?;
        Ok(Self::with_pool(
            config,
            pool,
            collaborators,
            Connectivity::Offline,
        ))
    }

    /// マイグレーション済みのプールから組み立てる
    pub fn with_pool(
        config: AppConfig,
        pool: ConnectionPool,
        collaborators: SessionCollaborators,
        initial: Connectivity,
    ) -> Self {
        let connectivity = ConnectivityMonitor::new(initial, config.connectivity.debounce());
        let queue = Arc::new(OperationQueue::new(Arc::new(SqliteOperationStore::new(
            pool.clone(),
        ))));
        let cache = Arc::new(ReadCache::new(
            Arc::new(SqliteCacheStore::new(pool.clone())),
            Arc::clone(&queue),
            config.cache.max_items_per_scope,
            config.cache.default_page_size,
        ));
        let engine = SyncEngine::new(
            Arc::clone(&queue),
            Arc::clone(&cache),
            collaborators.gateway,
            collaborators.uploader,
            Arc::clone(&connectivity),
            RetryPolicy::from_config(&config.sync),
            RetryPolicy::media_from_config(&config.sync),
        );
        let merger = RealtimeMerger::new(
            collaborators.push,
            Arc::clone(&cache),
            Arc::clone(&engine),
        );
        let mentions = MentionResolver::new(collaborators.profiles, config.mentions.candidate_limit);

        Self {
            config,
            pool,
            connectivity,
            queue,
            cache,
            engine,
            merger,
            mentions,
            listener: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 中断された送信を戻し、再接続時のドレインを仕掛ける
    pub async fn start(&self) -> Result<u64, AppError> {
        let recovered = self.queue.recover_interrupted().await?;

        let engine = Arc::clone(&self.engine);
        let handle = self.connectivity.on_transition(move |transition| {
            if transition.is_reconnect() {
                engine.request_drain();
            } else {
                engine.cancel_retry_timer();
            }
        });
        if let Some(previous) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            previous.abort();
        }

        let pending = self.queue.list().await?.len();
        tracing::info!(
            target: "offline::sync",
            recovered,
            pending,
            online = self.connectivity.is_online(),
            "offline session started"
        );

        if self.connectivity.is_online() {
            self.engine.request_drain();
        }
        Ok(recovered)
    }

    /// ランタイム外のスレッドから呼んでもよい（デバウンスはセッション生成時のランタイムで動く）
    pub fn report_connectivity(&self, reachable: bool) {
        self.connectivity.report(reachable);
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity.current()
    }

    pub fn connectivity_monitor(&self) -> Arc<ConnectivityMonitor> {
        Arc::clone(&self.connectivity)
    }

    pub async fn create_post(
        &self,
        scope: Scope,
        payload: OperationPayload,
    ) -> Result<CachedItem, AppError> {
        if !matches!(scope, Scope::Feed(_)) {
            return Err(AppError::Validation(format!(
                "Posts must target a feed, got {scope}"
            )));
        }
        self.submit(OperationKind::CreatePost, scope, payload).await
    }

    pub async fn send_message(
        &self,
        conversation_id: &str,
        payload: OperationPayload,
    ) -> Result<CachedItem, AppError> {
        let scope = Scope::conversation(conversation_id).map_err(AppError::Validation)?;
        self.submit(OperationKind::SendMessage, scope, payload).await
    }

    /// 本文中のメンションを解決してから投稿する。解決できない場合はメンション無しで投稿
    pub async fn post_text(&self, scope: Scope, text: &str) -> Result<CachedItem, AppError> {
        let mut payload = OperationPayload::text(text);
        if self.connectivity.is_online() {
            match self.mentions.resolve_text(text).await {
                Ok(mentions) if !mentions.is_empty() => payload = payload.with_mentions(mentions),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(target: "offline::mentions", error = %err, "mention resolution skipped");
                }
            }
        }
        self.create_post(scope, payload).await
    }

    pub fn lookup_mentions(&self, fragment: &str) -> MentionLookup {
        self.mentions.lookup(fragment)
    }

    pub async fn feed(
        &self,
        scope: &Scope,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<CachePage, AppError> {
        self.cache.get(scope, limit, cursor).await
    }

    pub async fn watch(&self, scope: Scope) -> Result<ViewHandle, AppError> {
        self.merger.watch(scope).await
    }

    pub async fn retry(&self, client_id: &ClientId) -> Result<(), AppError> {
        self.engine.retry(client_id).await
    }

    pub async fn discard(&self, client_id: &ClientId) -> Result<(), AppError> {
        self.engine.discard(client_id).await
    }

    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>, AppError> {
        self.queue.list().await
    }

    pub async fn failed_operations(&self) -> Result<Vec<PendingOperation>, AppError> {
        self.queue.failed().await
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.engine.status().await
    }

    pub async fn sync_now(&self) -> Result<DrainReport, AppError> {
        self.engine.drain().await
    }

    pub async fn wait_idle(&self) {
        self.engine.wait_idle().await
    }

    /// ログアウト時の後始末。キューの内容は次回セッションへ持ち越す
    pub async fn shutdown(&self) {
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            listener.abort();
        }
        self.mentions.cancel_pending();
        self.merger.shutdown();
        self.engine.cancel_retry_timer();
        self.engine.wait_idle().await;
        self.pool.close().await;
        tracing::info!(target: "offline::sync", "offline session closed");
    }

    async fn submit(
        &self,
        kind: OperationKind,
        target: Scope,
        payload: OperationPayload,
    ) -> Result<CachedItem, AppError> {
        let operation = PendingOperation::new(kind, target, payload);

        let item = self.engine.admit(&operation).await?;

        tracing::info!(
            target: "offline::queue",
            client_id = %operation.client_id,
            kind = %kind,
            scope = %operation.target,
            online = self.connectivity.is_online(),
            "user action queued"
        );

        if self.connectivity.is_online() {
            self.engine.request_drain();
        }
        Ok(item)
    }
}
