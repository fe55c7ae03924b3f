//! 投稿・メッセージ送信のオフライン同期エンジン
//!
//! ユーザー操作を永続キューへ積み、楽観的にキャッシュへ表示し、
//! 接続が戻ったらバックエンドへ順序通りに送信して確定させる。

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::ports::{
    CacheStore, ContentGateway, MediaUploader, OperationStore, ProfileDirectory, PushChannel,
    SubmitRequest,
};
pub use application::services::{
    CachePage, ConnectivityMonitor, DrainReport, LookupOutcome, MentionLookup, OfflineSession,
    SessionCollaborators, SyncStatus, ViewHandle, ViewUpdate,
};
pub use domain::entities::{
    CachedItem, ConfirmedItem, Connectivity, ItemState, PendingOperation, ProfileReference,
    RealtimeEvent,
};
pub use domain::value_objects::{
    ClientId, MediaReference, MentionReference, OperationKind, OperationPayload, OperationStatus,
    Scope,
};
pub use shared::{AppConfig, AppError, Result};

/// ログ設定の初期化（二重初期化は無視する）
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "offline=debug,offline_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
