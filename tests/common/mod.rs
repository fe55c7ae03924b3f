#![allow(dead_code)]

pub mod mocks;

use mocks::{MockContentGateway, MockProfileDirectory, MockPushChannel};
use offline_sync::infrastructure::ConnectionPool;
use offline_sync::{AppConfig, Connectivity, OfflineSession, SessionCollaborators};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct TestSession {
    pub session: OfflineSession,
    pub gateway: MockContentGateway,
    pub push: MockPushChannel,
}

/// 待ち時間ゼロ・デバウンスなしの設定
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.sync.base_delay_ms = 0;
    config.sync.max_delay_ms = 0;
    config.sync.max_attempts = 3;
    config.connectivity.debounce_ms = 0;
    config
}

pub fn collaborators(gateway: &MockContentGateway, push: &MockPushChannel) -> SessionCollaborators {
    SessionCollaborators {
        gateway: Arc::new(gateway.clone()),
        uploader: None,
        push: Arc::new(push.clone()),
        profiles: Arc::new(MockProfileDirectory::with_handles(&["alice", "alfred", "bob"])),
    }
}

pub async fn start_session(config: AppConfig, initial: Connectivity) -> TestSession {
    let push = MockPushChannel::new();
    let gateway = MockContentGateway::new();
    start_session_with(config, initial, gateway, push).await
}

pub async fn start_session_with(
    config: AppConfig,
    initial: Connectivity,
    gateway: MockContentGateway,
    push: MockPushChannel,
) -> TestSession {
    let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
    pool.migrate().await.expect("migrations");
    let session =
        OfflineSession::with_pool(config, pool, collaborators(&gateway, &push), initial);
    session.start().await.expect("session start");
    TestSession {
        session,
        gateway,
        push,
    }
}

/// ファイル DB でセッションを開く（再起動の再現用）
pub async fn open_file_session(
    path: &Path,
    gateway: &MockContentGateway,
    push: &MockPushChannel,
) -> OfflineSession {
    let mut config = test_config();
    config.storage.database_url = format!("sqlite:{}", path.display());
    config.storage.max_connections = 1;
    let session = OfflineSession::open(config, collaborators(gateway, push))
        .await
        .expect("open file session");
    session.start().await.expect("session start");
    session
}

/// 条件が満たされるまで待つ（3 秒でタイムアウト）
pub async fn wait_until<F, Fut>(description: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(3), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {description}");
}

pub async fn wait_for_empty_queue(session: &OfflineSession) {
    wait_until("queue to drain", move || async move {
        session
            .pending_operations()
            .await
            .expect("pending operations")
            .is_empty()
    })
    .await;
}
