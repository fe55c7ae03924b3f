use async_trait::async_trait;
use chrono::Utc;
use offline_sync::{
    AppError, ConfirmedItem, ConnectivityMonitor, ContentGateway, RealtimeEvent, SubmitRequest,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::MockPushChannel;

#[derive(Default)]
struct GatewayState {
    submissions: Vec<SubmitRequest>,
    accepted: HashMap<String, ConfirmedItem>,
    scripted: HashMap<String, VecDeque<AppError>>,
    reject_all: Option<AppError>,
    disconnect_on_call: Option<(usize, Arc<ConnectivityMonitor>)>,
    next_server_id: u64,
}

/// client_id で冪等なバックエンドの代役
#[derive(Clone)]
pub struct MockContentGateway {
    state: Arc<RwLock<GatewayState>>,
    echo: Option<MockPushChannel>,
}

impl MockContentGateway {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(GatewayState {
                next_server_id: 500,
                ..GatewayState::default()
            })),
            echo: None,
        }
    }

    /// 確定したアイテムをプッシュにも流す
    pub fn with_echo(mut self, push: MockPushChannel) -> Self {
        self.echo = Some(push);
        self
    }

    pub async fn fail_next(&self, content: &str, error: AppError) {
        self.state
            .write()
            .await
            .scripted
            .entry(content.to_string())
            .or_default()
            .push_back(error);
    }

    pub async fn reject_all(&self, error: Option<AppError>) {
        self.state.write().await.reject_all = error;
    }

    /// n 回目（1 始まり）の送信で接続断を起こし、一時エラーを返す
    pub async fn disconnect_on_call(&self, call: usize, monitor: Arc<ConnectivityMonitor>) {
        self.state.write().await.disconnect_on_call = Some((call, monitor));
    }

    pub async fn submitted_contents(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .submissions
            .iter()
            .map(content_of)
            .collect()
    }

    pub async fn accepted_count(&self) -> usize {
        self.state.read().await.accepted.len()
    }
}

fn content_of(request: &SubmitRequest) -> String {
    request.payload.body()["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ContentGateway for MockContentGateway {
    async fn submit(&self, request: SubmitRequest) -> Result<ConfirmedItem, AppError> {
        let content = content_of(&request);
        let item = {
            let mut state = self.state.write().await;
            state.submissions.push(request.clone());
            let call = state.submissions.len();

            if let Some((at, monitor)) = state.disconnect_on_call.clone() {
                if at == call {
                    monitor.report(false);
                    return Err(AppError::TransientNetwork("connection dropped".into()));
                }
            }
            if let Some(error) = state.reject_all.clone() {
                return Err(error);
            }
            if let Some(error) = state
                .scripted
                .get_mut(&content)
                .and_then(VecDeque::pop_front)
            {
                return Err(error);
            }

            let key = request.client_id.to_string();
            if let Some(existing) = state.accepted.get(&key) {
                return Ok(existing.clone());
            }

            let server_id = format!("p-{}", state.next_server_id);
            state.next_server_id += 1;
            let item = ConfirmedItem {
                server_id,
                client_id: Some(request.client_id.clone()),
                scope: request.target.clone(),
                version: 1,
                created_at: Utc::now(),
                body: request.payload.display_body(),
            };
            state.accepted.insert(key, item.clone());
            item
        };

        if let Some(push) = &self.echo {
            push.emit(RealtimeEvent::Created(item.clone())).await;
        }
        Ok(item)
    }
}
