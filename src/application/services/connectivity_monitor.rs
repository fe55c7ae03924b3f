use crate::domain::entities::{Connectivity, ConnectivityState, ConnectivityTransition};
use chrono::Utc;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const TRANSITION_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Observation {
    connectivity: Connectivity,
    generation: u64,
}

/// ネットワーク到達性の監視。生の観測をデバウンスし、実際の遷移だけを通知する
pub struct ConnectivityMonitor {
    state: RwLock<ConnectivityState>,
    latest: Mutex<Observation>,
    transitions: broadcast::Sender<ConnectivityTransition>,
    debounce: Duration,
    runtime: Option<Handle>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity, debounce: Duration) -> Arc<Self> {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Arc::new(Self {
            state: RwLock::new(ConnectivityState {
                connectivity: initial,
                last_transition_at: Utc::now(),
            }),
            latest: Mutex::new(Observation {
                connectivity: initial,
                generation: 0,
            }),
            transitions,
            debounce,
            runtime: Handle::try_current().ok(),
        })
    }

    pub fn current(&self) -> ConnectivityState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityTransition> {
        self.transitions.subscribe()
    }

    /// 遷移ごとにコールバックを呼ぶタスクを起動する
    pub fn on_transition<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(ConnectivityTransition) + Send + 'static,
    {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(transition) => callback(transition),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: "offline::connectivity",
                            skipped,
                            "transition listener lagged"
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// 到達性の生の観測を取り込む
    ///
    /// デバウンスのタイマーは生成時のランタイムで動く。ランタイムが無い場合は即時に確定する。
    pub fn report(self: &Arc<Self>, reachable: bool) {
        let target = Connectivity::from_reachable(reachable);

        let generation = {
            let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
            if latest.connectivity == target {
                return;
            }
            latest.connectivity = target;
            latest.generation += 1;
            latest.generation
        };

        if self.debounce.is_zero() {
            self.commit(target);
            return;
        }

        let Some(runtime) = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            tracing::warn!(
                target: "offline::connectivity",
                "no tokio runtime for debounce timer; committing observation immediately"
            );
            self.commit(target);
            return;
        };

        let monitor = Arc::clone(self);
        runtime.spawn(async move {
            tokio::time::sleep(monitor.debounce).await;
            let still_latest = monitor
                .latest
                .lock()
                .map(|latest| latest.generation == generation)
                .unwrap_or(false);
            if still_latest {
                monitor.commit(target);
            } else {
                tracing::trace!(
                    target: "offline::connectivity",
                    "observation superseded within debounce window"
                );
            }
        });
    }

    fn commit(&self, target: Connectivity) {
        let transition = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if state.connectivity == target {
                return;
            }
            let transition = ConnectivityTransition {
                from: state.connectivity,
                to: target,
                at: Utc::now(),
            };
            state.connectivity = target;
            state.last_transition_at = transition.at;
            transition
        };

        tracing::info!(
            target: "offline::connectivity",
            from = ?transition.from,
            to = ?transition.to,
            "connectivity changed"
        );
        // 購読者がいない場合の送信エラーは無視
        let _ = self.transitions.send(transition);
    }
}
