use crate::application::ports::content_gateway::{ContentGateway, SubmitRequest};
use crate::application::ports::media_uploader::MediaUploader;
use crate::application::ports::operation_store::AttemptUpdate;
use crate::application::services::connectivity_monitor::ConnectivityMonitor;
use crate::application::services::operation_queue::{EnqueueOutcome, OperationQueue};
use crate::application::services::read_cache::ReadCache;
use crate::application::services::retry_policy::RetryPolicy;
use crate::domain::entities::{CachedItem, ConfirmedItem, ItemState, PendingOperation};
use crate::domain::value_objects::{ClientId, OperationStatus, Scope};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub pending_operations: u32,
    pub failed_operations: u32,
    pub last_sync: Option<i64>,
    pub sync_errors: u32,
}

/// キュー上の操作が初めて確定したときの通知
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub client_id: ClientId,
    pub item: CachedItem,
}

const CONFIRMATION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub passes: u32,
    pub submitted: u32,
    pub confirmed: u32,
    pub retried: u32,
    pub failed: u32,
    /// 実行中のドレインに合流した
    pub coalesced: bool,
}

impl DrainReport {
    fn absorb(&mut self, group: GroupOutcome) {
        self.submitted += group.submitted;
        self.confirmed += group.confirmed;
        self.retried += group.retried;
        self.failed += group.failed;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupOutcome {
    submitted: u32,
    confirmed: u32,
    retried: u32,
    failed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Confirmed,
    Retrying,
    Failed,
}

#[derive(Debug, Default)]
struct DrainState {
    running: bool,
    rerun_requested: bool,
}

/// メディアアップロードの結果（外側の Err はストレージ障害）
type UploadOutcome = Result<(), AppError>;

/// キューを送信し、結果をキャッシュへ反映する同期エンジン
///
/// キュー内の操作を queued / submitting から遷移させるのはこのエンジンだけで、
/// 遷移はすべて `transition_gate` を通して直列化する。
pub struct SyncEngine {
    queue: Arc<OperationQueue>,
    cache: Arc<ReadCache>,
    gateway: Arc<dyn ContentGateway>,
    uploader: Option<Arc<dyn MediaUploader>>,
    connectivity: Arc<ConnectivityMonitor>,
    policy: RetryPolicy,
    media_policy: RetryPolicy,
    drain_state: StdMutex<DrainState>,
    syncing: watch::Sender<bool>,
    confirmations: broadcast::Sender<Confirmation>,
    transition_gate: Mutex<()>,
    status: RwLock<SyncStatus>,
    retry_timer: StdMutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<OperationQueue>,
        cache: Arc<ReadCache>,
        gateway: Arc<dyn ContentGateway>,
        uploader: Option<Arc<dyn MediaUploader>>,
        connectivity: Arc<ConnectivityMonitor>,
        policy: RetryPolicy,
        media_policy: RetryPolicy,
    ) -> Arc<Self> {
        let (syncing, _) = watch::channel(false);
        let (confirmations, _) = broadcast::channel(CONFIRMATION_CHANNEL_CAPACITY);
        Arc::new(Self {
            queue,
            cache,
            gateway,
            uploader,
            connectivity,
            policy,
            media_policy,
            drain_state: StdMutex::new(DrainState::default()),
            syncing,
            confirmations,
            transition_gate: Mutex::new(()),
            status: RwLock::new(SyncStatus::default()),
            retry_timer: StdMutex::new(None),
        })
    }

    pub async fn status(&self) -> SyncStatus {
        let mut status = self.status.read().await.clone();
        status.is_syncing = *self.syncing.borrow();
        status
    }

    pub fn subscribe_syncing(&self) -> watch::Receiver<bool> {
        self.syncing.subscribe()
    }

    pub fn subscribe_confirmations(&self) -> broadcast::Receiver<Confirmation> {
        self.confirmations.subscribe()
    }

    /// 実行中のドレインが無くなるまで待つ
    pub async fn wait_idle(&self) {
        let mut receiver = self.subscribe_syncing();
        let _ = receiver.wait_for(|running| !*running).await;
    }

    /// キューをドレインする。実行中なら合流し、実行中のドレインがもう一巡する
    pub async fn drain(self: &Arc<Self>) -> Result<DrainReport, AppError> {
        if !self.claim() {
            tracing::debug!(target: "offline::sync", "drain coalesced into in-flight run");
            return Ok(DrainReport {
                coalesced: true,
                ..DrainReport::default()
            });
        }
        self.run_claimed().await
    }

    /// バックグラウンドでドレインを要求する
    pub fn request_drain(self: &Arc<Self>) {
        if !self.claim() {
            return;
        }
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = engine.run_claimed().await {
                tracing::error!(target: "offline::sync", error = %err, "background drain failed");
            }
        });
    }

    /// 確定アイテムで仮アイテムを置き換え、操作をキューから外す。冪等
    pub async fn confirm(
        &self,
        client_id: &ClientId,
        item: ConfirmedItem,
    ) -> Result<bool, AppError> {
        let _gate = self.transition_gate.lock().await;
        self.confirm_locked(client_id, item).await
    }

    /// failed の操作を手動で再送対象に戻す
    pub async fn retry(self: &Arc<Self>, client_id: &ClientId) -> Result<(), AppError> {
        {
            let _gate = self.transition_gate.lock().await;
            let operation = self.require_failed(client_id).await?;
            self.queue
                .record_attempt(
                    client_id,
                    AttemptUpdate {
                        status: OperationStatus::Queued,
                        attempts: 0,
                        last_error: operation.last_error,
                        next_attempt_at: None,
                    },
                )
                .await?;
            self.cache
                .mark_client_state(client_id, ItemState::Provisional)
                .await?;
        }

        tracing::info!(target: "offline::sync", client_id = %client_id, "operation requeued by user");
        if self.connectivity.is_online() {
            self.request_drain();
        }
        Ok(())
    }

    /// failed の操作をユーザーが破棄する
    pub async fn discard(&self, client_id: &ClientId) -> Result<(), AppError> {
        let _gate = self.transition_gate.lock().await;
        self.require_failed(client_id).await?;
        self.queue.remove(client_id).await?;
        self.cache.remove_client_item(client_id).await?;
        tracing::info!(target: "offline::sync", client_id = %client_id, "failed operation discarded");
        Ok(())
    }

    /// 操作をキューへ入れ、仮アイテムを作る。途中で失敗したら両方とも残さない
    ///
    /// ゲートを保持したまま書き込むので、ドレインは仮アイテムができるまで送信しない。
    pub async fn admit(&self, operation: &PendingOperation) -> Result<CachedItem, AppError> {
        let _gate = self.transition_gate.lock().await;
        if let EnqueueOutcome::AlreadyQueued = self.queue.enqueue(operation.clone()).await? {
            return Err(AppError::InvalidState(format!(
                "Operation {} is already queued",
                operation.client_id
            )));
        }

        match self.cache.insert_provisional(operation).await {
            Ok(item) => Ok(item),
            Err(err) => {
                tracing::warn!(
                    target: "offline::queue",
                    client_id = %operation.client_id,
                    error = %err,
                    "provisional item could not be cached; rolling back enqueue"
                );
                if let Err(rollback) = self.queue.remove(&operation.client_id).await {
                    tracing::error!(target: "offline::queue", client_id = %operation.client_id, error = %rollback, "failed to roll back enqueue");
                }
                if let Err(rollback) = self.cache.remove_client_item(&operation.client_id).await {
                    tracing::error!(target: "offline::cache", client_id = %operation.client_id, error = %rollback, "failed to roll back provisional item");
                }
                Err(err)
            }
        }
    }

    pub fn cancel_retry_timer(&self) {
        if let Some(handle) = self
            .retry_timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }

    fn claim(&self) -> bool {
        let mut state = self.drain_state.lock().unwrap_or_else(|e| e.into_inner());
        if state.running {
            state.rerun_requested = true;
            return false;
        }
        state.running = true;
        self.syncing.send_replace(true);
        true
    }

    /// 再実行要求があれば true（実行権は保持したまま）
    fn release(&self) -> bool {
        let mut state = self.drain_state.lock().unwrap_or_else(|e| e.into_inner());
        if state.rerun_requested {
            state.rerun_requested = false;
            return true;
        }
        state.running = false;
        self.syncing.send_replace(false);
        false
    }

    fn abort_run(&self) {
        let mut state = self.drain_state.lock().unwrap_or_else(|e| e.into_inner());
        state.running = false;
        state.rerun_requested = false;
        self.syncing.send_replace(false);
    }

    fn request_rerun(&self) {
        let mut state = self.drain_state.lock().unwrap_or_else(|e| e.into_inner());
        if state.running {
            state.rerun_requested = true;
        }
    }

    async fn run_claimed(self: &Arc<Self>) -> Result<DrainReport, AppError> {
        let mut report = DrainReport::default();

        loop {
            if let Err(err) = self.run_pass(&mut report).await {
                self.abort_run();
                tracing::error!(target: "offline::sync", error = %err, "drain aborted");
                return Err(err);
            }

            if let Err(err) = self.after_pass().await {
                tracing::warn!(target: "offline::sync", error = %err, "failed to refresh sync status");
            }

            if !self.release() {
                break;
            }
        }

        tracing::debug!(
            target: "offline::sync",
            passes = report.passes,
            submitted = report.submitted,
            confirmed = report.confirmed,
            retried = report.retried,
            failed = report.failed,
            "drain finished"
        );
        Ok(report)
    }

    async fn run_pass(&self, report: &mut DrainReport) -> Result<(), AppError> {
        report.passes += 1;

        if !self.connectivity.is_online() {
            tracing::debug!(target: "offline::sync", "offline; drain pass skipped");
            return Ok(());
        }

        let snapshot = self.queue.list().await?;
        let groups = group_by_target(snapshot);
        if groups.is_empty() {
            return Ok(());
        }

        let outcomes = join_all(
            groups
                .into_iter()
                .map(|(target, operations)| self.drain_group(target, operations)),
        )
        .await;

        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(group) => report.absorb(group),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 同一コンテキスト内は厳密に順番通り送信する
    async fn drain_group(
        &self,
        target: Scope,
        operations: Vec<PendingOperation>,
    ) -> Result<GroupOutcome, AppError> {
        let mut outcome = GroupOutcome::default();
        let now = Utc::now();

        for operation in operations {
            match operation.status {
                OperationStatus::Failed => continue,
                OperationStatus::Confirmed => {
                    // 確定後の削除前に中断されたもの
                    self.queue.remove(&operation.client_id).await?;
                    continue;
                }
                OperationStatus::Queued | OperationStatus::Submitting => {}
            }

            if !operation.is_due(now) {
                tracing::trace!(
                    target: "offline::sync",
                    scope = %target,
                    client_id = %operation.client_id,
                    "head of context is backing off"
                );
                break;
            }

            if !self.connectivity.is_online() {
                tracing::debug!(target: "offline::sync", scope = %target, "went offline mid-drain");
                break;
            }

            outcome.submitted += 1;
            match self.process(operation).await? {
                Settlement::Confirmed => outcome.confirmed += 1,
                Settlement::Failed => outcome.failed += 1,
                Settlement::Retrying => {
                    outcome.retried += 1;
                    break;
                }
            }
        }

        Ok(outcome)
    }

    async fn process(&self, mut operation: PendingOperation) -> Result<Settlement, AppError> {
        if !self.begin_submission(&operation.client_id).await? {
            // リアルタイム経由で既に確定済み
            return Ok(Settlement::Confirmed);
        }

        let submit_result = match self.upload_pending_media(&mut operation).await? {
            Ok(()) => {
                self.gateway
                    .submit(SubmitRequest::from(&operation))
                    .await
            }
            Err(err) => Err(err),
        };

        match submit_result {
            Ok(item) => {
                self.confirm(&operation.client_id, item).await?;
                Ok(Settlement::Confirmed)
            }
            Err(err) if err.is_transient() => self.settle_transient(&operation, &err).await,
            Err(err) => self.settle_permanent(&operation, &err).await,
        }
    }

    async fn begin_submission(&self, client_id: &ClientId) -> Result<bool, AppError> {
        let _gate = self.transition_gate.lock().await;
        if !self.queue.contains(client_id).await? {
            return Ok(false);
        }
        self.queue
            .mark_status(client_id, OperationStatus::Submitting, None)
            .await?;
        Ok(true)
    }

    async fn upload_pending_media(
        &self,
        operation: &mut PendingOperation,
    ) -> Result<UploadOutcome, AppError> {
        if !operation.payload.has_pending_media() {
            return Ok(Ok(()));
        }
        let Some(uploader) = &self.uploader else {
            return Ok(Err(AppError::Configuration(
                "Media uploader is not configured".to_string(),
            )));
        };

        for idx in 0..operation.payload.media().len() {
            if operation.payload.media()[idx].is_uploaded() {
                continue;
            }

            let mut tries = 0;
            loop {
                tries += 1;
                let media = operation.payload.media()[idx].clone();
                let result = uploader.upload(&media).await;

                let entry = &mut operation.payload.media_mut()[idx];
                entry.upload_attempts += 1;
                let failure = match result {
                    Ok(url) => {
                        entry.uploaded_url = Some(url);
                        None
                    }
                    Err(err) => Some(err),
                };
                self.persist_payload(operation).await?;

                match failure {
                    None => break,
                    Some(err) if err.is_transient() && !self.media_policy.is_exhausted(tries) => {
                        let delay = self.media_policy.delay_for(tries);
                        tracing::debug!(
                            target: "offline::sync",
                            client_id = %operation.client_id,
                            blob_key = %media.blob_key,
                            tries,
                            delay_ms = delay.as_millis() as u64,
                            "media upload failed; retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Some(err) => return Ok(Err(err)),
                }
            }
        }

        Ok(Ok(()))
    }

    async fn persist_payload(&self, operation: &PendingOperation) -> Result<(), AppError> {
        match self
            .queue
            .update_payload(&operation.client_id, &operation.payload)
            .await
        {
            Ok(()) | Err(AppError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn confirm_locked(
        &self,
        client_id: &ClientId,
        item: ConfirmedItem,
    ) -> Result<bool, AppError> {
        let mut cached = item.into_cached();
        cached.client_id = Some(client_id.clone());
        let server_id = cached.server_id.clone().unwrap_or_default();

        self.cache
            .replace_provisional(client_id, cached.clone())
            .await?;

        let was_pending = self.queue.contains(client_id).await?;
        if was_pending {
            self.queue
                .mark_status(client_id, OperationStatus::Confirmed, None)
                .await?;
            self.queue.remove(client_id).await?;
            let _ = self.confirmations.send(Confirmation {
                client_id: client_id.clone(),
                item: cached,
            });
        }

        tracing::info!(
            target: "offline::sync",
            client_id = %client_id,
            server_id = %server_id,
            was_pending,
            "operation confirmed"
        );
        Ok(was_pending)
    }

    async fn settle_transient(
        &self,
        operation: &PendingOperation,
        err: &AppError,
    ) -> Result<Settlement, AppError> {
        let _gate = self.transition_gate.lock().await;
        let Some(current) = self.queue.get(&operation.client_id).await? else {
            return Ok(Settlement::Confirmed);
        };

        self.status.write().await.sync_errors += 1;
        let attempts = current.attempts + 1;

        if self.policy.is_exhausted(attempts) {
            self.mark_failed(&operation.client_id, attempts, err).await?;
            tracing::warn!(
                target: "offline::sync",
                client_id = %operation.client_id,
                attempts,
                error = %err,
                "operation failed after max attempts"
            );
            return Ok(Settlement::Failed);
        }

        let delay = self.policy.delay_for(attempts);
        let next_attempt_at =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.queue
            .record_attempt(
                &operation.client_id,
                AttemptUpdate {
                    status: OperationStatus::Queued,
                    attempts,
                    last_error: Some(err.to_string()),
                    next_attempt_at: Some(next_attempt_at),
                },
            )
            .await?;

        tracing::debug!(
            target: "offline::sync",
            client_id = %operation.client_id,
            attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure; operation requeued"
        );
        Ok(Settlement::Retrying)
    }

    async fn settle_permanent(
        &self,
        operation: &PendingOperation,
        err: &AppError,
    ) -> Result<Settlement, AppError> {
        let _gate = self.transition_gate.lock().await;
        let Some(current) = self.queue.get(&operation.client_id).await? else {
            return Ok(Settlement::Confirmed);
        };

        self.status.write().await.sync_errors += 1;
        self.mark_failed(&operation.client_id, current.attempts + 1, err)
            .await?;
        tracing::warn!(
            target: "offline::sync",
            client_id = %operation.client_id,
            error = %err,
            "operation rejected; waiting for user action"
        );
        Ok(Settlement::Failed)
    }

    async fn mark_failed(
        &self,
        client_id: &ClientId,
        attempts: u32,
        err: &AppError,
    ) -> Result<(), AppError> {
        self.queue
            .record_attempt(
                client_id,
                AttemptUpdate {
                    status: OperationStatus::Failed,
                    attempts,
                    last_error: Some(err.to_string()),
                    next_attempt_at: None,
                },
            )
            .await?;
        self.cache
            .mark_client_state(client_id, ItemState::Unconfirmed)
            .await?;
        Ok(())
    }

    async fn require_failed(&self, client_id: &ClientId) -> Result<PendingOperation, AppError> {
        let operation = self
            .queue
            .get(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pending operation {client_id}")))?;
        if !operation.is_failed() {
            return Err(AppError::InvalidState(format!(
                "Operation {client_id} is {} and cannot be retried or discarded",
                operation.status.as_str()
            )));
        }
        Ok(operation)
    }

    async fn after_pass(self: &Arc<Self>) -> Result<(), AppError> {
        let operations = self.queue.list().await?;
        let failed = operations.iter().filter(|op| op.is_failed()).count() as u32;
        let pending = operations.len() as u32 - failed;

        {
            let mut status = self.status.write().await;
            status.pending_operations = pending;
            status.failed_operations = failed;
            status.last_sync = Some(Utc::now().timestamp());
        }

        if !self.connectivity.is_online() {
            self.cancel_retry_timer();
            return Ok(());
        }

        self.schedule_retry(next_gating_attempt(&operations));
        Ok(())
    }

    fn schedule_retry(self: &Arc<Self>, next_due: Option<DateTime<Utc>>) {
        self.cancel_retry_timer();
        let Some(due) = next_due else {
            return;
        };

        let wait = (due - Utc::now()).to_std().unwrap_or_default();
        if wait.is_zero() {
            self.request_rerun();
            return;
        }

        let engine: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(engine) = engine.upgrade() {
                tracing::debug!(target: "offline::sync", "retry timer fired");
                engine.request_drain();
            }
        });
        *self.retry_timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.cancel_retry_timer();
    }
}

/// 挿入順を保ったままコンテキストごとにまとめる
fn group_by_target(operations: Vec<PendingOperation>) -> Vec<(Scope, Vec<PendingOperation>)> {
    let mut groups: Vec<(Scope, Vec<PendingOperation>)> = Vec::new();
    for operation in operations {
        match groups
            .iter_mut()
            .find(|(target, _)| target == &operation.target)
        {
            Some((_, group)) => group.push(operation),
            None => groups.push((operation.target.clone(), vec![operation])),
        }
    }
    groups
}

/// 各コンテキストの先頭（後続を止めている操作）の次回試行時刻のうち最も早いもの
///
/// 先頭の後ろで待っている操作の時刻は数えない。
fn next_gating_attempt(operations: &[PendingOperation]) -> Option<DateTime<Utc>> {
    let mut gated: HashSet<&Scope> = HashSet::new();
    let mut earliest: Option<DateTime<Utc>> = None;
    for operation in operations {
        if matches!(
            operation.status,
            OperationStatus::Failed | OperationStatus::Confirmed
        ) {
            continue;
        }
        if !gated.insert(&operation.target) {
            continue;
        }
        if operation.status != OperationStatus::Queued {
            continue;
        }
        if let Some(at) = operation.next_attempt_at {
            earliest = Some(earliest.map_or(at, |current| current.min(at)));
        }
    }
    earliest
}
