//! SyncEngine - 楽観更新キュー・ドレイン・定期照合をまとめる窓口
//!
//! # フロー
//! 1. `enqueue_action()` が集約を楽観的に更新し、更新前のスナップショットをキューに積む
//! 2. ドレインが Idle なら Draining に遷移させてドレインタスクを起動（processor.rs）
//! 3. 別タイマーの照合ループ（reconciler.rs）はキューが空のときだけバックエンドと突き合わせる
//!
//! # ロック順序
//! store の状態ロック → queue ロック の順でのみネストする。
//! ドレイン状態の遷移（Idle <-> Draining）は必ず queue ロックの内側で行うので、
//! 終了しかけのドレインと同時の enqueue でエントリが取り残されることはない。
//!
//! # セッション世代
//! login / logout のたびに `epoch` を進める。ドレインは開始時の世代を持ち、
//! 世代が変わったら即座に抜ける（前のセッションのドレインが新しいキューに触れない）。

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::reconciler::{ReconcileOutcome, ReconcilerHandle};
use super::store::{StateStore, Subscription};
use crate::config::{ConfigError, SyncConfig};
use crate::domain::{Action, AppState, DrainState, EntryId, SyncError, TemplateId, User};
use crate::ports::{AuthToken, Clock, IdGenerator, SystemClock, TaskBackend, UlidGenerator};
use crate::queue::{ActionEntry, MutationQueue, RefreshEntry, RetryPolicy};
use crate::status::QueueStatus;

pub(crate) const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

/// State shared by the engine handle, the drain task and the reconcile loop.
pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn TaskBackend>,
    pub(crate) store: StateStore,
    pub(crate) queue: Mutex<MutationQueue>,
    pub(crate) drain: watch::Sender<DrainState>,
    /// Bumped under the queue lock whenever a session starts or ends.
    pub(crate) epoch: AtomicU64,
    pub(crate) session: Mutex<Option<AuthToken>>,
    pub(crate) reconciler: Mutex<Option<ReconcilerHandle>>,
    pub(crate) reconcile_interval: Mutex<Duration>,
    pub(crate) config: SyncConfig,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) auto_drain: bool,
}

impl Shared {
    pub(crate) fn token(&self) -> Result<AuthToken, SyncError> {
        self.session.lock().clone().ok_or(SyncError::SessionExpired)
    }

    /// Run a backend call under the configured request timeout.
    pub(crate) async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        let limit = self.config.request_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(limit)),
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.drain.borrow() == DrainState::Stopped
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// True while the session that started at `epoch` is still running.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch && !self.is_stopped()
    }

    /// Idle -> Draining. Call with the queue lock held.
    ///
    /// Returns the session epoch the new drain belongs to.
    pub(crate) fn try_begin_drain(&self) -> Option<u64> {
        let began = self.drain.send_if_modified(|state| {
            if *state == DrainState::Idle {
                *state = DrainState::Draining;
                true
            } else {
                false
            }
        });
        began.then(|| self.epoch())
    }

    /// Draining -> Idle. Call with the queue lock held.
    ///
    /// A drain from an earlier session must not touch the current one's state.
    pub(crate) fn end_drain(&self, epoch: u64) {
        if self.epoch() != epoch {
            return;
        }
        self.drain.send_if_modified(|state| {
            if *state == DrainState::Draining {
                *state = DrainState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Sleep for `delay` unless the session from `epoch` ends first.
    /// Returns false when it ended.
    pub(crate) async fn pause(&self, delay: Duration, epoch: u64) -> bool {
        let mut rx = self.drain.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(delay) => self.is_current(epoch),
            _ = rx.wait_for(|state| *state == DrainState::Stopped || self.epoch() != epoch) => false,
        }
    }

    /// Copy the queue's action entries into the snapshot.
    pub(crate) fn publish_pending(&self) {
        self.store.update(|state| {
            state.pending_changes = self.queue.lock().pending_changes();
        });
    }

    pub(crate) fn stop_reconciler(&self) {
        if let Some(handle) = self.reconciler.lock().take() {
            handle.request_shutdown();
        }
    }

    /// Tear the session down: timer, queue, token, snapshot.
    pub(crate) fn shutdown_session(&self, error: Option<String>) {
        self.stop_reconciler();
        {
            let mut queue = self.queue.lock();
            queue.clear();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.drain.send_replace(DrainState::Stopped);
        }
        *self.session.lock() = None;
        self.store.update(|state| {
            *state = AppState {
                error,
                ..AppState::default()
            };
        });
    }

    pub(crate) fn expire_session(&self) {
        warn!("session expired; logging out");
        self.shutdown_session(Some(SESSION_EXPIRED_MESSAGE.to_string()));
    }

    pub(crate) fn spawn_drain(self: &Arc<Self>, epoch: u64) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = shared.drain(epoch).await {
                warn!(error = %e, "drain stopped");
                // A logout that raced the failing call already tore the session down.
                if shared.is_current(epoch) {
                    shared.expire_session();
                }
            }
        });
    }

    pub(crate) fn start_reconciler(self: &Arc<Self>) {
        let period = *self.reconcile_interval.lock();
        let handle = ReconcilerHandle::spawn(Arc::clone(self), period);
        if let Some(previous) = self.reconciler.lock().replace(handle) {
            previous.request_shutdown();
        }
        debug!(?period, "reconciliation started");
    }

    pub(crate) fn clear_conflict(&self, task_id: &TemplateId) -> bool {
        self.store.update_if(|state| {
            state
                .tasks
                .iter_mut()
                .find(|t| &t.id == task_id)
                .is_some_and(|t| t.clear_conflict())
        })
    }
}

/// Builds a [`SyncEngine`].
///
/// # 使用例
/// ```ignore
/// let engine = SyncEngine::builder(backend)
///     .config(SyncConfig::load(None)?)
///     .build()?;
/// ```
///
/// `build()` validates the config (fail-fast).
pub struct EngineBuilder {
    backend: Arc<dyn TaskBackend>,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    store: Option<StateStore>,
    auto_drain: bool,
}

impl EngineBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Share an existing store (e.g. one the UI already subscribed to).
    pub fn store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// When false, `enqueue_action` only queues; the host drives
    /// [`SyncEngine::process_queue`] itself.
    pub fn auto_drain(mut self, auto_drain: bool) -> Self {
        self.auto_drain = auto_drain;
        self
    }

    pub fn build(self) -> Result<SyncEngine, ConfigError> {
        self.config.validate()?;
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&self.clock))));
        let (drain, _) = watch::channel(DrainState::Stopped);
        let shared = Shared {
            backend: self.backend,
            store: self.store.unwrap_or_default(),
            queue: Mutex::new(MutationQueue::new()),
            drain,
            epoch: AtomicU64::new(0),
            session: Mutex::new(None),
            reconciler: Mutex::new(None),
            reconcile_interval: Mutex::new(self.config.reconcile_interval()),
            retry_policy: self.config.retry_policy(),
            config: self.config,
            clock: self.clock,
            ids,
            auto_drain: self.auto_drain,
        };
        Ok(SyncEngine {
            shared: Arc::new(shared),
        })
    }
}

/// Handle to one user session's sync core. Clones share the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<Shared>,
}

impl SyncEngine {
    pub fn builder(backend: Arc<dyn TaskBackend>) -> EngineBuilder {
        EngineBuilder {
            backend,
            config: SyncConfig::default(),
            clock: Arc::new(SystemClock),
            ids: None,
            store: None,
            auto_drain: true,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.shared.store
    }

    pub fn snapshot(&self) -> AppState {
        self.shared.store.snapshot()
    }

    pub fn subscribe(&self, listener: impl Fn(&AppState) + Send + Sync + 'static) -> Subscription {
        self.shared.store.subscribe(listener)
    }

    /// Authenticate, load aggregates and start periodic reconciliation.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SyncError> {
        let shared = &self.shared;
        shared.store.update(|state| {
            state.is_loading = true;
            state.error = None;
        });

        let response = match shared.call(shared.backend.login(email, password)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "login failed");
                shared.store.update(|state| {
                    state.is_loading = false;
                    state.error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        *shared.session.lock() = Some(response.token);
        {
            let mut queue = shared.queue.lock();
            queue.clear();
            shared.epoch.fetch_add(1, Ordering::SeqCst);
            shared.drain.send_replace(DrainState::Idle);
        }
        let user = response.user;
        shared.store.update(|state| {
            state.is_authenticated = true;
            state.user = Some(user.clone());
            state.pending_changes.clear();
        });
        info!(email = %user.email, "logged in");

        self.refresh_tasks().await?;
        self.init();
        Ok(user)
    }

    /// Purely local: stops the timer, drops queued intents, forgets the token.
    #[instrument(skip(self))]
    pub fn logout(&self) {
        self.shared.shutdown_session(None);
        info!("logged out");
    }

    /// Replace the task list with a fresh backend load.
    ///
    /// Errors other than session expiry land in the snapshot's `error`.
    pub async fn refresh_tasks(&self) -> Result<(), SyncError> {
        let shared = &self.shared;
        shared.store.update(|state| state.is_loading = true);
        match shared.fetch_aggregates().await {
            Ok(tasks) => {
                shared.store.update(|state| {
                    state.tasks = tasks;
                    state.is_loading = false;
                });
                Ok(())
            }
            Err(e) if e.is_session_expired() => {
                shared.expire_session();
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "failed to load tasks");
                shared.store.update(|state| {
                    state.is_loading = false;
                    state.error = Some(format!("Failed to load tasks: {e}"));
                });
                Ok(())
            }
        }
    }

    /// Apply `action` optimistically and queue it for the backend.
    ///
    /// Returns the queued entry id, or `None` when the intent was skipped
    /// (no session, unknown aggregate, no eligible record).
    #[instrument(skip(self))]
    pub fn enqueue_action(&self, task_id: &TemplateId, action: Action) -> Option<EntryId> {
        let shared = &self.shared;
        if shared.is_stopped() {
            warn!("ignoring intent without an active session");
            return None;
        }
        let now = shared.clock.now();
        let mut queued = None;
        shared.store.update_if(|state| {
            let Some(task) = state.tasks.iter_mut().find(|t| &t.id == task_id) else {
                warn!("ignoring intent for unknown task");
                return false;
            };
            let original = task.clone();
            if let Err(e) = task.apply_optimistic(action, now) {
                warn!(error = %e, "ignoring intent");
                return false;
            }

            let mut queue = shared.queue.lock();
            if shared.is_stopped() {
                *task = original;
                return false;
            }
            let entry = ActionEntry::new(
                shared.ids.generate_entry_id(),
                original,
                action,
                now,
                shared.retry_policy.max_retries,
            );
            let refresh = RefreshEntry {
                id: shared.ids.generate_entry_id(),
                timestamp: now,
            };
            let entry_id = entry.id;
            queue.enqueue_action(entry, refresh);
            let start = if shared.auto_drain {
                shared.try_begin_drain()
            } else {
                None
            };
            state.pending_changes = queue.pending_changes();
            queued = Some((entry_id, start));
            true
        });

        let (entry_id, start) = queued?;
        debug!(%entry_id, %action, "intent queued");
        if let Some(epoch) = start {
            shared.spawn_drain(epoch);
        }
        Some(entry_id)
    }

    /// Drain the queue in the caller's task.
    ///
    /// No-op when a drain is already running. `SessionExpired` is returned after
    /// the queue has been cleared; the caller must then log out.
    pub async fn process_queue(&self) -> Result<(), SyncError> {
        let began = {
            let _queue = self.shared.queue.lock();
            self.shared.try_begin_drain()
        };
        let Some(epoch) = began else {
            debug!("drain already running or session stopped");
            return Ok(());
        };
        self.shared.drain(epoch).await
    }

    /// One reconciliation pass against the backend.
    pub async fn sync_with_backend(&self) -> Result<ReconcileOutcome, SyncError> {
        self.shared.reconcile_once().await
    }

    pub fn clear_conflict(&self, task_id: &TemplateId) -> bool {
        self.shared.clear_conflict(task_id)
    }

    pub fn dismiss_error(&self) {
        self.shared.store.update_if(|state| state.error.take().is_some());
    }

    pub fn get_status(&self) -> QueueStatus {
        let queue = self.shared.queue.lock();
        queue.status(self.shared.drain.borrow().is_draining())
    }

    /// Start (or restart) periodic reconciliation.
    pub fn init(&self) {
        self.shared.start_reconciler();
    }

    /// Stop periodic reconciliation. Queued intents are kept.
    pub fn stop(&self) {
        self.shared.stop_reconciler();
    }

    pub fn is_reconciling(&self) -> bool {
        self.shared.reconciler.lock().is_some()
    }

    /// Change the reconciliation period; a running timer restarts with it.
    ///
    /// A zero period is rejected and the current timer keeps running.
    pub fn set_reconcile_interval(&self, period: Duration) -> Result<(), ConfigError> {
        if period.is_zero() {
            return Err(ConfigError::InvalidValue(
                "reconcile interval must be greater than 0".into(),
            ));
        }
        *self.shared.reconcile_interval.lock() = period;
        if self.is_reconciling() {
            self.shared.start_reconciler();
        }
        Ok(())
    }

    /// Resolve once no drain is running.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.shared.drain.subscribe();
        // the sender lives in Shared, so the channel cannot close while we hold self
        let _ = rx.wait_for(|state| !state.is_draining()).await;
    }
}
