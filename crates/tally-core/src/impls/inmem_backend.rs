//! InMemoryBackend - 開発・デモ・テスト用のバックエンド
//!
//! # 学習ポイント
//! - 障害注入（次の N 回 / 常に失敗、セッション失効）で再試行経路を再現する
//! - 呼び出し回数を数えて「fetch を呼んでいない」ことを検証できる
//! - `latency` を入れると engine 側のタイムアウトや並行 enqueue を試せる

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{ActionStatus, RawActionRecord, RecordId, SyncError, User};
use crate::ports::{AuthToken, Clock, LoginResponse, TaskBackend};

/// How transition calls should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    Never,
    /// Fail the next `n` calls, then succeed.
    Next(u32),
    Always,
}

impl FailureMode {
    /// Consume one failure. Returns true when this call should fail.
    fn trip(&mut self) -> bool {
        match *self {
            FailureMode::Never => false,
            FailureMode::Always => true,
            FailureMode::Next(0) => {
                *self = FailureMode::Never;
                false
            }
            FailureMode::Next(n) => {
                *self = if n == 1 {
                    FailureMode::Never
                } else {
                    FailureMode::Next(n - 1)
                };
                true
            }
        }
    }
}

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCalls {
    pub login: u32,
    /// One per `fetch_tasks_by_status` call (three per full load).
    pub fetch: u32,
    pub transition: u32,
}

struct Account {
    password: String,
    user: User,
}

#[derive(Default)]
struct BackendState {
    records: Vec<RawActionRecord>,
    accounts: HashMap<String, Account>,
    tokens: HashSet<String>,
    next_token: u64,
    transition_failures: FailureMode,
    fetch_failures: FailureMode,
    calls: BackendCalls,
    transitions: Vec<(RecordId, ActionStatus)>,
    latency: Duration,
}

pub struct InMemoryBackend {
    state: Mutex<BackendState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            clock,
        }
    }

    pub fn with_account(self, email: &str, password: &str, name: Option<&str>) -> Self {
        self.state.lock().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: User {
                    email: email.to_string(),
                    name: name.map(str::to_string),
                },
            },
        );
        self
    }

    pub fn with_records(self, records: impl IntoIterator<Item = RawActionRecord>) -> Self {
        self.state.lock().records.extend(records);
        self
    }

    pub fn set_transition_failures(&self, mode: FailureMode) {
        self.state.lock().transition_failures = mode;
    }

    pub fn set_fetch_failures(&self, mode: FailureMode) {
        self.state.lock().fetch_failures = mode;
    }

    /// Simulated response time for every call.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Invalidate every issued token; later calls answer `SessionExpired`.
    pub fn expire_sessions(&self) {
        self.state.lock().tokens.clear();
    }

    /// Change a record behind the client's back (another device, an admin, ...).
    pub fn set_record_status(&self, id: &RecordId, status: ActionStatus) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let Some(record) = state.records.iter_mut().find(|r| &r.id == id) else {
            return false;
        };
        apply_status(record, status, now);
        true
    }

    pub fn records(&self) -> Vec<RawActionRecord> {
        self.state.lock().records.clone()
    }

    pub fn record(&self, id: &RecordId) -> Option<RawActionRecord> {
        self.state.lock().records.iter().find(|r| &r.id == id).cloned()
    }

    pub fn calls(&self) -> BackendCalls {
        self.state.lock().calls
    }

    /// Successful transitions in the order they were applied.
    pub fn transitions(&self) -> Vec<(RecordId, ActionStatus)> {
        self.state.lock().transitions.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

fn apply_status(record: &mut RawActionRecord, status: ActionStatus, now: chrono::DateTime<chrono::Utc>) {
    record.status = status;
    record.finished_at = match status {
        ActionStatus::Pending => None,
        ActionStatus::Done | ActionStatus::Delivered => Some(now),
    };
    record.updated_at = Some(now);
}

#[async_trait]
impl TaskBackend for InMemoryBackend {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, SyncError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.calls.login += 1;
        let user = match state.accounts.get(email) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(SyncError::LoginFailed("invalid email or password".into())),
        };
        state.next_token += 1;
        let token = format!("token-{}", state.next_token);
        state.tokens.insert(token.clone());
        Ok(LoginResponse {
            token: AuthToken::new(token),
            user,
        })
    }

    async fn fetch_tasks_by_status(
        &self,
        token: &AuthToken,
        status: ActionStatus,
    ) -> Result<Vec<RawActionRecord>, SyncError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.calls.fetch += 1;
        if !state.tokens.contains(token.as_str()) {
            return Err(SyncError::SessionExpired);
        }
        if state.fetch_failures.trip() {
            return Err(SyncError::FetchFailed("503 Service Unavailable".into()));
        }
        Ok(state
            .records
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn transition_status(
        &self,
        token: &AuthToken,
        record: &RecordId,
        status: ActionStatus,
    ) -> Result<RawActionRecord, SyncError> {
        self.simulate_latency().await;
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.calls.transition += 1;
        if !state.tokens.contains(token.as_str()) {
            return Err(SyncError::SessionExpired);
        }
        if state.transition_failures.trip() {
            return Err(SyncError::TransitionFailed("502 Bad Gateway".into()));
        }
        let Some(stored) = state.records.iter_mut().find(|r| &r.id == record) else {
            return Err(SyncError::TransitionFailed(format!("record {record} not found")));
        };
        apply_status(stored, status, now);
        let updated = stored.clone();
        state.transitions.push((record.clone(), status));
        Ok(updated)
    }
}
