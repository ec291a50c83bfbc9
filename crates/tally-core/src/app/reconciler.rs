//! Conflict reconciler - バックエンドを正とする定期照合
//!
//! # フロー（1 tick）
//! 1. キューが空でない / ドレイン中なら何もしない（fetch もしない）
//! 2. 全件 fetch
//! 3. fetch 中に enqueue が入っていたら結果を捨てる
//! 4. 件数が食い違う集約に conflict を付けて丸ごと置き換える
//! 5. conflict は一定時間後に自動で消す
//!
//! タイマーは WorkerGroup と同じく `watch::Sender<bool>` で止める。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::engine::Shared;
use crate::domain::{DrainState, SyncError, TaskAggregate, TemplateId};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Local intents pending; nothing was fetched.
    Skipped,
    /// Backend state replaced the local list.
    Applied { conflicts: Vec<TemplateId> },
    /// An intent arrived while fetching; the fetched state was dropped.
    Discarded,
    /// Fetch failed; local state untouched.
    Failed(String),
}

/// Compare fresh aggregates against the local ones; the fresh list wins.
///
/// Aggregates whose `execution_count` differs from the local copy come back
/// marked with a conflict at `now`. Returns the new list and the conflicted ids.
pub fn reconcile(
    local: &[TaskAggregate],
    fresh: Vec<TaskAggregate>,
    now: DateTime<Utc>,
) -> (Vec<TaskAggregate>, Vec<TemplateId>) {
    let local_counts: HashMap<&TemplateId, u32> =
        local.iter().map(|t| (&t.id, t.execution_count)).collect();

    let mut conflicts = Vec::new();
    let tasks = fresh
        .into_iter()
        .map(|mut task| {
            let differs = local_counts
                .get(&task.id)
                .is_some_and(|&count| count != task.execution_count);
            if differs {
                task.mark_conflict(now);
                conflicts.push(task.id.clone());
            }
            task
        })
        .collect();
    (tasks, conflicts)
}

/// Running reconcile timer.
pub(crate) struct ReconcilerHandle {
    shutdown_tx: watch::Sender<bool>,
    _join: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub(crate) fn spawn(shared: Arc<Shared>, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(reconcile_loop(shared, period, shutdown_rx));
        Self {
            shutdown_tx,
            _join: join,
        }
    }

    pub(crate) fn request_shutdown(&self) {
        // the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }
}

async fn reconcile_loop(shared: Arc<Shared>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match shared.reconcile_once().await {
            Ok(outcome) => debug!(?outcome, "reconcile tick"),
            Err(e) => {
                warn!(error = %e, "reconcile hit an expired session");
                shared.expire_session();
                break;
            }
        }
    }
    debug!("reconciliation stopped");
}

impl Shared {
    /// True while local intents own the task list (or there is no session).
    fn reconcile_blocked(&self) -> bool {
        let queue = self.queue.lock();
        !queue.is_empty() || *self.drain.borrow() != DrainState::Idle
    }

    pub(crate) async fn reconcile_once(self: &Arc<Self>) -> Result<ReconcileOutcome, SyncError> {
        if self.reconcile_blocked() {
            debug!("reconcile skipped; queue busy");
            return Ok(ReconcileOutcome::Skipped);
        }

        let epoch = self.epoch();
        let fresh = match self.fetch_aggregates().await {
            Ok(fresh) => fresh,
            Err(_) if !self.is_current(epoch) => return Ok(ReconcileOutcome::Discarded),
            Err(e) if e.is_session_expired() => return Err(e),
            Err(e) => {
                warn!(error = %e, "reconcile fetch failed");
                return Ok(ReconcileOutcome::Failed(e.to_string()));
            }
        };

        let now = self.clock.now();
        let mut conflicts = Vec::new();
        let applied = self.store.update_if(|state| {
            if !self.is_current(epoch) || self.reconcile_blocked() {
                return false;
            }
            let (tasks, flagged) = reconcile(&state.tasks, fresh, now);
            state.tasks = tasks;
            conflicts = flagged;
            true
        });
        if !applied {
            debug!("reconcile result discarded; intents arrived during fetch");
            return Ok(ReconcileOutcome::Discarded);
        }

        if !conflicts.is_empty() {
            info!(count = conflicts.len(), "conflicts detected; backend state applied");
            self.schedule_conflict_clear(conflicts.clone(), now);
        }
        Ok(ReconcileOutcome::Applied { conflicts })
    }

    /// Clear the given conflict markers after the configured delay, unless a
    /// newer conflict has replaced them in the meantime.
    fn schedule_conflict_clear(self: &Arc<Self>, ids: Vec<TemplateId>, marked_at: DateTime<Utc>) {
        let shared = Arc::clone(self);
        let epoch = self.epoch();
        tokio::spawn(async move {
            if !shared.pause(shared.config.conflict_clear_delay(), epoch).await {
                return;
            }
            shared.store.update_if(|state| {
                let mut changed = false;
                for task in state.tasks.iter_mut().filter(|t| ids.contains(&t.id)) {
                    if task.conflict_timestamp == Some(marked_at) {
                        changed |= task.clear_conflict();
                    }
                }
                changed
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn agg(id: &str, executed: u32, target: u32) -> TaskAggregate {
        let mut a = TaskAggregate::from_records(TemplateId::new(id), vec![]);
        a.execution_count = executed;
        a.target_count = target;
        a.refresh_completion();
        a
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
    }

    #[test]
    fn differing_count_is_flagged_and_backend_wins() {
        let (tasks, conflicts) = reconcile(&[agg("T1", 3, 6)], vec![agg("T1", 5, 6)], now());

        assert_eq!(conflicts, vec![TemplateId::new("T1")]);
        assert_eq!(tasks[0].execution_count, 5);
        assert!(tasks[0].has_conflict);
        assert_eq!(tasks[0].conflict_timestamp, Some(now()));
    }

    #[test]
    fn equal_counts_are_not_a_conflict() {
        let (tasks, conflicts) = reconcile(&[agg("T1", 3, 6)], vec![agg("T1", 3, 6)], now());

        assert!(conflicts.is_empty());
        assert!(!tasks[0].has_conflict);
        assert_eq!(tasks[0].conflict_timestamp, None);
    }

    #[test]
    fn unknown_and_vanished_aggregates_follow_the_backend() {
        let (tasks, conflicts) = reconcile(
            &[agg("gone", 1, 2), agg("kept", 1, 2)],
            vec![agg("kept", 1, 2), agg("new", 0, 4)],
            now(),
        );

        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["kept", "new"]);
        assert!(conflicts.is_empty());
    }
}
