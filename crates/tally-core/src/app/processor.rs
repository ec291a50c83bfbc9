//! Queue processor - 単一のドレインループ
//!
//! # 設計
//! - ドレインは常に 1 本だけ（DrainState が Draining の間は新しいドレインを起動しない）
//! - ループは毎回 queue ロックの下で先頭を読み、停止済みなら即終了する
//! - 取り出し・並べ替えは `*_if(id)` 系で行うので、並行する clear() を巻き戻さない
//!
//! # 待機点
//! - 再試行前のバックオフ
//! - refresh 前の settle 待ち
//!
//! どちらも `pause()` で停止（logout / セッション失効）に割り込まれる。

use tracing::{debug, info, warn};

use super::engine::Shared;
use super::revert::revert;
use crate::domain::{ErrorKind, SyncError};
use crate::queue::{ActionEntry, QueueEntry, RefreshEntry, Requeue};

impl Shared {
    /// Run the drain loop for the session started at `epoch`. The caller must
    /// already have moved Idle -> Draining.
    ///
    /// Errors only surface while that session is still current.
    pub(crate) async fn drain(&self, epoch: u64) -> Result<(), SyncError> {
        let result = self.drain_loop(epoch).await;
        if result.is_err() {
            let _queue = self.queue.lock();
            self.end_drain(epoch);
        }
        result
    }

    async fn drain_loop(&self, epoch: u64) -> Result<(), SyncError> {
        loop {
            let head = {
                let queue = self.queue.lock();
                if !self.is_current(epoch) {
                    debug!(epoch, "session ended; drain exits");
                    return Ok(());
                }
                match queue.head() {
                    Some(head) => head,
                    None => {
                        self.end_drain(epoch);
                        debug!("queue drained");
                        return Ok(());
                    }
                }
            };

            match head {
                QueueEntry::Refresh(refresh) => self.run_refresh(refresh, epoch).await?,
                QueueEntry::Action(entry) => self.run_action(entry, epoch).await?,
            }
        }
    }

    async fn run_refresh(&self, refresh: RefreshEntry, epoch: u64) -> Result<(), SyncError> {
        if self.queue.lock().take_refresh_if(refresh.id).is_none() {
            return Ok(());
        }
        if !self.pause(self.config.refresh_delay(), epoch).await {
            return Ok(());
        }

        let result = self.fetch_aggregates().await;
        if !self.is_current(epoch) {
            return Ok(());
        }
        match result {
            Ok(tasks) => {
                self.store.update_if(|state| {
                    if !self.is_current(epoch) {
                        return false;
                    }
                    state.tasks = tasks;
                    state.pending_changes = self.queue.lock().pending_changes();
                    true
                });
                debug!(refresh_id = %refresh.id, "refreshed aggregates");
                Ok(())
            }
            Err(e) if e.is_session_expired() => {
                self.abandon_queue(epoch);
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "refresh failed; keeping local state");
                Ok(())
            }
        }
    }

    async fn run_action(&self, entry: ActionEntry, epoch: u64) -> Result<(), SyncError> {
        let result = self.dispatch(&entry).await;
        if !self.is_current(epoch) {
            debug!(entry_id = %entry.id, "session ended during the call; result ignored");
            return Ok(());
        }
        match result {
            Ok(()) => {
                self.queue.lock().pop_action_if(entry.id);
                self.publish_pending();
                info!(entry_id = %entry.id, task_id = %entry.task_id, action = %entry.action, "intent applied");
                Ok(())
            }
            Err(e) if e.is_session_expired() => {
                self.abandon_queue(epoch);
                Err(e)
            }
            Err(e) if e.kind() == ErrorKind::Invariant => {
                // Nothing to send for this snapshot; retrying cannot help.
                warn!(entry_id = %entry.id, error = %e, "dropping intent");
                self.queue.lock().pop_action_if(entry.id);
                self.publish_pending();
                Ok(())
            }
            Err(e) => {
                let outcome = {
                    let mut queue = self.queue.lock();
                    match queue.pop_action_if(entry.id) {
                        Some(popped) => Some(queue.requeue_with_backoff(popped, &self.retry_policy)),
                        None => None,
                    }
                };
                match outcome {
                    Some(Requeue::Retry { delay, retry_count }) => {
                        warn!(
                            entry_id = %entry.id,
                            retry_count,
                            ?delay,
                            error = %e,
                            "intent failed; retrying"
                        );
                        self.publish_pending();
                        self.pause(delay, epoch).await;
                    }
                    Some(Requeue::Exhausted(failed)) => self.give_up(failed, &e),
                    // Cleared underneath us.
                    None => {}
                }
                Ok(())
            }
        }
    }

    /// Send the status transition implied by `entry`.
    async fn dispatch(&self, entry: &ActionEntry) -> Result<(), SyncError> {
        let target = entry.original_task.select_target(entry.action)?;
        let token = self.token()?;
        let status = entry.action.target_status();
        self.call(self.backend.transition_status(&token, &target.id, status))
            .await
            .map(|_| ())
    }

    /// Compensate a permanently failed intent and tell the user once.
    fn give_up(&self, failed: ActionEntry, cause: &SyncError) {
        let now = self.clock.now();
        let message = format!(
            "Failed to {} task after {} attempts. Please try again.",
            failed.action.verb(),
            failed.max_retries
        );
        warn!(entry_id = %failed.id, task_id = %failed.task_id, error = %cause, "retries exhausted; reverting");
        self.store.update(|state| {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == failed.task_id) {
                revert(task, failed.action, now);
            }
            state.error = Some(message);
            state.pending_changes = self.queue.lock().pending_changes();
        });
    }

    fn abandon_queue(&self, epoch: u64) {
        {
            let mut queue = self.queue.lock();
            if self.epoch() != epoch {
                return;
            }
            queue.clear();
        }
        self.publish_pending();
    }
}
