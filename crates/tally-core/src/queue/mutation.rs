//! Mutation queue: ordered action entries plus at most one trailing refresh.
//!
//! Design:
//! - Actions live in a `VecDeque`; the refresh marker is a separate `Option`.
//!   "At most one refresh, always last" therefore holds by construction.
//! - Producers only append (`enqueue_action`). Removal and reordering happen
//!   through the `*_if` methods, which the single drain loop calls with the id
//!   it inspected, so a concurrent `clear` is never undone.

use std::collections::VecDeque;

use super::entry::{ActionEntry, QueueEntry, RefreshEntry};
use super::retry::RetryPolicy;
use crate::domain::EntryId;
use crate::status::QueueStatus;

/// What happened to a failed entry handed to `requeue_with_backoff`.
#[derive(Debug, Clone, PartialEq)]
pub enum Requeue {
    /// Reinserted before the refresh marker; wait `delay` before resuming.
    Retry { delay: std::time::Duration, retry_count: u32 },
    /// `max_retries` reached. The entry is no longer in the queue.
    Exhausted(ActionEntry),
}

#[derive(Debug, Default)]
pub struct MutationQueue {
    actions: VecDeque<ActionEntry>,
    refresh: Option<RefreshEntry>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an intent and move the refresh marker behind it.
    pub fn enqueue_action(&mut self, entry: ActionEntry, refresh: RefreshEntry) {
        self.actions.push_back(entry);
        self.refresh = Some(refresh);
    }

    /// Entry the drain loop should execute next.
    pub fn head(&self) -> Option<QueueEntry> {
        match self.actions.front() {
            Some(action) => Some(QueueEntry::Action(action.clone())),
            None => self.refresh.map(QueueEntry::Refresh),
        }
    }

    /// Pop the head action if it is still `id`.
    pub fn pop_action_if(&mut self, id: EntryId) -> Option<ActionEntry> {
        if self.actions.front().is_some_and(|a| a.id == id) {
            self.actions.pop_front()
        } else {
            None
        }
    }

    /// Take the refresh marker if it is the head and still `id`.
    pub fn take_refresh_if(&mut self, id: EntryId) -> Option<RefreshEntry> {
        if self.actions.is_empty() && self.refresh.is_some_and(|r| r.id == id) {
            self.refresh.take()
        } else {
            None
        }
    }

    /// Count a failure against `entry` and either put it back or give up.
    ///
    /// A retried entry goes to the back of the actions, i.e. immediately before
    /// the refresh marker.
    pub fn requeue_with_backoff(&mut self, mut entry: ActionEntry, policy: &RetryPolicy) -> Requeue {
        entry.retry_count += 1;
        if entry.retry_count >= entry.max_retries {
            return Requeue::Exhausted(entry);
        }
        let retry_count = entry.retry_count;
        self.actions.push_back(entry);
        Requeue::Retry {
            delay: policy.next_delay(retry_count),
            retry_count,
        }
    }

    pub fn clear(&mut self) {
        self.actions.clear();
        self.refresh = None;
    }

    /// Total entries including the refresh marker.
    pub fn len(&self) -> usize {
        self.actions.len() + usize::from(self.refresh.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.refresh.is_none()
    }

    pub fn has_refresh(&self) -> bool {
        self.refresh.is_some()
    }

    /// Action entries in queue order (refresh excluded).
    pub fn pending_changes(&self) -> Vec<ActionEntry> {
        self.actions.iter().cloned().collect()
    }

    /// Every entry in execution order.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.actions
            .iter()
            .cloned()
            .map(QueueEntry::Action)
            .chain(self.refresh.map(QueueEntry::Refresh))
            .collect()
    }

    pub fn status(&self, is_processing: bool) -> QueueStatus {
        QueueStatus {
            queue_length: self.len(),
            pending_actions: self.actions.len(),
            has_refresh: self.has_refresh(),
            is_processing,
        }
    }
}
