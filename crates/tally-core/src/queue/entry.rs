//! Queue entries: user intents and the trailing refresh marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Action, EntryId, TaskAggregate, TemplateId};

/// One pending user intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    pub id: EntryId,
    pub task_id: TemplateId,
    pub action: Action,

    /// Aggregate as it was before the optimistic patch. The backend call
    /// targets a record selected from this snapshot.
    pub original_task: TaskAggregate,

    pub timestamp: DateTime<Utc>,

    /// Failed attempts so far.
    pub retry_count: u32,

    pub max_retries: u32,
}

impl ActionEntry {
    pub fn new(
        id: EntryId,
        original_task: TaskAggregate,
        action: Action,
        timestamp: DateTime<Utc>,
        max_retries: u32,
    ) -> Self {
        Self {
            id,
            task_id: original_task.id.clone(),
            action,
            original_task,
            timestamp,
            retry_count: 0,
            max_retries,
        }
    }
}

/// Marker asking the drain loop to refetch aggregates once the actions ahead
/// of it have been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshEntry {
    pub id: EntryId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueEntry {
    Action(ActionEntry),
    Refresh(RefreshEntry),
}

impl QueueEntry {
    pub fn id(&self) -> EntryId {
        match self {
            QueueEntry::Action(a) => a.id,
            QueueEntry::Refresh(r) => r.id,
        }
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self, QueueEntry::Refresh(_))
    }
}
