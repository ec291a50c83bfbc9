//! Task aggregate model.
//!
//! Groups raw records by template id and derives the counts the UI shows.
//!
//! Invariants (after `from_records` / `refresh_completion`):
//! - `target_count` == number of records in `tasks`
//! - `execution_count` == records with status Done or Delivered
//! - `is_completed` <=> `execution_count == target_count && target_count > 0`
//!
//! Optimistic patches and reverts adjust `execution_count` directly (clamped to
//! `0..=target_count`) alongside the record they touch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;
use super::errors::SyncError;
use super::ids::{RecordId, TemplateId};
use super::record::{ActionStatus, RawActionRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAggregate {
    pub id: TemplateId,
    pub name: String,
    pub team_name: Option<String>,
    pub execution_count: u32,
    pub target_count: u32,
    pub is_completed: bool,
    pub has_conflict: bool,
    pub conflict_timestamp: Option<DateTime<Utc>>,
    pub tasks: Vec<RawActionRecord>,
}

impl TaskAggregate {
    /// Build one aggregate from the records sharing `id`.
    pub fn from_records(id: TemplateId, tasks: Vec<RawActionRecord>) -> Self {
        let name = tasks
            .first()
            .map(|t| t.action_title.clone())
            .unwrap_or_default();
        let team_name = tasks.iter().find_map(|t| t.team_name.clone());
        let target_count = tasks.len() as u32;
        let execution_count = tasks.iter().filter(|t| t.status.is_executed()).count() as u32;
        let mut aggregate = Self {
            id,
            name,
            team_name,
            execution_count,
            target_count,
            is_completed: false,
            has_conflict: false,
            conflict_timestamp: None,
            tasks,
        };
        aggregate.refresh_completion();
        aggregate
    }

    pub fn refresh_completion(&mut self) {
        self.is_completed = self.target_count > 0 && self.execution_count == self.target_count;
    }

    /// The pending record with the smallest `created_at`.
    pub fn select_oldest_pending(&self) -> Result<&RawActionRecord, SyncError> {
        self.tasks
            .iter()
            .filter(|t| t.status == ActionStatus::Pending)
            .min_by_key(|t| t.created_at)
            .ok_or_else(|| SyncError::NoPendingTask(self.id.clone()))
    }

    /// The done record with the largest `created_at`.
    pub fn select_newest_done(&self) -> Result<&RawActionRecord, SyncError> {
        self.tasks
            .iter()
            .filter(|t| t.status == ActionStatus::Done)
            .max_by_key(|t| t.created_at)
            .ok_or_else(|| SyncError::NoDoneTask(self.id.clone()))
    }

    /// Record a backend call for `action` would target.
    pub fn select_target(&self, action: Action) -> Result<&RawActionRecord, SyncError> {
        match action {
            Action::Increment => self.select_oldest_pending(),
            Action::Decrement => self.select_newest_done(),
        }
    }

    /// Apply `action` locally before the backend has confirmed it.
    ///
    /// Returns the id of the patched record. Leaves the aggregate untouched when
    /// no eligible record exists.
    pub fn apply_optimistic(
        &mut self,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<RecordId, SyncError> {
        let target = self.select_target(action)?.id.clone();
        let Some(record) = self.record_mut(&target) else {
            return Err(match action {
                Action::Increment => SyncError::NoPendingTask(self.id.clone()),
                Action::Decrement => SyncError::NoDoneTask(self.id.clone()),
            });
        };
        match action {
            Action::Increment => {
                record.status = ActionStatus::Done;
                record.finished_at = Some(now);
                self.execution_count = (self.execution_count + 1).min(self.target_count);
            }
            Action::Decrement => {
                record.status = ActionStatus::Pending;
                record.finished_at = None;
                self.execution_count = self.execution_count.saturating_sub(1);
            }
        }
        self.refresh_completion();
        Ok(target)
    }

    pub fn record_mut(&mut self, id: &RecordId) -> Option<&mut RawActionRecord> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    pub fn mark_conflict(&mut self, at: DateTime<Utc>) {
        self.has_conflict = true;
        self.conflict_timestamp = Some(at);
    }

    /// Clear the conflict marker. Returns false when there was nothing to clear.
    pub fn clear_conflict(&mut self) -> bool {
        if !self.has_conflict && self.conflict_timestamp.is_none() {
            return false;
        }
        self.has_conflict = false;
        self.conflict_timestamp = None;
        true
    }
}

/// Group raw records by template id.
///
/// Output order follows the first appearance of each template id.
pub fn aggregate(records: impl IntoIterator<Item = RawActionRecord>) -> Vec<TaskAggregate> {
    let mut order: Vec<TemplateId> = Vec::new();
    let mut groups: HashMap<TemplateId, Vec<RawActionRecord>> = HashMap::new();
    for record in records {
        let key = record.action_template_id.clone();
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(record);
    }
    order
        .into_iter()
        .filter_map(|id| {
            let tasks = groups.remove(&id)?;
            Some(TaskAggregate::from_records(id, tasks))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 12, hour, 0, 0).unwrap()
    }

    fn record(id: &str, template: &str, status: ActionStatus, hour: u32) -> RawActionRecord {
        RawActionRecord::new(
            RecordId::new(id),
            TemplateId::new(template),
            format!("title {template}"),
            status,
            at(hour),
        )
    }

    #[test]
    fn groups_in_first_seen_order_with_counts() {
        let aggregates = aggregate(vec![
            record("1", "b", ActionStatus::Pending, 1),
            record("2", "a", ActionStatus::Done, 2),
            record("3", "b", ActionStatus::Delivered, 3),
            record("4", "a", ActionStatus::Done, 4),
        ]);
        let ids: Vec<&str> = aggregates.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        assert_eq!(aggregates[0].target_count, 2);
        assert_eq!(aggregates[0].execution_count, 1);
        assert!(!aggregates[0].is_completed);

        assert_eq!(aggregates[1].target_count, 2);
        assert_eq!(aggregates[1].execution_count, 2);
        assert!(aggregates[1].is_completed);
        assert_eq!(aggregates[1].name, "title a");
    }

    #[test]
    fn empty_aggregate_is_never_completed() {
        let agg = TaskAggregate::from_records(TemplateId::new("t"), vec![]);
        assert_eq!(agg.target_count, 0);
        assert!(!agg.is_completed);
    }

    #[test]
    fn selection_is_fifo_on_pending_and_lifo_on_done() {
        let pending = TaskAggregate::from_records(
            TemplateId::new("t"),
            vec![
                record("c3", "t", ActionStatus::Pending, 3),
                record("c1", "t", ActionStatus::Pending, 1),
                record("c2", "t", ActionStatus::Pending, 2),
            ],
        );
        assert_eq!(pending.select_oldest_pending().unwrap().id.as_str(), "c1");

        let done = TaskAggregate::from_records(
            TemplateId::new("t"),
            vec![
                record("c3", "t", ActionStatus::Done, 3),
                record("c1", "t", ActionStatus::Done, 1),
                record("c2", "t", ActionStatus::Done, 2),
            ],
        );
        assert_eq!(done.select_newest_done().unwrap().id.as_str(), "c3");
    }

    #[test]
    fn delivered_records_are_not_rollback_targets() {
        let agg = TaskAggregate::from_records(
            TemplateId::new("t"),
            vec![record("d", "t", ActionStatus::Delivered, 1)],
        );
        assert_eq!(
            agg.select_newest_done(),
            Err(SyncError::NoDoneTask(TemplateId::new("t")))
        );
        assert_eq!(
            agg.select_oldest_pending(),
            Err(SyncError::NoPendingTask(TemplateId::new("t")))
        );
    }

    #[rstest]
    #[case::increment(Action::Increment, "p1", 2, ActionStatus::Done)]
    #[case::decrement(Action::Decrement, "d2", 0, ActionStatus::Pending)]
    fn optimistic_patch_moves_one_record(
        #[case] action: Action,
        #[case] expected_record: &str,
        #[case] expected_count: u32,
        #[case] expected_status: ActionStatus,
    ) {
        let mut agg = TaskAggregate::from_records(
            TemplateId::new("t"),
            vec![
                record("d2", "t", ActionStatus::Done, 2),
                record("p1", "t", ActionStatus::Pending, 1),
            ],
        );
        let patched = agg.apply_optimistic(action, at(9)).unwrap();
        assert_eq!(patched.as_str(), expected_record);
        assert_eq!(agg.execution_count, expected_count);
        assert_eq!(agg.record_mut(&patched).unwrap().status, expected_status);
    }

    #[test]
    fn optimistic_increment_completes_aggregate() {
        let mut agg = TaskAggregate::from_records(
            TemplateId::new("t"),
            vec![record("p1", "t", ActionStatus::Pending, 1)],
        );
        agg.apply_optimistic(Action::Increment, at(9)).unwrap();
        assert!(agg.is_completed);
        assert_eq!(agg.tasks[0].finished_at, Some(at(9)));
    }

    #[test]
    fn optimistic_patch_without_target_leaves_aggregate_untouched() {
        let mut agg = TaskAggregate::from_records(
            TemplateId::new("t"),
            vec![record("d", "t", ActionStatus::Done, 1)],
        );
        let before = agg.clone();
        assert!(agg.apply_optimistic(Action::Increment, at(9)).is_err());
        assert_eq!(agg, before);
    }

    #[test]
    fn clearing_a_clear_conflict_is_a_noop() {
        let mut agg = TaskAggregate::from_records(TemplateId::new("t"), vec![]);
        assert!(!agg.clear_conflict());
        agg.mark_conflict(at(1));
        assert!(agg.clear_conflict());
        assert!(!agg.has_conflict);
        assert_eq!(agg.conflict_timestamp, None);
    }
}
