//! Revert - 再試行が尽きたエントリの補償処理
//!
//! バックエンドの応答がないので「どのレコードを動かしたか」は推測になる:
//! - increment の失敗: DONE のうち最も最近終わったもの（finished_at、なければ created_at）を PENDING に戻す
//! - decrement の失敗: PENDING のうち最も新しく作られたものを DONE に戻す
//!
//! 推測が外れても件数は正しく、次の refresh / reconcile でレコード単位も正される。

use chrono::{DateTime, Utc};

use crate::domain::{Action, ActionStatus, RecordId, TaskAggregate};

/// Undo the optimistic effect of a failed `action` on the live aggregate.
///
/// Counts move even when no matching record is found. Returns the record that
/// was flipped, if any.
pub fn revert(
    aggregate: &mut TaskAggregate,
    action: Action,
    now: DateTime<Utc>,
) -> Option<RecordId> {
    let flipped = match action {
        Action::Increment => {
            let record = aggregate
                .tasks
                .iter_mut()
                .filter(|t| t.status == ActionStatus::Done)
                .max_by_key(|t| t.completed_at());
            record.map(|r| {
                r.status = ActionStatus::Pending;
                r.finished_at = None;
                r.id.clone()
            })
        }
        Action::Decrement => {
            let record = aggregate
                .tasks
                .iter_mut()
                .filter(|t| t.status == ActionStatus::Pending)
                .max_by_key(|t| t.created_at);
            record.map(|r| {
                r.status = ActionStatus::Done;
                r.finished_at = Some(now);
                r.id.clone()
            })
        }
    };

    aggregate.execution_count = match action {
        Action::Increment => aggregate.execution_count.saturating_sub(1),
        Action::Decrement => (aggregate.execution_count + 1).min(aggregate.target_count),
    };
    aggregate.refresh_completion();
    aggregate.clear_conflict();
    flipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RawActionRecord, TemplateId};
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 13, hour, 0, 0).unwrap()
    }

    fn record(id: &str, status: ActionStatus, created: u32, finished: Option<u32>) -> RawActionRecord {
        let mut r = RawActionRecord::new(
            RecordId::new(id),
            TemplateId::new("t"),
            "x",
            status,
            at(created),
        );
        r.finished_at = finished.map(at);
        r
    }

    #[test]
    fn failed_increment_reopens_most_recently_finished() {
        let mut agg = TaskAggregate::from_records(
            TemplateId::new("t"),
            vec![
                record("early", ActionStatus::Done, 1, Some(9)),
                record("late", ActionStatus::Done, 2, Some(10)),
                record("open", ActionStatus::Pending, 3, None),
            ],
        );
        agg.mark_conflict(at(11));

        let flipped = revert(&mut agg, Action::Increment, at(12));

        assert_eq!(flipped, Some(RecordId::new("late")));
        assert_eq!(agg.execution_count, 1);
        assert!(!agg.has_conflict);
        assert!(agg.tasks.iter().any(|t| t.id.as_str() == "late" && t.status == ActionStatus::Pending));
    }

    #[test]
    fn failed_decrement_completes_newest_pending() {
        let mut agg = TaskAggregate::from_records(
            TemplateId::new("t"),
            vec![
                record("old", ActionStatus::Pending, 1, None),
                record("new", ActionStatus::Pending, 5, None),
            ],
        );

        let flipped = revert(&mut agg, Action::Decrement, at(12));

        assert_eq!(flipped, Some(RecordId::new("new")));
        assert_eq!(agg.execution_count, 1);
        assert!(!agg.is_completed);
    }

    #[rstest]
    #[case::increment_floors_at_zero(Action::Increment, 0, 2, 0)]
    #[case::increment_steps_down(Action::Increment, 2, 2, 1)]
    #[case::decrement_caps_at_target(Action::Decrement, 2, 2, 2)]
    #[case::decrement_steps_up(Action::Decrement, 0, 2, 1)]
    fn counts_are_clamped(
        #[case] action: Action,
        #[case] before: u32,
        #[case] target: u32,
        #[case] after: u32,
    ) {
        let mut agg = TaskAggregate::from_records(TemplateId::new("t"), vec![]);
        agg.execution_count = before;
        agg.target_count = target;
        revert(&mut agg, action, at(12));
        assert_eq!(agg.execution_count, after);
        assert_eq!(agg.is_completed, after == target && target > 0);
    }
}
