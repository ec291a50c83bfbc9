//! Weekly visibility window.
//!
//! Pending records are always visible. Anything else is visible only while its
//! `finished_at` (or `updated_at`) lies in the current Monday..Sunday week.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

use super::record::{ActionStatus, RawActionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    /// Monday 00:00:00, inclusive.
    pub start: DateTime<Utc>,
    /// Next Monday 00:00:00, exclusive.
    pub end: DateTime<Utc>,
}

impl WeekWindow {
    pub fn containing(now: DateTime<Utc>) -> Self {
        let days_from_monday = i64::from(now.weekday().num_days_from_monday());
        let monday = now.date_naive() - Duration::days(days_from_monday);
        let start = monday.and_time(NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(7),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    pub fn includes(&self, record: &RawActionRecord) -> bool {
        if record.status == ActionStatus::Pending {
            return true;
        }
        record.activity_at().is_some_and(|at| self.contains(at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RecordId, TemplateId};
    use chrono::TimeZone;
    use rstest::rstest;

    fn record(status: ActionStatus, finished: Option<DateTime<Utc>>) -> RawActionRecord {
        let mut r = RawActionRecord::new(
            RecordId::new("r"),
            TemplateId::new("t"),
            "x",
            status,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        );
        r.finished_at = finished;
        r
    }

    #[test]
    fn window_spans_monday_to_sunday() {
        // 2026-10-16 is a Friday.
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 15, 30, 0).unwrap();
        let window = WeekWindow::containing(now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap());
    }

    #[test]
    fn monday_belongs_to_its_own_week() {
        let now = Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap();
        assert_eq!(WeekWindow::containing(now).start, now);
    }

    #[rstest]
    #[case::pending_without_timestamp(ActionStatus::Pending, None, true)]
    #[case::done_this_week(ActionStatus::Done, Some((2026, 10, 14)), true)]
    #[case::done_last_week(ActionStatus::Done, Some((2026, 10, 11)), false)]
    #[case::delivered_next_week(ActionStatus::Delivered, Some((2026, 10, 19)), false)]
    #[case::done_without_timestamp(ActionStatus::Done, None, false)]
    fn visibility(
        #[case] status: ActionStatus,
        #[case] finished: Option<(i32, u32, u32)>,
        #[case] visible: bool,
    ) {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let finished = finished.map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 8, 0, 0).unwrap());
        assert_eq!(
            WeekWindow::containing(now).includes(&record(status, finished)),
            visible
        );
    }

    #[test]
    fn updated_at_is_the_fallback() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let mut r = record(ActionStatus::Done, None);
        r.updated_at = Some(Utc.with_ymd_and_hms(2026, 10, 13, 8, 0, 0).unwrap());
        assert!(WeekWindow::containing(now).includes(&r));
    }
}
