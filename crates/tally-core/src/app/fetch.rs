//! Full aggregate load: three status fetches, week filter, grouping.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::engine::Shared;
use crate::domain::{ActionStatus, RawActionRecord, SyncError, TaskAggregate, WeekWindow, aggregate};

/// Keep the records visible this week and group them by template.
pub fn build_aggregates(
    records: impl IntoIterator<Item = RawActionRecord>,
    now: DateTime<Utc>,
) -> Vec<TaskAggregate> {
    let window = WeekWindow::containing(now);
    aggregate(records.into_iter().filter(|r| window.includes(r)))
}

impl Shared {
    pub(crate) async fn fetch_aggregates(&self) -> Result<Vec<TaskAggregate>, SyncError> {
        let token = self.token()?;
        let backend = &self.backend;
        let (pending, done, delivered) = tokio::try_join!(
            self.call(backend.fetch_tasks_by_status(&token, ActionStatus::Pending)),
            self.call(backend.fetch_tasks_by_status(&token, ActionStatus::Done)),
            self.call(backend.fetch_tasks_by_status(&token, ActionStatus::Delivered)),
        )?;
        debug!(
            pending = pending.len(),
            done = done.len(),
            delivered = delivered.len(),
            "fetched records"
        );
        let records = pending.into_iter().chain(done).chain(delivered);
        Ok(build_aggregates(records, self.clock.now()))
    }
}
