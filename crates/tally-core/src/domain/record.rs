//! Raw action records as returned by the backend.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{RecordId, TemplateId};

/// Status of a single raw record on the backend.
///
/// State transitions requested by this client:
/// - Pending -> Done (increment)
/// - Done -> Pending (decrement)
///
/// Delivered is set by the backend only; it counts as executed but is never a
/// rollback target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Done,
    Delivered,
}

impl ActionStatus {
    /// Does this status count towards `execution_count`?
    pub fn is_executed(self) -> bool {
        matches!(self, ActionStatus::Done | ActionStatus::Delivered)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::Done => "DONE",
            ActionStatus::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of a repeated action, owned by the server.
///
/// Immutable from the client's perspective except through status transitions;
/// the optimistic path patches `status` / `finished_at` on a local copy only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawActionRecord {
    pub id: RecordId,
    pub action_template_id: TemplateId,
    pub action_title: String,
    #[serde(default)]
    pub team_name: Option<String>,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub comments: Vec<serde_json::Value>,
    #[serde(default)]
    pub delivery_id: Option<String>,
    #[serde(default)]
    pub delivery_title: Option<String>,
    #[serde(default)]
    pub dismissed: bool,
    #[serde(default)]
    pub integration_id: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

impl RawActionRecord {
    /// Minimal record; the remaining server fields take their defaults.
    pub fn new(
        id: RecordId,
        template_id: TemplateId,
        title: impl Into<String>,
        status: ActionStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            action_template_id: template_id,
            action_title: title.into(),
            team_name: None,
            status,
            created_at,
            finished_at: None,
            updated_at: None,
            approved: false,
            approved_by: None,
            comments: Vec::new(),
            delivery_id: None,
            delivery_title: None,
            dismissed: false,
            integration_id: None,
            user_email: None,
        }
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team_name = Some(team.into());
        self
    }

    pub fn with_finished_at(mut self, finished_at: DateTime<Utc>) -> Self {
        self.finished_at = Some(finished_at);
        self
    }

    /// Timestamp used by the weekly visibility window: `finished_at`, else `updated_at`.
    pub fn activity_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at.or(self.updated_at)
    }

    /// Timestamp used to find the most recently completed record.
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.finished_at.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_uses_backend_wire_names() {
        assert_eq!(
            serde_json::to_string(&ActionStatus::Delivered).unwrap(),
            "\"DELIVERED\""
        );
        let s: ActionStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(s, ActionStatus::Pending);
    }

    #[test]
    fn record_decodes_with_missing_optional_fields() {
        let json = serde_json::json!({
            "id": "r1",
            "action_template_id": "t1",
            "action_title": "Call a customer",
            "status": "DONE",
            "created_at": "2026-10-12T09:00:00Z",
            "finished_at": "2026-10-13T10:00:00Z",
        });
        let record: RawActionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.status, ActionStatus::Done);
        assert!(record.comments.is_empty());
        assert_eq!(
            record.activity_at(),
            Some(Utc.with_ymd_and_hms(2026, 10, 13, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn completed_at_falls_back_to_created_at() {
        let created = Utc.with_ymd_and_hms(2026, 10, 12, 9, 0, 0).unwrap();
        let record = RawActionRecord::new(
            RecordId::new("r1"),
            TemplateId::new("t1"),
            "x",
            ActionStatus::Done,
            created,
        );
        assert_eq!(record.completed_at(), created);
    }
}
