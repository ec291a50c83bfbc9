//! State - セッション全体の状態スナップショットとドレイン状態機械

use serde::{Deserialize, Serialize};

use super::aggregate::TaskAggregate;
use crate::queue::ActionEntry;

/// Authenticated user as returned by the backend login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Full state handed to every subscriber. Read-only for consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub is_authenticated: bool,
    pub user: Option<User>,
    pub tasks: Vec<TaskAggregate>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Action entries still in the queue, in queue order.
    pub pending_changes: Vec<ActionEntry>,
}

impl AppState {
    pub fn task(&self, id: &crate::domain::TemplateId) -> Option<&TaskAggregate> {
        self.tasks.iter().find(|t| &t.id == id)
    }
}

/// Queue drain state.
///
/// State transitions:
/// - Stopped -> Idle (login)
/// - Idle -> Draining (enqueue or explicit process)
/// - Draining -> Idle (queue empty, or loop exit after session expiry)
/// - any -> Stopped (logout / session expiry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrainState {
    Idle,
    Draining,
    Stopped,
}

impl DrainState {
    pub fn is_draining(self) -> bool {
        matches!(self, DrainState::Draining)
    }
}
