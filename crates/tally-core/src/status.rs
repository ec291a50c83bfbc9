use serde::{Deserialize, Serialize};

/// Queue snapshot for `get_status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Entries in the queue, refresh marker included.
    pub queue_length: usize,
    pub pending_actions: usize,
    pub has_refresh: bool,
    pub is_processing: bool,
}
