//! Queue module: entries, retry policy, and the mutation queue.

mod entry;
mod mutation;
mod retry;

pub use entry::{ActionEntry, QueueEntry, RefreshEntry};
pub use mutation::{MutationQueue, Requeue};
pub use retry::RetryPolicy;
