//! Domain model (IDs, raw records, aggregates, state, errors).

pub mod action;
pub mod aggregate;
pub mod errors;
pub mod ids;
pub mod record;
pub mod state;
pub mod window;

pub use action::Action;
pub use aggregate::{TaskAggregate, aggregate};
pub use errors::{ErrorKind, SyncError};
pub use ids::{EntryId, Id, IdMarker, RecordId, TemplateId};
pub use record::{ActionStatus, RawActionRecord};
pub use state::{AppState, DrainState, User};
pub use window::WeekWindow;
