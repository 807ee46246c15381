// folio-engine: document sync and versioning engine.
//
// Leaves first: edit channel, active-time clock, autosave, snapshot
// scheduling and version history, composed by `session` (synchronous core)
// and `runtime` (tokio driver).

pub mod active_time;
pub mod autosave;
pub mod backend;
pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod runtime;
pub mod session;
pub mod snapshot;
pub mod timer;

pub use autosave::SaveStatus;
pub use error::{BackendError, SessionError};
pub use history::RestoreConfirmation;
pub use runtime::{Collaborators, SessionEvent, SessionHandle, SessionRuntime};
pub use session::{DocumentSession, SessionSettings};
