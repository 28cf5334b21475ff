//! Fire-and-forget command dispatch to device agents.
//!
//! Provides:
//! - `CommandDispatcher` - reboot, shutdown, scripts, process/service control, patches
//! - `Job` - the dispatch receipt (opaque job id, never tracked to completion)

pub mod dispatcher;
pub mod job;

pub use dispatcher::{CommandDispatcher, DispatchError};
pub use job::{Job, JobId};
