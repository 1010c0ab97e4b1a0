//! Job records and their progress logs.

mod event_log;
mod model;
mod store;

pub use event_log::{EventLog, JobLogger, LOG_SENTINEL, LogLine};
pub use model::{JobRecord, JobSource, JobStatus, Track};
pub use store::JobStore;
