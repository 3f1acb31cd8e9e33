//! Background loops: metric collection, snapshot persistence and the shared
//! start/stop lifecycle they (and the delivery client) run on.

pub mod collection_scheduler;
pub mod error;
pub mod snapshot_scheduler;
pub mod task;

pub use collection_scheduler::CollectionScheduler;
pub use error::{SchedulerError, SchedulerResult};
pub use snapshot_scheduler::SnapshotScheduler;
pub use task::BackgroundTask;
