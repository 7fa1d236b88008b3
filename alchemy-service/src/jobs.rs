//! Job scheduling core.
//!
//! - `task` - closed set of task kinds and their required payload keys
//! - `payload` - typed key/value payload carried by a job
//! - `model` - the job record and its lifecycle
//! - `queue` - FIFO, worker pool, registry and the shared execution routine
//! - `retention` - eviction of finished jobs from the registry

mod model;
mod payload;
mod queue;
mod retention;
mod task;

pub use model::{Job, JobId, JobStatus, JobSummary};
pub use payload::{Payload, PayloadError};
pub use queue::{JobQueue, QueueOptions};
pub use task::TaskKind;
