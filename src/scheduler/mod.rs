//! In-process job scheduler: a FIFO queue drained under a concurrency cap and
//! a rolling-window rate limit, with per-job timeouts.

mod executor;
mod job;
mod rate;
mod registry;
mod store;

pub use executor::{Scheduler, SchedulerConfig, SchedulerStats};
pub use job::{ASSET_SUMMARY, Job, JobPayload, JobStatus};
pub use rate::RateLimiter;
pub use registry::{FnHandler, HandlerRegistry, JobHandler, handler_fn};
pub use store::{JobCounts, JobStore, RetentionPolicy};
