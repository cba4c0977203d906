//! Probe scheduling.
//!
//! The scheduler owns a time-ordered queue of probe tasks, applies per
//! endpoint rate limiting and jitter, and emits due tasks on a bounded
//! channel consumed by the worker pool.

mod limiter;
mod service;
mod task;

pub use limiter::{LimiterRegistry, TokenBucket};
pub use service::{Scheduler, SchedulerStats, TASK_CHANNEL_CAPACITY};
pub use task::{Task, TaskQueue};
