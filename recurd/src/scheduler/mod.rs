//! Recurring task scheduler
//!
//! Submitters hand a named action and an interval to a [`SchedulerPool`]. The
//! task waits in a FIFO queue until one of a fixed number of dispatcher workers
//! takes it and launches a dedicated repeating loop for it. From then
//! on the loop runs the action, sleeps the interval and repeats until it is
//! cancelled through its [`LoopHandle`] or the pool shuts down.

mod config;
mod dispatcher;
mod error;
mod handle;
mod pool;
mod queue;
mod repeating;
mod task;

pub use config::{OverflowPolicy, PoolConfig, ShutdownPolicy};
pub use error::{SchedulerError, interval_from_secs_f64, validate_interval};
pub use handle::{LoopHandle, LoopStats, LoopStatus};
pub use pool::{PoolStats, SchedulerPool, ShutdownReport};
pub use task::{Action, BlockingAction, FirstRun, FnAction, SubmitOptions, TaskId, action_fn, blocking_fn, slugify};
