//! recurd - Recurring Task Scheduler
//!
//! recurd runs named actions forever at a fixed interval. Callers submit an
//! action and an interval to a [`SchedulerPool`]; a fixed set of dispatcher
//! workers pulls submissions off a FIFO queue and launches one independent
//! repeating loop per submission. A failing or panicking action only affects
//! the cycle it ran in: the loop records the failure and tries again after
//! the interval.
//!
//! # Core Concepts
//!
//! - **Fixed Delay**: The next cycle starts one interval after the previous one finished
//! - **Failure Isolation**: Errors and panics are recorded, never fatal to a loop
//! - **Decoupled Dispatch**: Dispatchers only launch loops, so slow actions never delay submissions
//! - **Injected Pool**: No global scheduler; construct a pool and pass it around
//!
//! # Modules
//!
//! - [`scheduler`] - Task queue, dispatcher pool and repeating loops
//! - [`events`] - Per-cycle outcome records and sinks
//! - [`jobs`] - Shell command jobs from the config file
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod jobs;
pub mod scheduler;

// Re-export commonly used types
pub use config::{Config, LogConfig};
pub use events::{FanoutSink, IterationRecord, JsonlSink, MemorySink, Outcome, OutcomeSink, TracingSink};
pub use jobs::{CommandAction, JobError, JobSpec, schedule_jobs};
pub use scheduler::{
    Action, FirstRun, LoopHandle, LoopStats, LoopStatus, OverflowPolicy, PoolConfig, PoolStats, SchedulerError,
    SchedulerPool, ShutdownPolicy, ShutdownReport, SubmitOptions, TaskId, action_fn, blocking_fn,
};
