//! Scheduler pool configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a dispatcher does when `max_loops` loops are already running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Log, mark the task rejected and drop it
    #[default]
    Reject,
    /// Hold the dispatcher until a running loop exits
    Wait,
}

/// What running loops do when the pool shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownPolicy {
    /// Stop at the next cancellation check without another cycle
    #[default]
    Abandon,
    /// A loop sleeping when shutdown arrives runs its action once more
    FinalCycle,
}

/// Scheduler pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of dispatcher workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Max concurrently running loops
    #[serde(default = "default_max_loops", rename = "max-loops")]
    pub max_loops: usize,

    /// Behavior when max_loops is reached
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Behavior of running loops on shutdown
    #[serde(default)]
    pub shutdown: ShutdownPolicy,

    /// How long shutdown waits for loops to exit, in milliseconds
    #[serde(default = "default_shutdown_timeout_ms", rename = "shutdown-timeout-ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_workers() -> usize {
    5
}

fn default_max_loops() -> usize {
    1024
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_loops: default_max_loops(),
            overflow: OverflowPolicy::default(),
            shutdown: ShutdownPolicy::default(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl PoolConfig {
    /// Config with a given dispatcher count and defaults elsewhere
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Get the shutdown timeout as a Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Dispatcher count, never zero
    pub fn resolved_workers(&self) -> usize {
        self.workers.max(1)
    }

    /// Loop cap, never zero
    pub fn resolved_max_loops(&self) -> usize {
        self.max_loops.max(1)
    }
}
