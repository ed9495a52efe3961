//! LoopHandle - caller-side view of a submitted recurring task

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::task::TaskId;

/// Lifecycle of a submitted task's loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LoopStatus {
    /// Waiting in the queue for a dispatcher
    Queued,
    /// Loop is running cycles
    Running,
    /// Loop exited after cancellation or shutdown
    Stopped,
    /// Dispatcher could not launch the loop; the task was dropped
    Rejected { reason: String },
    /// Pool shut down before the task was dispatched
    Abandoned,
}

impl LoopStatus {
    /// Check if the loop will never run another cycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopStatus::Stopped | LoopStatus::Rejected { .. } | LoopStatus::Abandoned
        )
    }
}

/// Snapshot of a loop's counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopStats {
    /// Cycles executed (success or failure)
    pub runs: u64,
    /// Cycles that ended in an error or panic
    pub failures: u64,
    /// Error message from the most recent failed cycle
    pub last_error: Option<String>,
    /// When the most recent cycle finished
    pub last_run_at: Option<DateTime<Utc>>,
}

/// State shared between a loop and every handle to it
#[derive(Debug)]
pub(crate) struct LoopState {
    runs: AtomicU64,
    failures: AtomicU64,
    last: Mutex<(Option<String>, Option<DateTime<Utc>>)>,
    status: watch::Sender<LoopStatus>,
}

impl LoopState {
    pub(crate) fn new() -> Self {
        let (status, _) = watch::channel(LoopStatus::Queued);
        Self {
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last: Mutex::new((None, None)),
            status,
        }
    }

    /// Record a finished cycle, returning the 1-based iteration number
    pub(crate) fn record_cycle(&self, error: Option<String>) -> u64 {
        let iteration = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if error.is_some() {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if error.is_some() {
            last.0 = error;
        }
        last.1 = Some(Utc::now());
        iteration
    }

    pub(crate) fn set_status(&self, status: LoopStatus) {
        // Terminal states are sticky
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    pub(crate) fn status(&self) -> LoopStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn stats(&self) -> LoopStats {
        let last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        LoopStats {
            runs: self.runs.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            last_error: last.0.clone(),
            last_run_at: last.1,
        }
    }

    fn subscribe(&self) -> watch::Receiver<LoopStatus> {
        self.status.subscribe()
    }
}

/// Handle returned by `submit`
///
/// Cloneable. Dropping every handle does not stop the loop; only
/// [`LoopHandle::cancel`] or pool shutdown does.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    id: TaskId,
    name: String,
    interval: Duration,
    cancel: CancellationToken,
    state: Arc<LoopState>,
}

impl LoopHandle {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        interval: Duration,
        cancel: CancellationToken,
        state: Arc<LoopState>,
    ) -> Self {
        Self {
            id,
            name,
            interval,
            cancel,
            state,
        }
    }

    /// Get the task ID
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Get the task name given at submission
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the fixed delay between cycles
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Request the loop to stop
    ///
    /// Takes effect at the top of the next cycle or immediately if the loop is
    /// sleeping. An action already running is allowed to finish.
    pub fn cancel(&self) {
        debug!(task_id = %self.id, "LoopHandle::cancel: called");
        self.cancel.cancel();
    }

    /// Check if cancellation was requested (by this handle or by pool shutdown)
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current lifecycle status
    pub fn status(&self) -> LoopStatus {
        self.state.status()
    }

    /// Current counters
    pub fn stats(&self) -> LoopStats {
        self.state.stats()
    }

    /// Number of cycles executed so far
    pub fn runs(&self) -> u64 {
        self.state.runs.load(Ordering::SeqCst)
    }

    /// Wait until the loop reaches a terminal status
    pub async fn stopped(&self) -> LoopStatus {
        let mut rx = self.state.subscribe();
        match rx.wait_for(LoopStatus::is_terminal).await {
            Ok(status) => status.clone(),
            // Sender lives inside the state we hold, so this is unreachable in practice
            Err(_) => self.state.status(),
        }
    }
}
