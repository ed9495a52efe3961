//! RepeatingLoop - run an action, sleep the interval, repeat
//!
//! One loop per dispatched task. Failures (errors and panics) are confined to
//! the cycle that produced them: they are recorded and the loop carries on.
//! Scheduling is fixed-delay: the next cycle starts `interval` after the
//! previous one finished, so drift accumulates by the action's run time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::events::{IterationRecord, OutcomeSink};

use super::config::ShutdownPolicy;
use super::handle::LoopStatus;
use super::task::{FirstRun, ScheduledTask};

/// How a sleep between cycles ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Elapsed,
    /// Cancelled while the loop was sleeping
    Cancelled,
    /// Cancellation arrived while the action was still running
    CancelledWhileBusy,
}

/// Per-task execution context
pub(crate) struct RepeatingLoop {
    task: ScheduledTask,
    sink: Arc<dyn OutcomeSink>,
    /// Pool-wide token; the task's own token is a child of it
    shutdown: CancellationToken,
    policy: ShutdownPolicy,
    /// Held for the loop's lifetime so max_loops counts running loops
    _permit: OwnedSemaphorePermit,
}

impl RepeatingLoop {
    pub(crate) fn new(
        task: ScheduledTask,
        sink: Arc<dyn OutcomeSink>,
        shutdown: CancellationToken,
        policy: ShutdownPolicy,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            task,
            sink,
            shutdown,
            policy,
            _permit: permit,
        }
    }

    /// Run cycles until cancelled
    pub(crate) async fn run(self) {
        let task = &self.task;
        info!(
            task_id = %task.id,
            task = %task.name,
            interval_ms = task.interval.as_millis() as u64,
            "Loop started"
        );
        task.state.set_status(LoopStatus::Running);

        let mut woke = Wake::Elapsed;
        if task.options.first_run == FirstRun::AfterInterval {
            woke = self.sleep().await;
        }

        while woke == Wake::Elapsed && !task.cancel.is_cancelled() {
            self.run_cycle().await;
            woke = self.sleep().await;
        }

        if woke == Wake::Cancelled && self.shutdown.is_cancelled() && self.policy == ShutdownPolicy::FinalCycle {
            debug!(task_id = %task.id, "RepeatingLoop::run: running final cycle before shutdown");
            self.run_cycle().await;
        }

        task.state.set_status(LoopStatus::Stopped);
        info!(task_id = %task.id, task = %task.name, runs = task.state.stats().runs, "Loop stopped");
    }

    /// Execute the action once and report the outcome
    async fn run_cycle(&self) {
        let task = &self.task;
        let started = Instant::now();

        let error = match AssertUnwindSafe(task.action.run()).catch_unwind().await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(panic) => Some(format!("Action panicked: {}", panic_message(&*panic))),
        };

        let elapsed = started.elapsed();
        let iteration = task.state.record_cycle(error.clone());
        let record = match error {
            None => IterationRecord::success(task.id.clone(), &task.name, iteration, elapsed),
            Some(message) => IterationRecord::failure(task.id.clone(), &task.name, iteration, elapsed, message),
        };
        let recorded = std::panic::catch_unwind(AssertUnwindSafe(|| self.sink.record(&record)));
        if let Err(panic) = recorded {
            error!(
                task_id = %task.id,
                iteration,
                panic = %panic_message(&*panic),
                "Outcome sink panicked, record dropped"
            );
        }
    }

    /// Sleep one interval, waking early on cancellation
    async fn sleep(&self) -> Wake {
        if self.task.cancel.is_cancelled() {
            return Wake::CancelledWhileBusy;
        }
        tokio::select! {
            biased;
            _ = self.task.cancel.cancelled() => Wake::Cancelled,
            _ = tokio::time::sleep(self.task.interval) => Wake::Elapsed,
        }
    }
}

/// Best-effort text from a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
