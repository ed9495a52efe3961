//! DispatcherWorker - dequeues tasks and launches their loops
//!
//! A dispatcher never runs task logic. It takes the next task from the queue,
//! reserves loop capacity, spawns a [`RepeatingLoop`] and goes straight back to
//! the queue, so a slow action can never delay the dispatch of other tasks.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, info};

use super::config::OverflowPolicy;
use super::error::SchedulerError;
use super::handle::LoopStatus;
use super::pool::PoolInner;
use super::repeating::RepeatingLoop;
use super::task::ScheduledTask;

pub(crate) struct DispatcherWorker {
    index: usize,
    pool: Arc<PoolInner>,
}

impl DispatcherWorker {
    pub(crate) fn new(index: usize, pool: Arc<PoolInner>) -> Self {
        Self { index, pool }
    }

    /// Serve the queue until it is closed
    pub(crate) async fn run(self) {
        info!(worker = self.index, "Dispatcher started");

        while let Some(task) = self.pool.queue.take().await {
            self.dispatch(task).await;
        }

        info!(worker = self.index, "Dispatcher stopped");
    }

    async fn dispatch(&self, task: ScheduledTask) {
        debug!(worker = self.index, task_id = %task.id, "DispatcherWorker::dispatch: called");

        if task.cancel.is_cancelled() {
            debug!(task_id = %task.id, "DispatcherWorker::dispatch: cancelled while queued");
            task.state.set_status(if self.pool.shutdown.is_cancelled() {
                LoopStatus::Abandoned
            } else {
                LoopStatus::Stopped
            });
            return;
        }

        let Some(permit) = self.reserve(&task).await else {
            return;
        };

        let task_id = task.id.clone();
        let repeating = RepeatingLoop::new(
            task,
            Arc::clone(&self.pool.sink),
            self.pool.shutdown.clone(),
            self.pool.config.shutdown,
            permit,
        );
        self.pool.loops.spawn_on(repeating.run(), &self.pool.runtime);
        self.pool.stats.dispatched.fetch_add(1, Ordering::SeqCst);

        debug!(worker = self.index, %task_id, "Launched loop");
    }

    /// Reserve a loop slot according to the overflow policy
    ///
    /// Returns `None` when the task was dropped; its status says why.
    async fn reserve(&self, task: &ScheduledTask) -> Option<OwnedSemaphorePermit> {
        let capacity = Arc::clone(&self.pool.capacity);

        match self.pool.config.overflow {
            OverflowPolicy::Reject => match capacity.try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.reject(task, SchedulerError::CapacityExhausted {
                        max_loops: self.pool.config.resolved_max_loops(),
                    });
                    None
                }
            },
            OverflowPolicy::Wait => {
                debug!(task_id = %task.id, "DispatcherWorker::reserve: waiting for loop capacity");
                tokio::select! {
                    biased;
                    _ = task.cancel.cancelled() => {
                        task.state.set_status(if self.pool.shutdown.is_cancelled() {
                            LoopStatus::Abandoned
                        } else {
                            LoopStatus::Stopped
                        });
                        None
                    }
                    permit = capacity.acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => {
                            self.reject(task, SchedulerError::ShuttingDown);
                            None
                        }
                    },
                }
            }
        }
    }

    /// Drop a task that could not be launched
    ///
    /// The task is not retried or re-queued; later tasks keep their order.
    fn reject(&self, task: &ScheduledTask, reason: SchedulerError) {
        error!(
            worker = self.index,
            task_id = %task.id,
            task = %task.name,
            error = %reason,
            "Failed to launch loop, dropping task"
        );
        self.pool.stats.rejected.fetch_add(1, Ordering::SeqCst);
        task.state.set_status(LoopStatus::Rejected {
            reason: reason.to_string(),
        });
    }
}
