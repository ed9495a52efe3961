//! TaskQueue - unbounded FIFO hand-off between submitters and dispatchers

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::debug;

use super::error::SchedulerError;
use super::task::ScheduledTask;

/// Internal state protected by mutex
#[derive(Default)]
struct QueueInner {
    items: VecDeque<ScheduledTask>,
    closed: bool,
}

/// Unbounded, thread-safe FIFO of scheduling requests
///
/// Any number of producers may push concurrently and any number of consumers
/// may block in [`TaskQueue::take`]. Each task is delivered to exactly one
/// consumer, in insertion order.
#[derive(Default)]
pub(crate) struct TaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        // Nothing panics while holding the lock, but never let poisoning wedge the queue
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a task to the tail, waking one blocked consumer
    pub fn push(&self, task: ScheduledTask) -> Result<(), SchedulerError> {
        debug!(task_id = %task.id, "TaskQueue::push: called");
        {
            let mut inner = self.lock();
            if inner.closed {
                debug!(task_id = %task.id, "TaskQueue::push: queue closed, rejecting");
                return Err(SchedulerError::ShuttingDown);
            }
            inner.items.push_back(task);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Remove and return the head task, waiting until one is available
    ///
    /// Returns `None` once the queue has been closed.
    pub async fn take(&self) -> Option<ScheduledTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a close() between check and await is not missed
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.closed {
                    debug!("TaskQueue::take: queue closed");
                    return None;
                }
                if let Some(task) = inner.items.pop_front() {
                    let more = !inner.items.is_empty();
                    drop(inner);
                    if more {
                        // Pass the baton so a second waiter is not left sleeping on a non-empty queue
                        self.notify.notify_one();
                    }
                    debug!(task_id = %task.id, "TaskQueue::take: dequeued");
                    return Some(task);
                }
            }

            notified.await;
        }
    }

    /// Remove and return the head task without waiting
    #[cfg(test)]
    pub fn try_take(&self) -> Option<ScheduledTask> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        inner.items.pop_front()
    }

    /// Close the queue, returning tasks that were never dequeued
    ///
    /// Later pushes fail with [`SchedulerError::ShuttingDown`] and every blocked
    /// consumer wakes up with `None`.
    pub fn close(&self) -> Vec<ScheduledTask> {
        let drained: Vec<_> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.items.drain(..).collect()
        };
        debug!(drained = drained.len(), "TaskQueue::close: closed");
        self.notify.notify_waiters();
        drained
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
