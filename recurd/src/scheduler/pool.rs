//! SchedulerPool - the submission API and dispatcher lifecycle
//!
//! The pool is an explicit value: construct it once, clone it into whatever
//! needs to submit work. Clones share the same queue, dispatchers and loops.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::events::OutcomeSink;

use super::config::PoolConfig;
use super::dispatcher::DispatcherWorker;
use super::error::{SchedulerError, validate_interval};
use super::handle::{LoopHandle, LoopState, LoopStatus};
use super::queue::TaskQueue;
use super::task::{Action, ScheduledTask, SubmitOptions, TaskId};

/// Monotonic pool counters
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) submitted: AtomicU64,
    pub(crate) dispatched: AtomicU64,
    pub(crate) rejected: AtomicU64,
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Tasks accepted by submit
    pub submitted: u64,
    /// Tasks whose loop was launched
    pub dispatched: u64,
    /// Tasks dropped because no loop could be launched
    pub rejected: u64,
    /// Tasks waiting for a dispatcher
    pub queued: usize,
    /// Loops currently running
    pub active_loops: usize,
}

/// What shutdown left behind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Queued tasks that never reached a dispatcher
    pub abandoned_queued: usize,
    /// Loops still running when the timeout expired
    pub loops_remaining: usize,
}

/// State shared by the pool, its clones and its dispatchers
pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    pub(crate) queue: TaskQueue,
    pub(crate) sink: Arc<dyn OutcomeSink>,
    pub(crate) runtime: Handle,
    pub(crate) loops: TaskTracker,
    pub(crate) capacity: Arc<Semaphore>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) stats: PoolCounters,
    start: Once,
    spawned: AtomicUsize,
    dispatchers: Mutex<Vec<JoinHandle<()>>>,
}

/// Fixed-size dispatcher pool running one repeating loop per submitted task
#[derive(Clone)]
pub struct SchedulerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for SchedulerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SchedulerPool {
    /// Create a pool on the current tokio runtime
    ///
    /// Dispatchers are not spawned until [`start`](Self::start) or the first
    /// [`submit`](Self::submit).
    pub fn new(config: PoolConfig, sink: Arc<dyn OutcomeSink>) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::with_handle(config, sink, runtime))
    }

    /// Create a pool that spawns onto the given runtime
    pub fn with_handle(config: PoolConfig, sink: Arc<dyn OutcomeSink>, runtime: Handle) -> Self {
        debug!(?config, "SchedulerPool::with_handle: called");
        Self {
            inner: Arc::new(PoolInner {
                capacity: Arc::new(Semaphore::new(config.resolved_max_loops())),
                config,
                queue: TaskQueue::new(),
                sink,
                runtime,
                loops: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                stats: PoolCounters::default(),
                start: Once::new(),
                spawned: AtomicUsize::new(0),
                dispatchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the dispatcher workers
    ///
    /// Idempotent: concurrent or repeated calls spawn exactly one set. Returns
    /// true only for the call that spawned them.
    pub fn start(&self) -> bool {
        let mut spawned = false;
        self.inner.start.call_once(|| {
            if self.inner.shutdown.is_cancelled() {
                warn!("SchedulerPool::start: pool already shut down, not starting");
                return;
            }
            let workers = self.inner.config.resolved_workers();
            let mut dispatchers = self.inner.dispatchers.lock().unwrap_or_else(|e| e.into_inner());
            for index in 0..workers {
                let worker = DispatcherWorker::new(index, Arc::clone(&self.inner));
                dispatchers.push(self.inner.runtime.spawn(worker.run()));
            }
            self.inner.spawned.store(workers, Ordering::SeqCst);
            info!(workers, max_loops = self.inner.config.resolved_max_loops(), "Scheduler started");
            spawned = true;
        });
        spawned
    }

    /// Submit a recurring task that runs immediately and then every `interval`
    pub fn submit(&self, name: &str, interval: Duration, action: Arc<dyn Action>) -> Result<LoopHandle, SchedulerError> {
        self.submit_with(name, interval, action, SubmitOptions::default())
    }

    /// Submit a recurring task with explicit options
    ///
    /// Validates the interval, enqueues the task and starts the pool on first
    /// use. Never blocks; the loop is launched by whichever dispatcher is free.
    pub fn submit_with(
        &self,
        name: &str,
        interval: Duration,
        action: Arc<dyn Action>,
        options: SubmitOptions,
    ) -> Result<LoopHandle, SchedulerError> {
        debug!(%name, ?interval, ?options, "SchedulerPool::submit_with: called");
        let interval = validate_interval(interval)?;

        if self.inner.shutdown.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }

        let id = TaskId::new(name);
        let cancel = self.inner.shutdown.child_token();
        let state = Arc::new(LoopState::new());
        let handle = LoopHandle::new(id.clone(), name.to_string(), interval, cancel.clone(), Arc::clone(&state));

        self.inner.queue.push(ScheduledTask {
            id,
            name: name.to_string(),
            interval,
            action,
            options,
            submitted_at: Instant::now(),
            cancel,
            state,
        })?;
        self.inner.stats.submitted.fetch_add(1, Ordering::SeqCst);

        self.start();
        Ok(handle)
    }

    /// Stop dispatchers and loops
    ///
    /// Queued tasks are marked abandoned, running loops are cancelled (see
    /// [`ShutdownPolicy`](super::ShutdownPolicy)) and given up to the configured
    /// timeout to exit. Loops still busy after that are left to die with the
    /// runtime. Later submissions fail with [`SchedulerError::ShuttingDown`].
    pub async fn shutdown(&self) -> ShutdownReport {
        info!(active_loops = self.active_loops(), queued = self.queued(), "Scheduler shutdown requested");
        self.inner.shutdown.cancel();

        let abandoned = self.inner.queue.close();
        for task in &abandoned {
            task.state.set_status(LoopStatus::Abandoned);
        }
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "Abandoned queued tasks that were never dispatched");
        }

        let dispatchers: Vec<_> = self
            .inner
            .dispatchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for dispatcher in dispatchers {
            if let Err(e) = dispatcher.await {
                error!(error = %e, "Dispatcher task failed");
            }
        }

        self.inner.loops.close();
        let timeout = self.inner.config.shutdown_timeout();
        let loops_remaining = match tokio::time::timeout(timeout, self.inner.loops.wait()).await {
            Ok(()) => 0,
            Err(_) => {
                let remaining = self.inner.loops.len();
                warn!(remaining, ?timeout, "Loops still running after shutdown timeout, abandoning in place");
                remaining
            }
        };

        info!("Scheduler shutdown complete");
        ShutdownReport {
            abandoned_queued: abandoned.len(),
            loops_remaining,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Number of dispatcher workers spawned by [`start`](Self::start)
    pub fn worker_count(&self) -> usize {
        self.inner.spawned.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.worker_count() > 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Tasks waiting for a dispatcher
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// Loops currently holding a capacity slot
    pub fn active_loops(&self) -> usize {
        self.inner.config.resolved_max_loops() - self.inner.capacity.available_permits()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.inner.stats.submitted.load(Ordering::SeqCst),
            dispatched: self.inner.stats.dispatched.load(Ordering::SeqCst),
            rejected: self.inner.stats.rejected.load(Ordering::SeqCst),
            queued: self.queued(),
            active_loops: self.active_loops(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant as TokioInstant;

    use crate::events::MemorySink;
    use crate::scheduler::config::{OverflowPolicy, ShutdownPolicy};
    use crate::scheduler::task::action_fn;

    fn pool(config: PoolConfig) -> (SchedulerPool, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let pool = SchedulerPool::new(config, sink.clone()).unwrap();
        (pool, sink)
    }

    fn counter() -> (Arc<AtomicUsize>, Arc<dyn Action>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let action = action_fn(move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (count, action)
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let result = SchedulerPool::new(PoolConfig::default(), Arc::new(MemorySink::new()));
        assert_eq!(result.unwrap_err(), SchedulerError::NoRuntime);
    }

    #[tokio::test]
    async fn test_lazy_start_on_first_submit() {
        let (pool, _) = pool(PoolConfig::default());
        assert!(!pool.is_started());
        assert_eq!(pool.worker_count(), 0);

        let (_, action) = counter();
        pool.submit("tick", Duration::from_secs(60), action).unwrap();

        assert!(pool.is_started());
        assert_eq!(pool.worker_count(), 5);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (pool, _) = pool(PoolConfig::with_workers(3));
        assert!(pool.start());
        assert!(!pool.start());
        assert!(!pool.clone().start());
        assert_eq!(pool.worker_count(), 3);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_start_spawns_one_set() {
        let (pool, _) = pool(PoolConfig::with_workers(4));

        let winners = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let pool = pool.clone();
                    s.spawn(move || pool.start())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count()
        });

        assert_eq!(winners, 1);
        assert_eq!(pool.worker_count(), 4);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_interval_rejected_before_enqueue() {
        let (pool, _) = pool(PoolConfig::default());
        let (_, action) = counter();

        let err = pool.submit("bad", Duration::ZERO, action).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval(_)));
        assert_eq!(pool.stats().submitted, 0);
        assert!(!pool.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_count_after_interval() {
        let (pool, _) = pool(PoolConfig::default());
        let (count, action) = counter();

        pool.submit_with("a", Duration::from_secs(1), action, SubmitOptions::after_interval())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_action_keeps_running() {
        let (pool, sink) = pool(PoolConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let action = action_fn(move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(eyre::eyre!("upstream unavailable"))
            }
        });

        let handle = pool.submit("flaky", Duration::from_secs(1), action).unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(handle.status(), LoopStatus::Running);
        let stats = handle.stats();
        assert_eq!(stats.failures, stats.runs);
        assert_eq!(stats.last_error.as_deref(), Some("upstream unavailable"));
        assert!(sink.records_for("flaky").iter().all(|r| r.is_failure()));
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_task_does_not_delay_dispatch() {
        let (pool, _) = pool(PoolConfig::with_workers(1));
        let slow_started = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&slow_started);
        let slow = action_fn(move || {
            let s = Arc::clone(&s);
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        });
        let (fast_count, fast) = counter();

        let slow_handle = pool.submit("slow", Duration::from_secs(1), slow).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(slow_started.load(Ordering::SeqCst), 1);

        let submitted_at = TokioInstant::now();
        let fast_handle = pool.submit("fast", Duration::from_secs(1), fast).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(fast_count.load(Ordering::SeqCst), 1);
        assert!(submitted_at.elapsed() < Duration::from_secs(30));
        assert_eq!(slow_handle.runs(), 0, "slow action still in its first cycle");
        assert_eq!(fast_handle.status(), LoopStatus::Running);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_only_that_loop() {
        let (pool, _) = pool(PoolConfig::default());
        let (a_count, a) = counter();
        let (b_count, b) = counter();

        let a_handle = pool.submit("a", Duration::from_secs(1), a).unwrap();
        let _b_handle = pool.submit("b", Duration::from_secs(1), b).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        a_handle.cancel();
        assert_eq!(a_handle.stopped().await, LoopStatus::Stopped);
        let a_runs = a_count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(a_count.load(Ordering::SeqCst), a_runs);
        assert!(b_count.load(Ordering::SeqCst) >= 4);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_abandons_queued_tasks() {
        let (pool, _) = pool(PoolConfig::with_workers(1));
        let (count, action) = counter();

        // Current-thread runtime: dispatchers have not been polled yet
        let handles: Vec<_> = (0..3)
            .map(|i| pool.submit(&format!("t{}", i), Duration::from_secs(1), action.clone()).unwrap())
            .collect();

        let report = pool.shutdown().await;
        assert_eq!(report.abandoned_queued, 3);
        assert_eq!(report.loops_remaining, 0);
        for h in &handles {
            assert_eq!(h.status(), LoopStatus::Abandoned);
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let (_, action) = counter();
        assert_eq!(
            pool.submit("late", Duration::from_secs(1), action).unwrap_err(),
            SchedulerError::ShuttingDown
        );
        assert!(!pool.start());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_policies() {
        for (policy, expected_runs) in [(ShutdownPolicy::Abandon, 1), (ShutdownPolicy::FinalCycle, 2)] {
            let (pool, _) = pool(PoolConfig {
                shutdown: policy,
                ..Default::default()
            });
            let (count, action) = counter();
            let handle = pool.submit("job", Duration::from_secs(10), action).unwrap();

            tokio::time::sleep(Duration::from_secs(1)).await;
            let report = pool.shutdown().await;

            assert_eq!(report.loops_remaining, 0);
            assert_eq!(handle.status(), LoopStatus::Stopped);
            assert_eq!(count.load(Ordering::SeqCst), expected_runs, "policy {:?}", policy);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_timeout_leaves_hung_loop() {
        let (pool, _) = pool(PoolConfig {
            shutdown_timeout_ms: 200,
            ..Default::default()
        });
        let hung = action_fn(|| async {
            futures::future::pending::<()>().await;
            Ok(())
        });
        let handle = pool.submit("hung", Duration::from_secs(1), hung).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let report = pool.shutdown().await;
        assert_eq!(report.loops_remaining, 1);
        assert_eq!(handle.status(), LoopStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_reject_drops_task_and_keeps_serving() {
        let (pool, _) = pool(PoolConfig {
            workers: 1,
            max_loops: 1,
            overflow: OverflowPolicy::Reject,
            ..Default::default()
        });
        let (_, a) = counter();
        let (b_count, b) = counter();
        let (c_count, c) = counter();

        let a_handle = pool.submit("a", Duration::from_secs(1), a).unwrap();
        let b_handle = pool.submit("b", Duration::from_secs(1), b).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(a_handle.status(), LoopStatus::Running);
        assert!(matches!(b_handle.status(), LoopStatus::Rejected { .. }));
        assert_eq!(pool.stats().rejected, 1);

        a_handle.cancel();
        a_handle.stopped().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.active_loops(), 0);

        let c_handle = pool.submit("c", Duration::from_secs(1), c).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(c_handle.status(), LoopStatus::Running);
        assert_eq!(c_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 0);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_wait_launches_when_capacity_frees() {
        let (pool, _) = pool(PoolConfig {
            workers: 1,
            max_loops: 1,
            overflow: OverflowPolicy::Wait,
            ..Default::default()
        });
        let (_, a) = counter();
        let (b_count, b) = counter();

        let a_handle = pool.submit("a", Duration::from_secs(1), a).unwrap();
        let b_handle = pool.submit("b", Duration::from_secs(1), b).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(b_handle.status(), LoopStatus::Queued);

        a_handle.cancel();
        a_handle.stopped().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(b_handle.status(), LoopStatus::Running);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().rejected, 0);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_track_dispatch() {
        let (pool, sink) = pool(PoolConfig::with_workers(2));
        for i in 0..4 {
            let (_, action) = counter();
            pool.submit(&format!("s{}", i), Duration::from_secs(5), action).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stats = pool.stats();
        assert_eq!(stats.submitted, 4);
        assert_eq!(stats.dispatched, 4);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.active_loops, 4);
        assert_eq!(sink.len(), 4);
        pool.shutdown().await;
        assert_eq!(pool.active_loops(), 0);
    }
}
