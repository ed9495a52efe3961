//! Scheduled task types: identifiers, actions and submission options

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::handle::LoopState;

/// Slugify a task name for use in IDs
pub fn slugify(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() { "task".to_string() } else { slug }
}

/// Opaque task identifier
///
/// Format: `{slug}-{12-char-hex}`, where the hex suffix is the random tail of a
/// UUIDv7. Two submissions with the same name always get distinct IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh ID for a task name
    pub fn new(name: &str) -> Self {
        let uuid = uuid::Uuid::now_v7().simple().to_string();
        Self(format!("{}-{}", slugify(name), &uuid[20..]))
    }

    /// Get the full ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the slug portion (everything before the hex suffix)
    pub fn slug(&self) -> &str {
        self.0.rsplit_once('-').map(|(slug, _)| slug).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A unit of work executed once per loop cycle
///
/// Implementations may fail with any error; the scheduler records the failure
/// and keeps the loop running.
#[async_trait]
pub trait Action: Send + Sync {
    /// Execute one cycle
    async fn run(&self) -> eyre::Result<()>;
}

/// Action backed by an async closure
pub struct FnAction<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = eyre::Result<()>> + Send,
{
    async fn run(&self) -> eyre::Result<()> {
        (self.f)().await
    }
}

/// Wrap an async closure as an [`Action`]
pub fn action_fn<F, Fut>(f: F) -> Arc<dyn Action>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<()>> + Send + 'static,
{
    Arc::new(FnAction { f })
}

/// Action backed by a synchronous closure, run on the blocking thread pool
pub struct BlockingAction<F> {
    f: Arc<F>,
}

#[async_trait]
impl<F> Action for BlockingAction<F>
where
    F: Fn() -> eyre::Result<()> + Send + Sync + 'static,
{
    async fn run(&self) -> eyre::Result<()> {
        let f = Arc::clone(&self.f);
        match tokio::task::spawn_blocking(move || (*f)()).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(eyre::eyre!("Blocking action panicked")),
            Err(e) => Err(eyre::eyre!("Blocking action cancelled: {}", e)),
        }
    }
}

/// Wrap a synchronous closure as an [`Action`]
///
/// The closure runs via `spawn_blocking`, so slow I/O inside it never stalls
/// the runtime worker threads that other loops share.
pub fn blocking_fn<F>(f: F) -> Arc<dyn Action>
where
    F: Fn() -> eyre::Result<()> + Send + Sync + 'static,
{
    Arc::new(BlockingAction { f: Arc::new(f) })
}

/// When a loop executes its first cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstRun {
    /// Run immediately on launch, then sleep
    #[default]
    Immediate,
    /// Sleep one interval before the first run
    AfterInterval,
}

/// Per-submission options
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    pub first_run: FirstRun,
}

impl SubmitOptions {
    /// Options that delay the first run by one interval
    pub fn after_interval() -> Self {
        Self {
            first_run: FirstRun::AfterInterval,
        }
    }
}

/// A recurring task waiting in the queue or owned by its loop
///
/// Immutable after creation.
pub(crate) struct ScheduledTask {
    pub id: TaskId,
    pub name: String,
    pub interval: Duration,
    pub action: Arc<dyn Action>,
    pub options: SubmitOptions,
    pub submitted_at: Instant,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: Arc<LoopState>,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Earn Money Simulation"), "earn-money-simulation");
        assert_eq!(slugify("don't  stop!"), "dont-stop");
        assert_eq!(slugify("***"), "task");
    }

    #[test]
    fn test_task_id_unique_per_submission() {
        let a = TaskId::new("heartbeat");
        let b = TaskId::new("heartbeat");
        assert_ne!(a, b);
        assert_eq!(a.slug(), "heartbeat");
        assert!(a.as_str().starts_with("heartbeat-"));
        assert_eq!(a.as_str().len(), "heartbeat-".len() + 12);
    }

    #[test]
    fn test_task_id_serializes_as_string() {
        let id = TaskId::from("news-0123456789ab");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"news-0123456789ab\"");
    }

    #[tokio::test]
    async fn test_action_fn_runs_closure() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let action = action_fn(move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        action.run().await.unwrap();
        action.run().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blocking_fn_propagates_error() {
        let action = blocking_fn(|| Err(eyre::eyre!("disk full")));
        let err = action.run().await.unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[tokio::test]
    async fn test_blocking_fn_panic_becomes_error() {
        let action = blocking_fn(|| -> eyre::Result<()> { panic!("boom") });
        let err = action.run().await.unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_first_run_default() {
        assert_eq!(SubmitOptions::default().first_run, FirstRun::Immediate);
        assert_eq!(SubmitOptions::after_interval().first_run, FirstRun::AfterInterval);
    }
}
