//! Configured jobs: shell commands run on a fixed interval
//!
//! A [`JobSpec`] from the config file becomes a [`CommandAction`] submitted to
//! the [`SchedulerPool`] under the job's name.

mod command;
mod error;
mod spec;

pub use command::CommandAction;
pub use error::JobError;
pub use spec::JobSpec;

use std::sync::Arc;

use tracing::info;

use crate::scheduler::{LoopHandle, SchedulerPool};

/// Submit every enabled job to the pool
///
/// Jobs are validated before anything is submitted, so a bad entry leaves the
/// pool untouched.
pub fn schedule_jobs<'a>(
    pool: &SchedulerPool,
    jobs: impl IntoIterator<Item = &'a JobSpec>,
) -> Result<Vec<LoopHandle>, JobError> {
    let jobs: Vec<&JobSpec> = jobs.into_iter().filter(|j| j.enabled).collect();
    let mut intervals = Vec::with_capacity(jobs.len());
    for job in &jobs {
        job.validate()?;
        intervals.push(job.interval()?);
    }

    let mut handles = Vec::with_capacity(jobs.len());
    for (job, interval) in jobs.into_iter().zip(intervals) {
        let action = Arc::new(CommandAction::new(job.command.clone()));
        let handle = pool
            .submit_with(&job.name, interval, action, job.options())
            .map_err(|source| JobError::Schedule {
                name: job.name.clone(),
                source,
            })?;
        info!(job = %job.name, task_id = %handle.id(), ?interval, "Scheduled job");
        handles.push(handle);
    }

    Ok(handles)
}
