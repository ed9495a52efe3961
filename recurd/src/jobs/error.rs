//! Job error types

use thiserror::Error;

use crate::scheduler::SchedulerError;

/// Errors from job definitions and command execution
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job '{name}' has no command")]
    EmptyCommand { name: String },

    #[error("Job has an empty name")]
    EmptyName,

    #[error("Job '{name}': {source}")]
    InvalidInterval {
        name: String,
        #[source]
        source: SchedulerError,
    },

    #[error("Job '{name}' could not be scheduled: {source}")]
    Schedule {
        name: String,
        #[source]
        source: SchedulerError,
    },

    #[error("Command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("Command terminated by signal")]
    CommandKilled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
