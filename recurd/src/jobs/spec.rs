//! Job definitions loaded from the config file

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::JobError;
use crate::scheduler::{FirstRun, SubmitOptions, interval_from_secs_f64};

/// A recurring shell command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Job name, also the task name of its loop
    pub name: String,

    /// Seconds to sleep between the end of one run and the start of the next
    #[serde(rename = "interval-secs")]
    pub interval_secs: f64,

    /// Shell command, run with `sh -c`
    pub command: String,

    /// Run once at startup instead of waiting one interval first
    #[serde(default = "default_true", rename = "run-immediately")]
    pub run_immediately: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl JobSpec {
    pub fn new(name: impl Into<String>, interval_secs: f64, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interval_secs,
            command: command.into(),
            run_immediately: true,
            enabled: true,
        }
    }

    /// Interval as a Duration
    pub fn interval(&self) -> Result<Duration, JobError> {
        interval_from_secs_f64(self.interval_secs).map_err(|source| JobError::InvalidInterval {
            name: self.name.clone(),
            source,
        })
    }

    pub fn options(&self) -> SubmitOptions {
        SubmitOptions {
            first_run: if self.run_immediately {
                FirstRun::Immediate
            } else {
                FirstRun::AfterInterval
            },
        }
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.name.trim().is_empty() {
            return Err(JobError::EmptyName);
        }
        if self.command.trim().is_empty() {
            return Err(JobError::EmptyCommand { name: self.name.clone() });
        }
        self.interval()?;
        Ok(())
    }
}
