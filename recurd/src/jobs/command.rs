//! CommandAction - run a shell command as a loop cycle

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::error::JobError;
use crate::scheduler::Action;

/// Lines of stderr kept in the failure message
const STDERR_TAIL_LINES: usize = 5;

/// Action that runs `sh -c <command>` and fails on a non-zero exit
#[derive(Debug, Clone)]
pub struct CommandAction {
    command: String,
    workdir: Option<PathBuf>,
}

impl CommandAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            workdir: None,
        }
    }

    /// Run the command from this directory instead of the process cwd
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the command once
    pub async fn execute(&self) -> Result<(), JobError> {
        debug!(command = %self.command, "CommandAction::execute: called");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        debug!(
            command = %self.command,
            status = ?output.status,
            stdout_bytes = output.stdout.len(),
            "CommandAction::execute: finished"
        );

        if output.status.success() {
            return Ok(());
        }

        let stderr = stderr_tail(&String::from_utf8_lossy(&output.stderr));
        match output.status.code() {
            Some(code) => Err(JobError::CommandFailed { code, stderr }),
            None => Err(JobError::CommandKilled),
        }
    }
}

#[async_trait]
impl Action for CommandAction {
    async fn run(&self) -> eyre::Result<()> {
        self.execute().await?;
        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("; ")
}
