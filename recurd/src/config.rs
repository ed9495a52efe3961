//! recurd configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::jobs::JobSpec;
use crate::scheduler::PoolConfig;

/// Main recurd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatcher pool settings
    pub pool: PoolConfig,

    /// Outcome log settings
    pub log: LogConfig,

    /// Recurring jobs to schedule on `recurd run`
    pub jobs: Vec<JobSpec>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Every job needs a unique name, a command and a positive finite interval.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !seen.insert(job.name.as_str()) {
                return Err(eyre::eyre!("Duplicate job name '{}'", job.name));
            }
        }
        Ok(())
    }

    /// Jobs with `enabled: true`
    pub fn enabled_jobs(&self) -> impl Iterator<Item = &JobSpec> {
        self.jobs.iter().filter(|j| j.enabled)
    }

    /// Look up a job by name
    pub fn job(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .recurd.yml
        let local_config = PathBuf::from(".recurd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/recurd/recurd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("recurd").join("recurd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Outcome log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Append every loop cycle as a JSON line to this file
    #[serde(rename = "jsonl-path", skip_serializing_if = "Option::is_none")]
    pub jsonl_path: Option<PathBuf>,
}

impl LogConfig {
    /// Resolve `~/` in the configured path
    pub fn expanded_jsonl_path(&self) -> Option<PathBuf> {
        let path = self.jsonl_path.as_ref()?;
        match path.strip_prefix("~") {
            Ok(rest) => dirs::home_dir().map(|home| home.join(rest)),
            Err(_) => Some(path.clone()),
        }
    }
}
