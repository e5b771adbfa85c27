//! TaskCore configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scheduler::SchedulerConfig;

/// Main TaskCore configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when none is given on the command line
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Scheduler tick and due window
    pub scheduler: SchedulerConfig,

    /// Defaults handed to the automation worker
    pub automation: AutomationConfig,

    /// State event fan-out
    pub events: EventsConfig,
}

impl Config {
    /// Reject settings the runtime cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_ms == 0 {
            return Err(eyre::eyre!("scheduler.tick-ms must be greater than 0"));
        }
        if self.scheduler.due_window_secs == 0 {
            return Err(eyre::eyre!("scheduler.due-window-secs must be greater than 0"));
        }
        if self.events.capacity == 0 {
            return Err(eyre::eyre!("events.capacity must be greater than 0"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load. Otherwise the first readable file among
    /// `./.taskcore.yml` and `<config dir>/taskcore/taskcore.yml` wins, and
    /// a broken candidate is logged and skipped.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Failed to load config from {}: {:#}", candidate.display(), e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".taskcore.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("taskcore").join("taskcore.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Invalid config")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Automation worker defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Delay between monitor polls
    #[serde(rename = "monitor-delay-ms")]
    pub monitor_delay_ms: u64,

    /// Delay after a worker error
    #[serde(rename = "error-delay-ms")]
    pub error_delay_ms: u64,

    /// Proxies registered before each start
    pub proxies: Vec<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            monitor_delay_ms: 3500,
            error_delay_ms: 3500,
            proxies: Vec::new(),
        }
    }
}

/// State event broadcast settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers lag past this
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}
