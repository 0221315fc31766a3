//! Configuration: monitor timing, contest policy, server endpoint
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ContestPolicy, Role};
use crate::{
    FOCUS_RECHECK_MS, FULLSCREEN_RESTORE_WAIT_MS, GRACE_PERIOD_MS, INTERACTION_DEBOUNCE_MS,
    REPORT_TIMEOUT_MS, STATUS_POLL_INTERVAL_MS,
};

/// Timing knobs of the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub grace_period_ms: u64,
    pub interaction_debounce_ms: u64,
    pub focus_recheck_ms: u64,
    pub report_timeout_ms: u64,
    pub fullscreen_restore_wait_ms: u64,
    pub status_poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: GRACE_PERIOD_MS,
            interaction_debounce_ms: INTERACTION_DEBOUNCE_MS,
            focus_recheck_ms: FOCUS_RECHECK_MS,
            report_timeout_ms: REPORT_TIMEOUT_MS,
            fullscreen_restore_wait_ms: FULLSCREEN_RESTORE_WAIT_MS,
            status_poll_interval_ms: STATUS_POLL_INTERVAL_MS,
        }
    }
}

impl MonitorConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn interaction_debounce(&self) -> Duration {
        Duration::from_millis(self.interaction_debounce_ms)
    }

    pub fn focus_recheck(&self) -> Duration {
        Duration::from_millis(self.focus_recheck_ms)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }

    pub fn fullscreen_restore_wait(&self) -> Duration {
        Duration::from_millis(self.fullscreen_restore_wait_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}

/// Where the exam server lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Everything one monitored sitting needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub contest_id: String,
    pub role: Role,
    pub monitor: MonitorConfig,
    pub policy: ContestPolicy,
    pub server: Option<ServerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            contest_id: "local".to_string(),
            role: Role::Participant,
            monitor: MonitorConfig::default(),
            policy: ContestPolicy::default(),
            server: None,
        }
    }
}

impl AppConfig {
    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
