//! Exam session record and contest policy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ExamStatus;

/// Server-authoritative state of one participant's sitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExamSession {
    pub status: ExamStatus,
    pub is_locked: bool,
    pub lock_reason: Option<String>,
    pub violation_count: u32,
    pub max_warnings: u32,
    pub auto_unlock_at: Option<DateTime<Utc>>,
    /// Proctor/administrator sitting, never monitored
    pub is_bypassed: bool,
}

impl ExamSession {
    /// Fresh session for a contest that has not been started
    pub fn not_started(max_warnings: u32) -> Self {
        Self {
            max_warnings,
            ..Self::default()
        }
    }
}

/// Contest configuration consumed by the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContestPolicy {
    pub exam_mode_enabled: bool,
    /// When false, tab switches and focus loss are not violations
    pub ban_tab_switching: bool,
    pub max_cheat_warnings: u32,
    pub allow_auto_unlock: bool,
    pub auto_unlock_minutes: u32,
}

impl Default for ContestPolicy {
    fn default() -> Self {
        Self {
            exam_mode_enabled: true,
            ban_tab_switching: true,
            max_cheat_warnings: 3,
            allow_auto_unlock: false,
            auto_unlock_minutes: 5,
        }
    }
}
