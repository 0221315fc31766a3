//! Violation events and report outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classes of departure from the monitored surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Page visibility went to hidden (tab switch, minimize)
    TabHidden,
    /// Window lost focus and did not get it back
    WindowBlur,
    /// Fullscreen was left while the exam was running
    ExitFullscreen,
}

impl ViolationKind {
    /// Wire name used in report requests
    pub fn code(&self) -> &'static str {
        match self {
            ViolationKind::TabHidden => "tab_hidden",
            ViolationKind::WindowBlur => "window_blur",
            ViolationKind::ExitFullscreen => "exit_fullscreen",
        }
    }

    /// Human-readable reason sent alongside the kind
    pub fn reason_text(&self) -> &'static str {
        match self {
            ViolationKind::TabHidden => "Switched away from the exam tab",
            ViolationKind::WindowBlur => "Exam window lost focus",
            ViolationKind::ExitFullscreen => "Exited fullscreen mode",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One classified violation, transient on the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Client-generated id the server can de-duplicate on
    pub client_event_id: String,
    pub kind: ViolationKind,
    pub occurred_at: DateTime<Utc>,
    pub reason_text: String,
}

/// What `recordViolation` answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationReportOutcome {
    pub violation_count: u32,
    pub max_warnings: u32,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_unlock_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bypass: bool,
}

/// Why a report produced no outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFailureKind {
    /// Request never reached the server or the connection broke
    Transport,
    /// Server answered but declined the report
    Rejected,
    /// No answer within the report timeout
    TimedOut,
}

/// Sentinel error outcome stored in place of a server answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFailure {
    pub kind: ReportFailureKind,
    pub message: String,
}

/// Result of one violation report cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum ReportResult {
    Recorded(ViolationReportOutcome),
    Failed(ReportFailure),
}

impl ReportResult {
    /// Locking only ever comes from a server outcome
    pub fn locks(&self) -> bool {
        match self {
            ReportResult::Recorded(outcome) => outcome.locked && !outcome.bypass,
            ReportResult::Failed(_) => false,
        }
    }

    pub fn outcome(&self) -> Option<&ViolationReportOutcome> {
        match self {
            ReportResult::Recorded(outcome) => Some(outcome),
            ReportResult::Failed(_) => None,
        }
    }
}
