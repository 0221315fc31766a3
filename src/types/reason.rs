//! Reason codes for monitor decisions and state changes
//! Grouped by the component that makes the decision

use serde::{Deserialize, Serialize};

/// Reason codes for every transition and every dropped event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum ReasonCode {
    // =========================================================================
    // E001: Lifecycle
    // =========================================================================
    /// Nothing has happened yet
    E001_INITIAL,
    /// startExam requested
    E001_STARTING,
    /// startExam failed, still not started
    E001_START_FAILED,
    /// Entered in_progress, grace window running
    E001_ACTIVATED,
    /// Staff role or bypassed session, monitoring inert
    E001_BYPASSED,
    /// Contest does not use exam mode
    E001_EXAM_MODE_DISABLED,
    /// Session adopted from the server on page load
    E001_RESTORED,
    /// Monitor detached from the platform
    E001_TORN_DOWN,

    // =========================================================================
    // E002: Suppression
    // =========================================================================
    /// Grace window still running
    E002_GRACE_SUPPRESSED,
    /// A report cycle or notice already owns the session
    E002_BUSY_SUPPRESSED,
    /// Session locked, violations ignored
    E002_LOCKED_IGNORED,
    /// Focus loss right after a pointer interaction
    E002_INTERACTION_DEBOUNCED,
    /// Focus came back before the recheck
    E002_FOCUS_RETURNED,
    /// Tab switching allowed by the contest
    E002_TAB_SWITCH_ALLOWED,
    /// Grace window finished, watching
    E002_GRACE_ENDED,

    // =========================================================================
    // E003: Reporting
    // =========================================================================
    /// Violation notice shown, report in flight
    E003_REPORT_PENDING,
    /// Server recorded the violation
    E003_REPORT_RECORDED,
    /// Report failed, failing open
    E003_REPORT_FAILED,
    /// Report answer for an event that is no longer in flight
    E003_REPORT_STALE,
    /// Notice dismissed, monitoring resumed
    E003_RESUMED,

    // =========================================================================
    // E004: Lock
    // =========================================================================
    /// Server-confirmed lock applied
    E004_LOCKED,
    /// Auto-unlock countdown reached zero, asking the server
    E004_AUTO_UNLOCK_DUE,
    /// Periodic status refresh while locked
    E004_STATUS_POLL,
    /// Server reports locked -> paused
    E004_UNLOCKED,
    /// Server reports the sitting running again
    E004_RESUMED_BY_SERVER,

    // =========================================================================
    // E005: Fullscreen and submission
    // =========================================================================
    /// Waiting for the user to re-enter fullscreen after reload
    E005_AWAITING_FULLSCREEN,
    /// Fullscreen re-entered
    E005_FULLSCREEN_RESTORED,
    /// Confirm-submission notice shown
    E005_SUBMIT_PROMPTED,
    /// Submission cancelled, fullscreen re-requested
    E005_SUBMIT_CANCELLED,
    /// endExam in flight
    E005_SUBMITTING,
    /// endExam failed
    E005_SUBMIT_FAILED,
    /// Sitting submitted
    E005_SUBMITTED,
}

impl ReasonCode {
    /// Get the code string (for logging)
    pub fn code(&self) -> &'static str {
        match self {
            Self::E001_INITIAL => "E001_INITIAL",
            Self::E001_STARTING => "E001_STARTING",
            Self::E001_START_FAILED => "E001_START_FAILED",
            Self::E001_ACTIVATED => "E001_ACTIVATED",
            Self::E001_BYPASSED => "E001_BYPASSED",
            Self::E001_EXAM_MODE_DISABLED => "E001_EXAM_MODE_DISABLED",
            Self::E001_RESTORED => "E001_RESTORED",
            Self::E001_TORN_DOWN => "E001_TORN_DOWN",
            Self::E002_GRACE_SUPPRESSED => "E002_GRACE_SUPPRESSED",
            Self::E002_BUSY_SUPPRESSED => "E002_BUSY_SUPPRESSED",
            Self::E002_LOCKED_IGNORED => "E002_LOCKED_IGNORED",
            Self::E002_INTERACTION_DEBOUNCED => "E002_INTERACTION_DEBOUNCED",
            Self::E002_FOCUS_RETURNED => "E002_FOCUS_RETURNED",
            Self::E002_TAB_SWITCH_ALLOWED => "E002_TAB_SWITCH_ALLOWED",
            Self::E002_GRACE_ENDED => "E002_GRACE_ENDED",
            Self::E003_REPORT_PENDING => "E003_REPORT_PENDING",
            Self::E003_REPORT_RECORDED => "E003_REPORT_RECORDED",
            Self::E003_REPORT_FAILED => "E003_REPORT_FAILED",
            Self::E003_REPORT_STALE => "E003_REPORT_STALE",
            Self::E003_RESUMED => "E003_RESUMED",
            Self::E004_LOCKED => "E004_LOCKED",
            Self::E004_AUTO_UNLOCK_DUE => "E004_AUTO_UNLOCK_DUE",
            Self::E004_STATUS_POLL => "E004_STATUS_POLL",
            Self::E004_UNLOCKED => "E004_UNLOCKED",
            Self::E004_RESUMED_BY_SERVER => "E004_RESUMED_BY_SERVER",
            Self::E005_AWAITING_FULLSCREEN => "E005_AWAITING_FULLSCREEN",
            Self::E005_FULLSCREEN_RESTORED => "E005_FULLSCREEN_RESTORED",
            Self::E005_SUBMIT_PROMPTED => "E005_SUBMIT_PROMPTED",
            Self::E005_SUBMIT_CANCELLED => "E005_SUBMIT_CANCELLED",
            Self::E005_SUBMITTING => "E005_SUBMITTING",
            Self::E005_SUBMIT_FAILED => "E005_SUBMIT_FAILED",
            Self::E005_SUBMITTED => "E005_SUBMITTED",
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::E001_INITIAL => "Waiting for activation",
            Self::E001_STARTING => "Starting exam",
            Self::E001_START_FAILED => "Exam could not be started",
            Self::E001_ACTIVATED => "Exam started - grace period",
            Self::E001_BYPASSED => "Monitoring bypassed",
            Self::E001_EXAM_MODE_DISABLED => "Exam mode disabled",
            Self::E001_RESTORED => "Session restored",
            Self::E001_TORN_DOWN => "Monitor detached",
            Self::E002_GRACE_SUPPRESSED => "Ignored during grace period",
            Self::E002_BUSY_SUPPRESSED => "Ignored while another notice is open",
            Self::E002_LOCKED_IGNORED => "Ignored while locked",
            Self::E002_INTERACTION_DEBOUNCED => "Focus loss after interaction ignored",
            Self::E002_FOCUS_RETURNED => "Focus returned before recheck",
            Self::E002_TAB_SWITCH_ALLOWED => "Tab switching allowed",
            Self::E002_GRACE_ENDED => "Monitoring",
            Self::E003_REPORT_PENDING => "Reporting violation",
            Self::E003_REPORT_RECORDED => "Violation recorded",
            Self::E003_REPORT_FAILED => "Violation report failed",
            Self::E003_REPORT_STALE => "Stale report answer dropped",
            Self::E003_RESUMED => "Monitoring resumed",
            Self::E004_LOCKED => "Exam locked",
            Self::E004_AUTO_UNLOCK_DUE => "Auto-unlock due, refreshing",
            Self::E004_STATUS_POLL => "Refreshing lock status",
            Self::E004_UNLOCKED => "Exam unlocked",
            Self::E004_RESUMED_BY_SERVER => "Exam resumed",
            Self::E005_AWAITING_FULLSCREEN => "Waiting for fullscreen",
            Self::E005_FULLSCREEN_RESTORED => "Fullscreen restored",
            Self::E005_SUBMIT_PROMPTED => "Confirm submission",
            Self::E005_SUBMIT_CANCELLED => "Submission cancelled",
            Self::E005_SUBMITTING => "Submitting exam",
            Self::E005_SUBMIT_FAILED => "Submission failed",
            Self::E005_SUBMITTED => "Exam submitted",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}
