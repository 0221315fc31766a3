//! Exam status and monitor activity definitions

use serde::{Deserialize, Serialize};

/// Server-facing status of one exam sitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    /// Participant has not started the exam yet
    #[default]
    NotStarted,
    /// Exam running, monitoring active
    InProgress,
    /// Unlocked by a proctor or auto-unlock, waiting to resume
    Paused,
    /// Server-confirmed lock, answers cannot be submitted
    Locked,
    /// Terminal for this sitting
    Submitted,
}

impl ExamStatus {
    /// Statuses in which the monitor is attached to the platform
    pub fn is_monitored(&self) -> bool {
        matches!(self, ExamStatus::InProgress | ExamStatus::Paused | ExamStatus::Locked)
    }

    /// Statuses in which a fullscreen exit asks for submission instead of
    /// being reported as a violation
    pub fn exit_means_submit(&self) -> bool {
        matches!(self, ExamStatus::Paused | ExamStatus::Locked)
    }

    /// Get ANSI color code for terminal display
    pub fn color_code(&self) -> &'static str {
        match self {
            ExamStatus::NotStarted => "\x1b[90m", // Gray
            ExamStatus::InProgress => "\x1b[32m", // Green
            ExamStatus::Paused => "\x1b[33m",     // Yellow
            ExamStatus::Locked => "\x1b[31m",     // Red
            ExamStatus::Submitted => "\x1b[36m",  // Cyan
        }
    }

    /// Get emoji for status
    pub fn emoji(&self) -> &'static str {
        match self {
            ExamStatus::NotStarted => "⏳",
            ExamStatus::InProgress => "📝",
            ExamStatus::Paused => "⏸",
            ExamStatus::Locked => "🔒",
            ExamStatus::Submitted => "✅",
        }
    }
}

impl std::fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExamStatus::NotStarted => "NOT_STARTED",
            ExamStatus::InProgress => "IN_PROGRESS",
            ExamStatus::Paused => "PAUSED",
            ExamStatus::Locked => "LOCKED",
            ExamStatus::Submitted => "SUBMITTED",
        };
        write!(f, "{}", name)
    }
}

/// What opened the confirm-submission notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    /// Fullscreen was left while locked or paused
    FullscreenExited,
    /// Page restored without fullscreen and the user did not re-enter it
    FullscreenNotRestored,
}

/// What the monitor is doing right now.
///
/// One enum instead of a set of independent flags: every combination the
/// monitor can be in is a variant, so there is no "reporting while
/// submitting" to reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Activity {
    /// Watching (or inert when the status is not monitored)
    #[default]
    Idle,
    /// `startExam` in flight
    Starting,
    /// Grace window after entering `in_progress`
    Grace,
    /// Violation notice on screen; `pending` until the server answers
    Reporting { pending: bool },
    /// Server answered `locked`, notice still on screen
    LockedPendingAck,
    /// Confirm-submission notice on screen
    ConfirmingSubmit { trigger: SubmitTrigger },
    /// Initial-load wait for the user to re-enter fullscreen
    RestoringFullscreen,
    /// `endExam` in flight
    Submitting,
}

impl Activity {
    pub fn label(&self) -> &'static str {
        match self {
            Activity::Idle => "idle",
            Activity::Starting => "starting",
            Activity::Grace => "grace",
            Activity::Reporting { pending: true } => "reporting(pending)",
            Activity::Reporting { pending: false } => "reporting",
            Activity::LockedPendingAck => "locked-pending-ack",
            Activity::ConfirmingSubmit { .. } => "confirming-submit",
            Activity::RestoringFullscreen => "restoring-fullscreen",
            Activity::Submitting => "submitting",
        }
    }
}

/// Role of the user viewing the exam page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Participant,
    Teacher,
    Proctor,
    Admin,
}

impl Role {
    /// Staff roles are never monitored
    pub fn bypasses_monitoring(&self) -> bool {
        !matches!(self, Role::Participant)
    }
}
