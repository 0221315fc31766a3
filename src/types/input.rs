//! Messages into the state machine and effects out of it

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExamSession, ReportResult, ViolationEvent};

/// Raw notification from the platform hosting the exam surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum PlatformEvent {
    VisibilityChanged { hidden: bool },
    FocusLost,
    FocusGained,
    FullscreenChanged { active: bool },
    /// Pointer-down or click anywhere on the page
    Interaction,
}

/// Every input the state machine accepts; the runtime serializes them
/// through one queue
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Platform(PlatformEvent),
    /// Participant starts the exam
    Activate,
    /// Page load with a session already known to the server
    Restore {
        session: ExamSession,
        fullscreen_active: bool,
    },
    ExamStarted(Result<ExamSession, String>),
    ReportCompleted {
        client_event_id: String,
        result: ReportResult,
    },
    NoticeDismissed,
    SubmitConfirmed,
    SubmitCancelled,
    SubmitCompleted(Result<ExamSession, String>),
    /// Sitting submitted by an explicit action outside the monitor
    ExternalSubmission,
    StatusRefreshed(Result<ExamSession, String>),
    /// A deadline from `next_deadline()` elapsed
    Tick,
    Teardown,
}

/// Side effects requested by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Subscribe,
    Unsubscribe,
    RequestFullscreen,
    ExitFullscreen,
    StartExam,
    EndExam,
    RefreshStatus,
    ReportViolation(ViolationEvent),
}

/// Point in time as seen by the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    /// Monotonic, drives every timer
    pub at: Instant,
    /// Wall clock, for timestamps and the auto-unlock countdown
    pub wall: DateTime<Utc>,
}

impl Moment {
    pub fn new(at: Instant, wall: DateTime<Utc>) -> Self {
        Self { at, wall }
    }

    pub fn now() -> Self {
        Self::new(Instant::now(), Utc::now())
    }

    /// Same clock, advanced by `d` on both axes
    pub fn after(&self, d: std::time::Duration) -> Self {
        let wall = self.wall + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero());
        Self::new(self.at + d, wall)
    }

    /// Earlier point `at` on the same clock; the wall time is moved back by
    /// the same amount
    pub fn rewound_to(&self, at: Instant) -> Self {
        let back = self.at.saturating_duration_since(at);
        let wall = self.wall - chrono::Duration::from_std(back).unwrap_or_else(|_| chrono::Duration::zero());
        Self::new(at, wall)
    }
}
