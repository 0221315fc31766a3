//! Presentation-layer structures: notices and the published session view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Activity, ExamStatus, ReasonCode, ReportResult, SubmitTrigger, ViolationKind};

/// Blocking notice the presentation layer must show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "notice")]
pub enum Notice {
    /// Violation detected; confirm is disabled while `pending`
    Violation {
        kind: ViolationKind,
        reason_text: String,
        pending: bool,
        result: Option<ReportResult>,
    },
    /// Leaving fullscreen now ends the exam
    ConfirmSubmission {
        trigger: SubmitTrigger,
        error: Option<String>,
    },
    /// One-time "you have been unlocked"
    Unlocked,
    /// Initial-load prompt to re-enter fullscreen
    RestoreFullscreen,
}

impl Notice {
    /// Whether the notice's confirm control is enabled
    pub fn can_confirm(&self) -> bool {
        match self {
            Notice::Violation { pending, .. } => !pending,
            _ => true,
        }
    }
}

/// Snapshot of the monitor published after every input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub timestamp: DateTime<Utc>,
    pub contest_id: String,
    pub status: ExamStatus,
    pub activity: Activity,
    pub violation_count: u32,
    pub max_warnings: u32,
    pub lock_reason: Option<String>,
    pub auto_unlock_at: Option<DateTime<Utc>>,
    /// Remaining time to auto-unlock as HH:MM:SS
    pub countdown: Option<String>,
    pub notice: Option<Notice>,
    pub bypassed: bool,
    pub reason: ReasonCode,
}

impl SessionView {
    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        format!(
            "{}{} {}{}",
            self.status.color_code(),
            self.status.emoji(),
            self.to_parseable_string(),
            "\x1b[0m"
        )
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        let mut line = format!(
            "status={} | activity={} | violations={}/{} | reason={}",
            self.status,
            self.activity.label(),
            self.violation_count,
            self.max_warnings,
            self.reason.code()
        );
        if let Some(countdown) = &self.countdown {
            line.push_str(&format!(" | unlock_in={}", countdown));
        }
        if let Some(notice) = &self.notice {
            line.push_str(&format!(" | notice={}", notice_label(notice)));
        }
        line
    }
}

fn notice_label(notice: &Notice) -> &'static str {
    match notice {
        Notice::Violation { pending: true, .. } => "violation(pending)",
        Notice::Violation { pending: false, .. } => "violation",
        Notice::ConfirmSubmission { .. } => "confirm_submission",
        Notice::Unlocked => "unlocked",
        Notice::RestoreFullscreen => "restore_fullscreen",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_violation_cannot_confirm() {
        let notice = Notice::Violation {
            kind: ViolationKind::TabHidden,
            reason_text: ViolationKind::TabHidden.reason_text().into(),
            pending: true,
            result: None,
        };
        assert!(!notice.can_confirm());
        assert!(Notice::Unlocked.can_confirm());
    }

    #[test]
    fn test_parseable_string_includes_countdown() {
        let view = SessionView {
            timestamp: Utc::now(),
            contest_id: "c1".into(),
            status: ExamStatus::Locked,
            activity: Activity::Idle,
            violation_count: 2,
            max_warnings: 2,
            lock_reason: Some("too many warnings".into()),
            auto_unlock_at: None,
            countdown: Some("00:04:59".into()),
            notice: None,
            bypassed: false,
            reason: ReasonCode::E004_LOCKED,
        };
        let line = view.to_parseable_string();
        assert!(line.contains("status=LOCKED"));
        assert!(line.contains("violations=2/2"));
        assert!(line.contains("unlock_in=00:04:59"));
    }
}
