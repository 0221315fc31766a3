//! Scripted event replay against the in-memory server and headless platform
//!
//! Script lines look like `@<ms> <action> [arg]`, times relative to the
//! start of the run and non-decreasing. `#` starts a comment.
//!
//! ```text
//! @0     activate
//! @3500  hidden
//! @3600  dismiss
//! @4000  fullscreen off
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::config::AppConfig;
use crate::core::machine::ExamSessionStateMachine;
use crate::core::monitor::spawn_monitor;
use crate::core::platform::HeadlessPlatform;
use crate::core::server::MemoryExamServer;
use crate::error::ReplayError;
use crate::types::{PlatformEvent, SessionView};

/// Time given to the monitor to settle after each step
const SETTLE_MS: u64 = 10;

lazy_static! {
    static ref STEP_PATTERN: Regex =
        Regex::new(r"^@(\d+)\s+([a-z_]+)(?:\s+(\S+))?$").expect("valid step pattern");
}

/// One scripted action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "arg")]
pub enum ReplayAction {
    Activate,
    /// Page reload: restore from the server's copy of the sitting
    Restore,
    Platform(PlatformEvent),
    Dismiss,
    Confirm,
    Cancel,
    Submit,
    /// Administrator unlock on the server
    Unlock,
    /// Next `n` reports fail in transport
    FailReports(u32),
    /// Reports never answer while on
    HangReports(bool),
    /// Platform refuses fullscreen requests while on
    DenyFullscreen(bool),
}

impl fmt::Display for ReplayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayAction::Activate => write!(f, "activate"),
            ReplayAction::Restore => write!(f, "restore"),
            ReplayAction::Platform(PlatformEvent::VisibilityChanged { hidden: true }) => write!(f, "hidden"),
            ReplayAction::Platform(PlatformEvent::VisibilityChanged { hidden: false }) => write!(f, "visible"),
            ReplayAction::Platform(PlatformEvent::FocusLost) => write!(f, "blur"),
            ReplayAction::Platform(PlatformEvent::FocusGained) => write!(f, "focus"),
            ReplayAction::Platform(PlatformEvent::FullscreenChanged { active }) => {
                write!(f, "fullscreen {}", on_off(*active))
            }
            ReplayAction::Platform(PlatformEvent::Interaction) => write!(f, "click"),
            ReplayAction::Dismiss => write!(f, "dismiss"),
            ReplayAction::Confirm => write!(f, "confirm"),
            ReplayAction::Cancel => write!(f, "cancel"),
            ReplayAction::Submit => write!(f, "submit"),
            ReplayAction::Unlock => write!(f, "unlock"),
            ReplayAction::FailReports(n) => write!(f, "fail_reports {}", n),
            ReplayAction::HangReports(on) => write!(f, "hang_reports {}", on_off(*on)),
            ReplayAction::DenyFullscreen(on) => write!(f, "deny_fullscreen {}", on_off(*on)),
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// A parsed script line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScriptStep {
    pub at_ms: u64,
    pub action: ReplayAction,
}

/// Parse a whole script
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>, ReplayError> {
    let mut steps: Vec<ScriptStep> = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;
        let step = parse_step(line).ok_or_else(|| ReplayError::Parse {
            line: line_no,
            text: line.to_string(),
        })?;
        if let Some(last) = steps.last() {
            if step.at_ms < last.at_ms {
                return Err(ReplayError::OutOfOrder {
                    line: line_no,
                    at_ms: step.at_ms,
                });
            }
        }
        steps.push(step);
    }
    Ok(steps)
}

/// Read and parse a script file
pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<ScriptStep>, ReplayError> {
    parse_script(&std::fs::read_to_string(path)?)
}

fn parse_step(line: &str) -> Option<ScriptStep> {
    let caps = STEP_PATTERN.captures(line)?;
    let at_ms = caps.get(1)?.as_str().parse().ok()?;
    let name = caps.get(2)?.as_str();
    let arg = caps.get(3).map(|m| m.as_str());

    let action = match (name, arg) {
        ("activate", None) => ReplayAction::Activate,
        ("restore", None) => ReplayAction::Restore,
        ("hidden", None) => ReplayAction::Platform(PlatformEvent::VisibilityChanged { hidden: true }),
        ("visible", None) => ReplayAction::Platform(PlatformEvent::VisibilityChanged { hidden: false }),
        ("blur", None) => ReplayAction::Platform(PlatformEvent::FocusLost),
        ("focus", None) => ReplayAction::Platform(PlatformEvent::FocusGained),
        ("click", None) => ReplayAction::Platform(PlatformEvent::Interaction),
        ("fullscreen", Some(arg)) => ReplayAction::Platform(PlatformEvent::FullscreenChanged {
            active: parse_switch(arg)?,
        }),
        ("dismiss", None) => ReplayAction::Dismiss,
        ("confirm", None) => ReplayAction::Confirm,
        ("cancel", None) => ReplayAction::Cancel,
        ("submit", None) => ReplayAction::Submit,
        ("unlock", None) => ReplayAction::Unlock,
        ("fail_reports", Some(arg)) => ReplayAction::FailReports(arg.parse().ok()?),
        ("hang_reports", Some(arg)) => ReplayAction::HangReports(parse_switch(arg)?),
        ("deny_fullscreen", Some(arg)) => ReplayAction::DenyFullscreen(parse_switch(arg)?),
        _ => return None,
    };
    Some(ScriptStep { at_ms, action })
}

fn parse_switch(arg: &str) -> Option<bool> {
    match arg {
        "on" | "true" => Some(true),
        "off" | "false" => Some(false),
        _ => None,
    }
}

/// View after one step settled
#[derive(Debug, Clone, Serialize)]
pub struct ReplayFrame {
    pub at_ms: u64,
    pub action: String,
    pub view: SessionView,
}

/// Run `steps` against a fresh in-memory sitting, one frame per step
pub async fn run_script(steps: &[ScriptStep], config: &AppConfig) -> Vec<ReplayFrame> {
    let server = Arc::new(MemoryExamServer::new(config.policy.clone()));
    let platform = Arc::new(HeadlessPlatform::new());
    let machine = ExamSessionStateMachine::new(
        config.contest_id.clone(),
        config.role,
        config.policy.clone(),
        &config.monitor,
    );
    let monitor = spawn_monitor(machine, server.clone(), platform.clone(), &config.monitor);

    let start = Instant::now();
    let mut frames = Vec::with_capacity(steps.len());
    for step in steps {
        tokio::time::sleep_until(start + Duration::from_millis(step.at_ms)).await;
        debug!(at_ms = step.at_ms, action = %step.action, "replay step");

        match step.action {
            ReplayAction::Activate => monitor.activate(),
            ReplayAction::Restore => {
                if let Err(err) = monitor.restore().await {
                    debug!(error = %err, "replay restore failed");
                }
            }
            ReplayAction::Platform(event) => {
                platform.emit(event);
            }
            ReplayAction::Dismiss => monitor.dismiss_notice(),
            ReplayAction::Confirm => monitor.confirm_submission(),
            ReplayAction::Cancel => monitor.cancel_submission(),
            ReplayAction::Submit => monitor.submit(),
            ReplayAction::Unlock => server.unlock_participant(),
            ReplayAction::FailReports(n) => server.fail_next_reports(n),
            ReplayAction::HangReports(on) => server.hang_reports(on),
            ReplayAction::DenyFullscreen(on) => platform.deny_fullscreen(on),
        }

        tokio::time::sleep(Duration::from_millis(SETTLE_MS)).await;
        frames.push(ReplayFrame {
            at_ms: step.at_ms,
            action: step.action.to_string(),
            view: monitor.view(),
        });
    }

    monitor.shutdown().await;
    frames
}
