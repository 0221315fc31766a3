//! Core modules for ExamGuard

pub mod detector;
pub mod clock;
pub mod report;
pub mod fullscreen;
pub mod machine;
pub mod server;
pub mod platform;
pub mod monitor;
pub mod replay;
pub mod api;

pub use detector::{Detection, EventDetector};
pub use clock::{format_hms, ClockSignals, SessionClock};
pub use report::{send_report, ViolationReportController};
pub use fullscreen::FullscreenGuard;
pub use machine::ExamSessionStateMachine;
pub use server::{CallCounts, ExamServer, HttpExamServer, MemoryExamServer};
pub use platform::{EventSink, HeadlessPlatform, Platform, PlatformCalls, ShellCommand, ShellPlatform};
pub use monitor::{spawn_monitor, MonitorHandle};
pub use replay::{load_script, parse_script, run_script, ReplayAction, ReplayFrame, ScriptStep};
pub use api::{create_router, run_server, Bridge, ShellMessage};
