//! ExamGuard: exam-mode proctoring monitor
//!
//! platform events → EventDetector → ExamSessionStateMachine →
//! ViolationReportController → FullscreenGuard, driven by one queue.

pub mod config;
pub mod core;
pub mod error;
pub mod types;

// =============================================================================
// TIMING [C] - Defaults, all overridable in config
// =============================================================================

/// Grace period after entering in_progress (milliseconds)
/// Absorbs setup noise: the fullscreen request itself fires focus events
pub const GRACE_PERIOD_MS: u64 = 3000;

/// Focus loss within this window after a pointer interaction is ignored (milliseconds)
pub const INTERACTION_DEBOUNCE_MS: u64 = 500;

/// Delay before re-checking that focus is still gone (milliseconds)
pub const FOCUS_RECHECK_MS: u64 = 50;

/// Upper bound on one violation report round trip (milliseconds)
pub const REPORT_TIMEOUT_MS: u64 = 10_000;

/// How long a reloaded page waits for manual fullscreen re-entry (milliseconds)
pub const FULLSCREEN_RESTORE_WAIT_MS: u64 = 5000;

/// Status refresh interval while locked (milliseconds)
pub const STATUS_POLL_INTERVAL_MS: u64 = 15_000;

/// Countdown display refresh (milliseconds)
pub const COUNTDOWN_TICK_MS: u64 = 1000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
