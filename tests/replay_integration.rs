//! Integration tests for scripted replay
//!
//! Scripts run on paused tokio time, so the 3 s grace window and the
//! 10 s report timeout cost nothing.

use examguard::config::AppConfig;
use examguard::core::{parse_script, run_script, ReplayFrame};
use examguard::types::{Activity, ExamStatus, Notice, ReasonCode, ReportResult};
use pretty_assertions::assert_eq;

const TWO_WARNINGS: &str = include_str!("../demos/two_warnings.trace");
const TWO_WARNINGS_CONFIG: &str = include_str!("../demos/two_warnings.toml");

fn frame<'a>(frames: &'a [ReplayFrame], at_ms: u64) -> &'a ReplayFrame {
    frames
        .iter()
        .find(|f| f.at_ms == at_ms)
        .unwrap_or_else(|| panic!("no frame at {}ms", at_ms))
}

#[tokio::test(start_paused = true)]
async fn test_two_warning_demo_trace() {
    let config = AppConfig::from_toml_str(TWO_WARNINGS_CONFIG).unwrap();
    let steps = parse_script(TWO_WARNINGS).unwrap();
    let frames = run_script(&steps, &config).await;
    assert_eq!(frames.len(), steps.len());

    let activated = frame(&frames, 0);
    assert_eq!(activated.view.status, ExamStatus::InProgress);
    assert_eq!(activated.view.activity, Activity::Grace);
    assert_eq!(activated.view.contest_id, "demo-final");

    // Hidden during grace: nothing shown
    assert_eq!(frame(&frames, 1000).view.notice, None);

    // Debounced blur and a blur that came back in time
    assert_eq!(frame(&frames, 3200).view.notice, None);
    assert_eq!(frame(&frames, 3520).view.reason, ReasonCode::E002_GRACE_ENDED);
    assert_eq!(frame(&frames, 3520).view.violation_count, 0);

    let first = frame(&frames, 3700);
    assert_eq!(first.action, "hidden");
    assert_eq!(first.view.violation_count, 1);
    assert_eq!(first.view.activity, Activity::Reporting { pending: false });

    assert_eq!(frame(&frames, 3800).view.activity, Activity::Idle);

    let second = frame(&frames, 4000);
    assert_eq!(second.view.activity, Activity::LockedPendingAck);
    assert_eq!(second.view.status, ExamStatus::InProgress);

    let locked = frame(&frames, 4100);
    assert_eq!(locked.view.status, ExamStatus::Locked);
    assert!(locked.view.countdown.is_some());
    assert!(locked.view.auto_unlock_at.is_some());

    let ignored = frame(&frames, 4200);
    assert_eq!(ignored.view.violation_count, 2);
    assert_eq!(ignored.view.notice, None);

    assert!(matches!(
        frame(&frames, 4300).view.notice,
        Some(Notice::ConfirmSubmission { .. })
    ));

    let submitted = frame(&frames, 4400);
    assert_eq!(submitted.view.status, ExamStatus::Submitted);
    assert_eq!(submitted.view.reason, ReasonCode::E005_SUBMITTED);
}

#[tokio::test(start_paused = true)]
async fn test_failed_and_hung_reports_fail_open() {
    let script = "\
        @0     activate\n\
        @3100  fail_reports 1\n\
        @3200  hidden\n\
        @3300  dismiss\n\
        @3400  hang_reports on\n\
        @3500  hidden\n\
        @3600  dismiss\n\
        @14000 dismiss\n";
    let steps = parse_script(script).unwrap();
    let frames = run_script(&steps, &AppConfig::default()).await;

    let failed = frame(&frames, 3200);
    assert_eq!(failed.view.violation_count, 0);
    assert_eq!(failed.view.reason, ReasonCode::E003_REPORT_FAILED);
    assert!(matches!(
        failed.view.notice,
        Some(Notice::Violation {
            result: Some(ReportResult::Failed(_)),
            ..
        })
    ));
    assert_eq!(frame(&frames, 3300).view.status, ExamStatus::InProgress);

    // Dismiss while pending is ignored
    assert_eq!(
        frame(&frames, 3600).view.activity,
        Activity::Reporting { pending: true }
    );

    // Timed out after 10 s, then dismissible
    let resumed = frame(&frames, 14000);
    assert_eq!(resumed.view.activity, Activity::Idle);
    assert_eq!(resumed.view.violation_count, 0);
    assert_eq!(resumed.view.status, ExamStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_tab_switching_allowed_only_fullscreen_counts() {
    let mut config = AppConfig::default();
    config.policy.ban_tab_switching = false;
    let script = "\
        @0    activate\n\
        @3100 hidden\n\
        @3200 blur\n\
        @3300 fullscreen off\n";
    let frames = run_script(&parse_script(script).unwrap(), &config).await;

    assert_eq!(frame(&frames, 3100).view.notice, None);
    assert_eq!(frame(&frames, 3200).view.notice, None);
    let exit = frame(&frames, 3300);
    assert_eq!(exit.view.violation_count, 1);
    assert!(matches!(exit.view.notice, Some(Notice::Violation { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_blur_lost_in_grace_stays_quiet_after_grace() {
    let script = "\
        @0    activate\n\
        @2990 blur\n\
        @3100 dismiss\n\
        @3200 focus\n\
        @3600 blur\n\
        @3700 click\n";
    let frames = run_script(&parse_script(script).unwrap(), &AppConfig::default()).await;

    let after_grace = frame(&frames, 3100);
    assert_eq!(after_grace.view.activity, Activity::Idle);
    assert_eq!(after_grace.view.notice, None);
    assert_eq!(after_grace.view.violation_count, 0);

    // The later loss is past grace and outlives its recheck
    let reported = frame(&frames, 3700);
    assert_eq!(reported.view.violation_count, 1);
    assert!(matches!(reported.view.notice, Some(Notice::Violation { .. })));
}
