//! Integration tests for the monitor runtime
//!
//! Full sittings against the in-memory server and headless platform, on
//! paused tokio time so grace, timeout and polling run instantly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use examguard::config::MonitorConfig;
use examguard::core::{spawn_monitor, ExamSessionStateMachine, HeadlessPlatform, MemoryExamServer, Platform, MonitorHandle};
use examguard::types::{
    Activity, ContestPolicy, ExamSession, ExamStatus, Notice, PlatformEvent, ReasonCode, ReportFailureKind,
    ReportResult, Role, SessionView, SubmitTrigger,
};

const HIDDEN: PlatformEvent = PlatformEvent::VisibilityChanged { hidden: true };
const FULLSCREEN_OFF: PlatformEvent = PlatformEvent::FullscreenChanged { active: false };

struct Sitting {
    server: Arc<MemoryExamServer>,
    platform: Arc<HeadlessPlatform>,
    monitor: MonitorHandle,
}

impl Sitting {
    fn start(server: MemoryExamServer, platform: HeadlessPlatform, policy: ContestPolicy, role: Role) -> Self {
        let server = Arc::new(server);
        let platform = Arc::new(platform);
        let config = MonitorConfig::default();
        let machine = ExamSessionStateMachine::new("c1", role, policy, &config);
        let monitor = spawn_monitor(machine, server.clone(), platform.clone(), &config);
        Self {
            server,
            platform,
            monitor,
        }
    }

    fn new(policy: ContestPolicy) -> Self {
        let server = MemoryExamServer::new(policy.clone());
        Self::start(server, HeadlessPlatform::new(), policy, Role::Participant)
    }

    async fn until<F>(&self, predicate: F) -> SessionView
    where
        F: FnMut(&SessionView) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(120), self.monitor.wait_for(predicate))
            .await
            .expect("view never matched")
            .expect("monitor stopped")
    }

    /// Activate and wait out the grace window
    async fn activated(policy: ContestPolicy) -> Self {
        let sitting = Self::new(policy);
        sitting.monitor.activate();
        sitting.until(|v| v.activity == Activity::Grace).await;
        tokio::time::sleep(Duration::from_millis(3000)).await;
        sitting.until(|v| v.activity == Activity::Idle).await;
        assert!(sitting.platform.is_fullscreen());
        sitting
    }

    async fn violation_answered(&self) -> SessionView {
        self.until(|v| matches!(v.notice, Some(Notice::Violation { pending: false, .. })))
            .await
    }
}

fn policy(max: u32) -> ContestPolicy {
    ContestPolicy {
        max_cheat_warnings: max,
        ..ContestPolicy::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_two_warnings_lock_then_fullscreen_exit_submits() {
    let s = Sitting::new(policy(2));
    s.monitor.activate();
    let view = s.until(|v| v.activity == Activity::Grace).await;
    assert_eq!(view.status, ExamStatus::InProgress);
    assert_eq!(s.platform.calls().subscribe, 1);

    // Suppressed during grace
    s.platform.emit(HIDDEN);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(s.monitor.view().notice, None);
    assert_eq!(s.server.calls().record_violation, 0);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    s.until(|v| v.activity == Activity::Idle).await;

    // First warning
    s.platform.emit(HIDDEN);
    let view = s.violation_answered().await;
    assert_eq!(view.violation_count, 1);
    assert_eq!(view.status, ExamStatus::InProgress);
    s.monitor.dismiss_notice();
    s.until(|v| v.activity == Activity::Idle && v.notice.is_none()).await;

    // Second warning locks on dismissal
    s.platform.emit(HIDDEN);
    let view = s.until(|v| v.activity == Activity::LockedPendingAck).await;
    assert_eq!(view.violation_count, 2);
    assert_eq!(view.status, ExamStatus::InProgress);
    s.monitor.dismiss_notice();
    let view = s.until(|v| v.status == ExamStatus::Locked).await;
    assert!(view.lock_reason.is_some());

    // Violations while locked are not reported
    s.platform.emit(HIDDEN);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(s.server.calls().record_violation, 2);

    // Leaving fullscreen while locked means submit
    s.platform.emit(FULLSCREEN_OFF);
    let view = s
        .until(|v| matches!(v.notice, Some(Notice::ConfirmSubmission { .. })))
        .await;
    assert_eq!(
        view.activity,
        Activity::ConfirmingSubmit {
            trigger: SubmitTrigger::FullscreenExited
        }
    );
    s.monitor.confirm_submission();
    s.until(|v| v.status == ExamStatus::Submitted).await;

    assert_eq!(s.server.session().status, ExamStatus::Submitted);
    assert_eq!(s.server.calls().end_exam, 1);
    // Already out of fullscreen, nothing to release
    assert_eq!(s.platform.calls().exit_fullscreen, 0);
    assert!(!s.platform.is_subscribed());
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_fails_open() {
    let s = Sitting::activated(policy(2)).await;
    s.server.fail_next_reports(1);

    s.platform.emit(HIDDEN);
    let view = s.violation_answered().await;
    assert_eq!(view.violation_count, 0);
    match view.notice {
        Some(Notice::Violation {
            result: Some(ReportResult::Failed(failure)),
            ..
        }) => assert_eq!(failure.kind, ReportFailureKind::Transport),
        other => panic!("expected failed report, got {:?}", other),
    }

    s.monitor.dismiss_notice();
    let view = s.until(|v| v.activity == Activity::Idle && v.notice.is_none()).await;
    assert_eq!(view.status, ExamStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_hung_report_times_out_and_blocks_until_then() {
    let s = Sitting::activated(policy(2)).await;
    s.server.hang_reports(true);

    s.platform.emit(HIDDEN);
    s.until(|v| v.activity == Activity::Reporting { pending: true }).await;

    // Pending notice cannot be dismissed and a second event is not reported
    s.monitor.dismiss_notice();
    s.platform.emit(PlatformEvent::FullscreenChanged { active: false });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(s.monitor.view().activity, Activity::Reporting { pending: true });
    assert_eq!(s.server.calls().record_violation, 1);

    let view = s.violation_answered().await;
    match view.notice {
        Some(Notice::Violation {
            result: Some(ReportResult::Failed(failure)),
            ..
        }) => assert_eq!(failure.kind, ReportFailureKind::TimedOut),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_auto_unlock_pauses_and_cancel_reenters_fullscreen() {
    let s = Sitting::activated(ContestPolicy {
        max_cheat_warnings: 1,
        allow_auto_unlock: true,
        auto_unlock_minutes: 0,
        ..ContestPolicy::default()
    })
    .await;

    s.platform.emit(HIDDEN);
    let view = s.until(|v| v.activity == Activity::LockedPendingAck).await;
    assert!(view.auto_unlock_at.is_some());
    s.monitor.dismiss_notice();

    let view = s
        .until(|v| v.status == ExamStatus::Paused && v.notice == Some(Notice::Unlocked))
        .await;
    assert_eq!(view.countdown, None);
    assert_eq!(view.lock_reason, None);
    s.monitor.dismiss_notice();
    s.until(|v| v.notice.is_none()).await;

    // Paused: fullscreen exit prompts, cancel re-requests fullscreen
    s.platform.emit(FULLSCREEN_OFF);
    s.until(|v| matches!(v.notice, Some(Notice::ConfirmSubmission { .. })))
        .await;
    s.monitor.cancel_submission();
    let view = s.until(|v| v.activity == Activity::Idle && v.notice.is_none()).await;
    assert_eq!(view.status, ExamStatus::Paused);
    assert!(s.platform.is_fullscreen());
}

#[tokio::test(start_paused = true)]
async fn test_admin_unlock_observed_by_polling() {
    let s = Sitting::activated(policy(1)).await;
    s.platform.emit(HIDDEN);
    s.until(|v| v.activity == Activity::LockedPendingAck).await;
    s.monitor.dismiss_notice();
    let view = s.until(|v| v.status == ExamStatus::Locked).await;
    assert_eq!(view.countdown, None);

    s.server.unlock_participant();
    let view = s.until(|v| v.status == ExamStatus::Paused).await;
    assert_eq!(view.reason, ReasonCode::E004_UNLOCKED);
    assert!(s.server.calls().fetch_session >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_restore_locked_sitting_resumes_countdown() {
    let policy = policy(2);
    let locked = ExamSession {
        status: ExamStatus::Locked,
        is_locked: true,
        lock_reason: Some("Exceeded 2 warnings".into()),
        violation_count: 2,
        max_warnings: 2,
        auto_unlock_at: Some(Utc::now() + chrono::Duration::minutes(5)),
        is_bypassed: false,
    };
    let s = Sitting::start(
        MemoryExamServer::with_session(policy.clone(), locked),
        HeadlessPlatform::fullscreen(),
        policy,
        Role::Participant,
    );

    s.monitor.restore().await.unwrap();
    let view = s.until(|v| v.status == ExamStatus::Locked && v.countdown.is_some()).await;
    assert_eq!(view.reason, ReasonCode::E001_RESTORED);
    assert!(view.countdown.unwrap().starts_with("00:0"));
    assert_eq!(s.platform.calls().request_fullscreen, 0);

    // Countdown keeps ticking down
    tokio::time::sleep(Duration::from_secs(5)).await;
    let later = s.monitor.view().countdown.unwrap();
    assert!(later.as_str() < "00:04:56");

    s.platform.emit(FULLSCREEN_OFF);
    s.until(|v| matches!(v.notice, Some(Notice::ConfirmSubmission { .. })))
        .await;
    s.monitor.confirm_submission();
    s.until(|v| v.status == ExamStatus::Submitted).await;
    assert_eq!(s.platform.calls().exit_fullscreen, 0);
}

#[tokio::test(start_paused = true)]
async fn test_restore_without_fullscreen_prompts_then_submits() {
    let policy = policy(2);
    let in_progress = ExamSession {
        status: ExamStatus::InProgress,
        max_warnings: 2,
        ..ExamSession::default()
    };
    let s = Sitting::start(
        MemoryExamServer::with_session(policy.clone(), in_progress),
        HeadlessPlatform::new(),
        policy,
        Role::Participant,
    );

    s.monitor.restore().await.unwrap();
    let view = s.until(|v| v.notice == Some(Notice::RestoreFullscreen)).await;
    assert_eq!(view.activity, Activity::RestoringFullscreen);

    let view = s
        .until(|v| matches!(v.notice, Some(Notice::ConfirmSubmission { .. })))
        .await;
    assert_eq!(
        view.activity,
        Activity::ConfirmingSubmit {
            trigger: SubmitTrigger::FullscreenNotRestored
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_external_submission_releases_fullscreen_once() {
    let s = Sitting::activated(policy(3)).await;
    s.monitor.submit();
    s.until(|v| v.status == ExamStatus::Submitted).await;

    s.monitor.submit();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(s.platform.calls().exit_fullscreen, 1);
    assert_eq!(s.platform.calls().unsubscribe, 1);
    assert!(!s.platform.is_fullscreen());
    // End is the caller's job on external submission
    assert_eq!(s.server.calls().end_exam, 0);
}

#[tokio::test(start_paused = true)]
async fn test_staff_role_is_never_monitored() {
    let policy = policy(3);
    let s = Sitting::start(
        MemoryExamServer::new(policy.clone()),
        HeadlessPlatform::new(),
        policy,
        Role::Proctor,
    );
    s.monitor.activate();
    let view = s.until(|v| v.reason == ReasonCode::E001_BYPASSED).await;
    assert!(view.bypassed);
    assert_eq!(view.status, ExamStatus::NotStarted);
    assert_eq!(s.server.calls().start_exam, 0);
    assert_eq!(s.platform.calls().subscribe, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_detaches_platform() {
    let s = Sitting::activated(policy(3)).await;
    assert!(s.platform.is_subscribed());

    s.monitor.shutdown().await;
    assert!(!s.platform.is_subscribed());
    assert!(!s.platform.emit(HIDDEN));
    assert_eq!(s.monitor.view().reason, ReasonCode::E001_TORN_DOWN);
}
