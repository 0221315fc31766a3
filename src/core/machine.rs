//! Exam session state machine
//!
//! State transitions (status):
//! - NOT_STARTED → IN_PROGRESS: activation, exam mode on, not bypassed
//! - IN_PROGRESS → IN_PROGRESS: violation recorded, outcome not locked
//! - IN_PROGRESS → LOCKED: locking outcome acknowledged
//! - LOCKED → PAUSED: server reports unlock (poll or auto-unlock refresh)
//! - LOCKED/PAUSED → SUBMITTED: fullscreen exit, user confirms
//! - any → SUBMITTED: external submission
//!
//! `handle` is the only mutation entry point and performs no I/O; it
//! returns the effects the runtime must carry out.

use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::core::clock::SessionClock;
use crate::core::detector::{Detection, EventDetector};
use crate::core::fullscreen::FullscreenGuard;
use crate::core::report::ViolationReportController;
use crate::error::PlatformError;
use crate::types::{
    Activity, ContestPolicy, Effect, ExamSession, ExamStatus, Input, Moment, Notice,
    PlatformEvent, ReasonCode, ReportResult, Role, SessionView, SubmitTrigger, ViolationKind,
};

/// Lock reason shown when the server gives none
const DEFAULT_LOCK_REASON: &str = "Too many violations";

/// One monitored sitting
#[derive(Debug)]
pub struct ExamSessionStateMachine {
    contest_id: String,
    role: Role,
    policy: ContestPolicy,
    session: ExamSession,
    activity: Activity,
    bypassed: bool,
    subscribed: bool,
    torn_down: bool,
    notice: Option<Notice>,
    /// Trigger of the submission in flight, to re-prompt on failure
    submit_trigger: Option<SubmitTrigger>,
    reason: ReasonCode,
    detector: EventDetector,
    clock: SessionClock,
    reporter: ViolationReportController,
    guard: FullscreenGuard,
}

impl ExamSessionStateMachine {
    /// Create machine for one contest participation
    pub fn new(
        contest_id: impl Into<String>,
        role: Role,
        policy: ContestPolicy,
        config: &MonitorConfig,
    ) -> Self {
        let contest_id = contest_id.into();
        Self {
            reporter: ViolationReportController::new(contest_id.clone()),
            session: ExamSession::not_started(policy.max_cheat_warnings),
            detector: EventDetector::new(config, policy.ban_tab_switching),
            clock: SessionClock::new(config),
            guard: FullscreenGuard::default(),
            contest_id,
            role,
            policy,
            activity: Activity::Idle,
            bypassed: role.bypasses_monitoring(),
            subscribed: false,
            torn_down: false,
            notice: None,
            submit_trigger: None,
            reason: ReasonCode::E001_INITIAL,
        }
    }

    /// Apply one input, return the effects to perform
    pub fn handle(&mut self, input: Input, moment: Moment) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.torn_down {
            debug!(contest = %self.contest_id, ?input, "input after teardown dropped");
            return effects;
        }

        match input {
            Input::Platform(event) => self.on_platform(event, moment, &mut effects),
            Input::Activate => self.on_activate(&mut effects),
            Input::Restore {
                session,
                fullscreen_active,
            } => self.on_restore(session, fullscreen_active, moment, &mut effects),
            Input::ExamStarted(result) => self.on_exam_started(result, moment, &mut effects),
            Input::ReportCompleted {
                client_event_id,
                result,
            } => self.on_report_completed(&client_event_id, result),
            Input::NoticeDismissed => self.on_notice_dismissed(moment, &mut effects),
            Input::SubmitConfirmed => self.on_submit_confirmed(&mut effects),
            Input::SubmitCancelled => self.on_submit_cancelled(&mut effects),
            Input::SubmitCompleted(result) => self.on_submit_completed(result, &mut effects),
            Input::ExternalSubmission => {
                if self.session.status != ExamStatus::Submitted {
                    self.finalize_submission(&mut effects);
                }
            }
            Input::StatusRefreshed(result) => self.on_status_refreshed(result, moment, &mut effects),
            Input::Tick => self.on_tick(moment, &mut effects),
            Input::Teardown => self.teardown(&mut effects),
        }

        effects
    }

    // =========================================================================
    // Activation and restore
    // =========================================================================

    fn on_activate(&mut self, effects: &mut Vec<Effect>) {
        if self.session.status != ExamStatus::NotStarted || self.activity != Activity::Idle {
            debug!(contest = %self.contest_id, status = %self.session.status, "activation ignored");
            return;
        }
        if !self.policy.exam_mode_enabled {
            self.reason = ReasonCode::E001_EXAM_MODE_DISABLED;
            info!(contest = %self.contest_id, "exam mode disabled, not monitoring");
            return;
        }
        if self.bypassed {
            self.reason = ReasonCode::E001_BYPASSED;
            info!(contest = %self.contest_id, role = ?self.role, "monitoring bypassed");
            return;
        }
        self.activity = Activity::Starting;
        self.reason = ReasonCode::E001_STARTING;
        effects.push(Effect::StartExam);
    }

    fn on_exam_started(
        &mut self,
        result: Result<ExamSession, String>,
        moment: Moment,
        effects: &mut Vec<Effect>,
    ) {
        if self.activity != Activity::Starting {
            return;
        }
        self.activity = Activity::Idle;
        match result {
            Ok(session) => {
                let fullscreen = self.guard.is_active();
                self.attach(session, fullscreen, false, moment, effects);
            }
            Err(err) => {
                warn!(contest = %self.contest_id, error = %err, "startExam failed");
                self.reason = ReasonCode::E001_START_FAILED;
            }
        }
    }

    fn on_restore(
        &mut self,
        session: ExamSession,
        fullscreen_active: bool,
        moment: Moment,
        effects: &mut Vec<Effect>,
    ) {
        if self.subscribed || self.activity != Activity::Idle {
            debug!(contest = %self.contest_id, "restore ignored, session already attached");
            return;
        }
        self.attach(session, fullscreen_active, true, moment, effects);
        if !self.bypassed && self.reason != ReasonCode::E005_AWAITING_FULLSCREEN {
            self.reason = ReasonCode::E001_RESTORED;
        }
    }

    /// Adopt a server session and start watching if it is monitored
    fn attach(
        &mut self,
        session: ExamSession,
        fullscreen_active: bool,
        restoring: bool,
        moment: Moment,
        effects: &mut Vec<Effect>,
    ) {
        self.guard.observe(fullscreen_active);
        self.session = session;

        if self.session.is_bypassed || self.bypassed {
            self.bypassed = true;
            self.reason = ReasonCode::E001_BYPASSED;
            info!(contest = %self.contest_id, "server marked sitting bypassed");
            return;
        }
        if !self.session.status.is_monitored() {
            if self.session.status == ExamStatus::Submitted {
                self.reason = ReasonCode::E005_SUBMITTED;
            }
            return;
        }

        if !self.subscribed {
            self.subscribed = true;
            effects.push(Effect::Subscribe);
        }

        if restoring && !fullscreen_active {
            // Fullscreen cannot be requested without a user gesture after a
            // reload, so ask the user and wait
            if self.session.status.exit_means_submit() {
                let target = self.lock_countdown_target();
                self.clock.start_lock_timers(target, moment.at);
            }
            self.activity = Activity::RestoringFullscreen;
            self.notice = Some(Notice::RestoreFullscreen);
            self.clock.start_restore_wait(moment.at);
            self.reason = ReasonCode::E005_AWAITING_FULLSCREEN;
            info!(contest = %self.contest_id, status = %self.session.status, "waiting for fullscreen after reload");
            return;
        }

        match self.session.status {
            ExamStatus::InProgress => self.enter_in_progress(moment, effects),
            ExamStatus::Locked | ExamStatus::Paused => {
                let target = self.lock_countdown_target();
                self.clock.start_lock_timers(target, moment.at);
            }
            _ => {}
        }
    }

    fn enter_in_progress(&mut self, moment: Moment, effects: &mut Vec<Effect>) {
        self.session.status = ExamStatus::InProgress;
        self.session.is_locked = false;
        self.session.lock_reason = None;
        self.session.auto_unlock_at = None;
        self.clock.cancel_lock_timers();
        self.clock.start_grace(moment.at);
        self.activity = Activity::Grace;
        self.reason = ReasonCode::E001_ACTIVATED;
        if let Some(effect) = self.guard.on_activation() {
            effects.push(effect);
        }
        info!(contest = %self.contest_id, "exam in progress, grace period started");
    }

    // =========================================================================
    // Platform events
    // =========================================================================

    fn on_platform(&mut self, event: PlatformEvent, moment: Moment, effects: &mut Vec<Effect>) {
        if self.bypassed || !self.subscribed {
            return;
        }
        if let PlatformEvent::FullscreenChanged { active } = event {
            self.guard.observe(active);
        }

        match self.detector.observe(event, moment.at) {
            Detection::Candidate(ViolationKind::ExitFullscreen)
                if self.session.status.exit_means_submit() =>
            {
                self.prompt_submission(SubmitTrigger::FullscreenExited);
            }
            Detection::Candidate(kind) => self.try_report(kind, moment, moment, effects),
            Detection::FullscreenEntered => self.on_fullscreen_entered(moment, effects),
            Detection::Discarded(reason) => {
                debug!(contest = %self.contest_id, ?event, reason = reason.code(), "event discarded");
            }
            Detection::Deferred => {
                // Suppression is judged when focus went, not at the recheck
                if let Err(reason) = self.admit(moment.at) {
                    self.detector.cancel_pending();
                    debug!(contest = %self.contest_id, reason = reason.code(), "focus loss suppressed");
                }
            }
            Detection::BlurConfirmed { .. } | Detection::Quiet => {}
        }
    }

    fn on_fullscreen_entered(&mut self, moment: Moment, effects: &mut Vec<Effect>) {
        if self.activity != Activity::RestoringFullscreen {
            return;
        }
        self.clock.cancel_restore_wait();
        self.notice = None;
        self.activity = Activity::Idle;
        if self.session.status == ExamStatus::InProgress {
            self.enter_in_progress(moment, effects);
        }
        self.reason = ReasonCode::E005_FULLSCREEN_RESTORED;
    }

    /// Central suppression guard
    fn admit(&self, now: std::time::Instant) -> Result<(), ReasonCode> {
        match self.session.status {
            ExamStatus::InProgress => {}
            ExamStatus::Locked | ExamStatus::Paused => return Err(ReasonCode::E002_LOCKED_IGNORED),
            ExamStatus::NotStarted | ExamStatus::Submitted => return Err(ReasonCode::E001_INITIAL),
        }
        if self.activity == Activity::Grace || self.clock.in_grace(now) {
            return Err(ReasonCode::E002_GRACE_SUPPRESSED);
        }
        if self.activity != Activity::Idle || self.reporter.is_open() {
            return Err(ReasonCode::E002_BUSY_SUPPRESSED);
        }
        Ok(())
    }

    /// Open a report for `kind`, which happened at `occurred`
    fn try_report(
        &mut self,
        kind: ViolationKind,
        occurred: Moment,
        moment: Moment,
        effects: &mut Vec<Effect>,
    ) {
        if let Err(reason) = self.admit(moment.at) {
            debug!(contest = %self.contest_id, kind = %kind, reason = reason.code(), "violation suppressed");
            return;
        }
        let Some(event) = self.reporter.begin(kind, occurred) else {
            return;
        };
        info!(
            contest = %self.contest_id,
            kind = %kind,
            event_id = %event.client_event_id,
            "violation detected, reporting"
        );
        self.activity = Activity::Reporting { pending: true };
        self.notice = Some(Notice::Violation {
            kind,
            reason_text: event.reason_text.clone(),
            pending: true,
            result: None,
        });
        self.reason = ReasonCode::E003_REPORT_PENDING;
        effects.push(Effect::ReportViolation(event));
    }

    // =========================================================================
    // Report cycle
    // =========================================================================

    fn on_report_completed(&mut self, client_event_id: &str, result: ReportResult) {
        if !self.reporter.complete(client_event_id, result.clone()) {
            warn!(
                contest = %self.contest_id,
                event_id = %client_event_id,
                reason = ReasonCode::E003_REPORT_STALE.code(),
                "stale report answer dropped"
            );
            return;
        }

        match &result {
            ReportResult::Recorded(outcome) if outcome.bypass => {
                info!(contest = %self.contest_id, "server answered bypass, counters untouched");
            }
            ReportResult::Recorded(outcome) => {
                self.session.violation_count = outcome.violation_count;
                self.session.max_warnings = outcome.max_warnings;
                self.session.auto_unlock_at = outcome.auto_unlock_at;
            }
            ReportResult::Failed(failure) => {
                warn!(
                    contest = %self.contest_id,
                    kind = ?failure.kind,
                    message = %failure.message,
                    "report failed, failing open"
                );
            }
        }

        let kind = self
            .reporter
            .in_flight()
            .map(|e| e.kind)
            .unwrap_or(ViolationKind::TabHidden);
        self.activity = if result.locks() {
            Activity::LockedPendingAck
        } else {
            Activity::Reporting { pending: false }
        };
        self.reason = match result {
            ReportResult::Recorded(_) => ReasonCode::E003_REPORT_RECORDED,
            ReportResult::Failed(_) => ReasonCode::E003_REPORT_FAILED,
        };
        self.notice = Some(Notice::Violation {
            kind,
            reason_text: kind.reason_text().to_string(),
            pending: false,
            result: Some(result),
        });
    }

    fn on_notice_dismissed(&mut self, moment: Moment, effects: &mut Vec<Effect>) {
        match self.activity {
            Activity::Reporting { pending: true } => {
                debug!(contest = %self.contest_id, "dismiss ignored while report pending");
            }
            Activity::Reporting { pending: false } => {
                self.reporter.close();
                self.notice = None;
                self.activity = Activity::Idle;
                self.reason = ReasonCode::E003_RESUMED;
                effects.push(self.guard.reenter());
            }
            Activity::LockedPendingAck => {
                let result = self.reporter.close();
                self.notice = None;
                self.activity = Activity::Idle;
                let lock_reason = result
                    .as_ref()
                    .and_then(|r| r.outcome())
                    .and_then(|o| o.lock_reason.clone());
                self.apply_lock(lock_reason, moment);
            }
            _ => {
                if self.notice == Some(Notice::Unlocked) {
                    self.notice = None;
                }
            }
        }
    }

    fn apply_lock(&mut self, lock_reason: Option<String>, moment: Moment) {
        self.session.status = ExamStatus::Locked;
        self.session.is_locked = true;
        self.session.lock_reason = Some(lock_reason.unwrap_or_else(|| DEFAULT_LOCK_REASON.to_string()));
        self.clock.cancel_grace();
        let target = self.lock_countdown_target();
        self.clock.start_lock_timers(target, moment.at);
        self.reason = ReasonCode::E004_LOCKED;
        warn!(
            contest = %self.contest_id,
            count = self.session.violation_count,
            auto_unlock_at = ?self.session.auto_unlock_at,
            "exam locked"
        );
    }

    fn lock_countdown_target(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        if self.session.status == ExamStatus::Locked {
            self.session.auto_unlock_at
        } else {
            None
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    fn prompt_submission(&mut self, trigger: SubmitTrigger) {
        if matches!(
            self.activity,
            Activity::Submitting | Activity::ConfirmingSubmit { .. }
        ) {
            return;
        }
        self.activity = Activity::ConfirmingSubmit { trigger };
        self.notice = Some(Notice::ConfirmSubmission {
            trigger,
            error: None,
        });
        self.reason = ReasonCode::E005_SUBMIT_PROMPTED;
        info!(contest = %self.contest_id, ?trigger, "confirm submission prompted");
    }

    fn on_submit_confirmed(&mut self, effects: &mut Vec<Effect>) {
        let Activity::ConfirmingSubmit { trigger } = self.activity else {
            return;
        };
        self.submit_trigger = Some(trigger);
        self.activity = Activity::Submitting;
        self.notice = None;
        self.reason = ReasonCode::E005_SUBMITTING;
        effects.push(Effect::EndExam);
    }

    fn on_submit_cancelled(&mut self, effects: &mut Vec<Effect>) {
        if !matches!(self.activity, Activity::ConfirmingSubmit { .. }) {
            return;
        }
        self.activity = Activity::Idle;
        self.notice = None;
        self.reason = ReasonCode::E005_SUBMIT_CANCELLED;
        effects.push(self.guard.reenter());
    }

    fn on_submit_completed(&mut self, result: Result<ExamSession, String>, effects: &mut Vec<Effect>) {
        if self.activity != Activity::Submitting {
            return;
        }
        match result {
            Ok(_) => self.finalize_submission(effects),
            Err(err) => {
                warn!(contest = %self.contest_id, error = %err, "endExam failed");
                let trigger = self
                    .submit_trigger
                    .take()
                    .unwrap_or(SubmitTrigger::FullscreenExited);
                self.activity = Activity::ConfirmingSubmit { trigger };
                self.notice = Some(Notice::ConfirmSubmission {
                    trigger,
                    error: Some(err),
                });
                self.reason = ReasonCode::E005_SUBMIT_FAILED;
            }
        }
    }

    fn finalize_submission(&mut self, effects: &mut Vec<Effect>) {
        self.session.status = ExamStatus::Submitted;
        self.session.is_locked = false;
        self.session.auto_unlock_at = None;
        self.clock.cancel_all();
        self.detector.reset();
        self.reporter.close();
        self.notice = None;
        self.submit_trigger = None;
        self.activity = Activity::Idle;
        self.reason = ReasonCode::E005_SUBMITTED;
        if let Some(effect) = self.guard.release() {
            effects.push(effect);
        }
        if self.subscribed {
            self.subscribed = false;
            effects.push(Effect::Unsubscribe);
        }
        info!(contest = %self.contest_id, "exam submitted");
    }

    // =========================================================================
    // Server status
    // =========================================================================

    fn on_status_refreshed(
        &mut self,
        result: Result<ExamSession, String>,
        moment: Moment,
        effects: &mut Vec<Effect>,
    ) {
        let fresh = match result {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(contest = %self.contest_id, error = %err, "status refresh failed");
                return;
            }
        };
        if self.bypassed || !self.session.status.is_monitored() {
            return;
        }

        let previous = self.session.status;
        self.session.violation_count = fresh.violation_count;
        self.session.max_warnings = fresh.max_warnings;

        match (previous, fresh.status) {
            (_, ExamStatus::Submitted) => self.finalize_submission(effects),
            (ExamStatus::Locked, ExamStatus::Paused) => {
                self.session.status = ExamStatus::Paused;
                self.session.is_locked = false;
                self.session.lock_reason = None;
                self.session.auto_unlock_at = None;
                self.clock.set_auto_unlock(None, moment.at);
                if self.activity == Activity::Idle && self.notice.is_none() {
                    self.notice = Some(Notice::Unlocked);
                }
                self.reason = ReasonCode::E004_UNLOCKED;
                info!(contest = %self.contest_id, "exam unlocked");
            }
            (ExamStatus::Locked | ExamStatus::Paused, ExamStatus::InProgress) => {
                if matches!(self.activity, Activity::Submitting | Activity::ConfirmingSubmit { .. }) {
                    return;
                }
                self.notice = None;
                self.activity = Activity::Idle;
                self.clock.cancel_restore_wait();
                self.enter_in_progress(moment, effects);
                self.reason = ReasonCode::E004_RESUMED_BY_SERVER;
            }
            (ExamStatus::Locked, ExamStatus::Locked) => {
                self.session.lock_reason = fresh.lock_reason.or(self.session.lock_reason.take());
                self.session.auto_unlock_at = fresh.auto_unlock_at;
                self.clock.set_auto_unlock(fresh.auto_unlock_at, moment.at);
            }
            (ExamStatus::Paused, ExamStatus::Locked) => {
                self.session.auto_unlock_at = fresh.auto_unlock_at;
                self.apply_lock(fresh.lock_reason, moment);
            }
            _ => {}
        }
    }

    // =========================================================================
    // Timers
    // =========================================================================

    fn on_tick(&mut self, moment: Moment, effects: &mut Vec<Effect>) {
        let signals = self.clock.poll(moment);

        if signals.grace_ended && self.activity == Activity::Grace {
            self.activity = Activity::Idle;
            self.reason = ReasonCode::E002_GRACE_ENDED;
            debug!(contest = %self.contest_id, "grace period ended");
        }

        if !self.bypassed && self.subscribed {
            match self.detector.poll(moment.at) {
                Detection::BlurConfirmed { lost_at } => {
                    let occurred = moment.rewound_to(lost_at);
                    self.try_report(ViolationKind::WindowBlur, occurred, moment, effects);
                }
                Detection::Discarded(reason) => {
                    debug!(contest = %self.contest_id, reason = reason.code(), "focus recheck discarded");
                }
                _ => {}
            }
        }

        if signals.restore_expired && self.activity == Activity::RestoringFullscreen {
            self.notice = None;
            self.activity = Activity::Idle;
            self.prompt_submission(SubmitTrigger::FullscreenNotRestored);
        }

        if signals.unlock_due && self.session.status == ExamStatus::Locked {
            self.reason = ReasonCode::E004_AUTO_UNLOCK_DUE;
            info!(contest = %self.contest_id, "auto-unlock due, refreshing status");
            effects.push(Effect::RefreshStatus);
        } else if signals.poll_due && self.session.status.exit_means_submit() {
            debug!(contest = %self.contest_id, reason = ReasonCode::E004_STATUS_POLL.code(), "polling status");
            effects.push(Effect::RefreshStatus);
        }
    }

    fn teardown(&mut self, effects: &mut Vec<Effect>) {
        self.clock.cancel_all();
        self.detector.reset();
        self.reporter.close();
        if self.subscribed {
            self.subscribed = false;
            effects.push(Effect::Unsubscribe);
        }
        self.torn_down = true;
        self.reason = ReasonCode::E001_TORN_DOWN;
        debug!(contest = %self.contest_id, "monitor torn down");
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Platform refused a `RequestFullscreen`; the next transition retries
    pub fn fullscreen_request_failed(&self, err: &PlatformError) {
        self.guard.request_failed(err);
    }

    /// Earliest instant at which a `Tick` has work
    pub fn next_deadline(&self) -> Option<std::time::Instant> {
        if self.torn_down {
            return None;
        }
        [self.detector.next_deadline(), self.clock.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn status(&self) -> ExamStatus {
        self.session.status
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn session(&self) -> &ExamSession {
        &self.session
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn reason(&self) -> ReasonCode {
        self.reason
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn contest_id(&self) -> &str {
        &self.contest_id
    }

    /// Presentation snapshot at `moment`
    pub fn view(&self, moment: Moment) -> SessionView {
        SessionView {
            timestamp: moment.wall,
            contest_id: self.contest_id.clone(),
            status: self.session.status,
            activity: self.activity,
            violation_count: self.session.violation_count,
            max_warnings: self.session.max_warnings,
            lock_reason: self.session.lock_reason.clone(),
            auto_unlock_at: self.session.auto_unlock_at,
            countdown: if self.session.status == ExamStatus::Locked {
                self.clock.countdown_text(moment.wall)
            } else {
                None
            },
            notice: self.notice.clone(),
            bypassed: self.bypassed,
            reason: self.reason,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
