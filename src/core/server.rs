//! Exam server collaborator
//!
//! `ExamServer` is the contract; `HttpExamServer` talks to the judge
//! backend, `MemoryExamServer` stands in for it in replay and tests.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::types::{ContestPolicy, ExamSession, ExamStatus, ViolationEvent, ViolationKind, ViolationReportOutcome};

/// Server-side exam endpoints the monitor calls
#[async_trait]
pub trait ExamServer: Send + Sync {
    /// Move the sitting to in_progress
    async fn start_exam(&self, contest_id: &str) -> Result<ExamSession, ServerError>;

    /// Move the sitting to submitted; idempotent
    async fn end_exam(&self, contest_id: &str) -> Result<ExamSession, ServerError>;

    /// Current server view of the sitting
    async fn fetch_session(&self, contest_id: &str) -> Result<ExamSession, ServerError>;

    /// Record one violation; de-duplicates on `client_event_id`
    async fn record_violation(
        &self,
        contest_id: &str,
        event: &ViolationEvent,
    ) -> Result<ViolationReportOutcome, ServerError>;
}

// =============================================================================
// HTTP
// =============================================================================

/// Body of a violation report
#[derive(Debug, Serialize)]
struct ViolationRequest<'a> {
    client_event_id: &'a str,
    kind: ViolationKind,
    reason: &'a str,
    occurred_at: DateTime<Utc>,
}

/// JSON-over-HTTP client for the judge backend
#[derive(Debug, Clone)]
pub struct HttpExamServer {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpExamServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    fn url(&self, contest_id: &str, tail: &str) -> String {
        format!("{}/contests/{}/{}", self.base_url, contest_id, tail)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ServerError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServerError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ServerError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ServerError::Decode(e.to_string()))
    }

    /// Administrator action; surfaces to the participant as locked → paused
    pub async fn unlock_participant(&self, contest_id: &str, user_id: &str) -> Result<(), ServerError> {
        let url = self.url(contest_id, &format!("participants/{}/unlock", user_id));
        self.send(self.client.post(url)).await.map(|_| ())
    }
}

#[async_trait]
impl ExamServer for HttpExamServer {
    async fn start_exam(&self, contest_id: &str) -> Result<ExamSession, ServerError> {
        self.send_json(self.client.post(self.url(contest_id, "exam/start"))).await
    }

    async fn end_exam(&self, contest_id: &str) -> Result<ExamSession, ServerError> {
        self.send_json(self.client.post(self.url(contest_id, "exam/end"))).await
    }

    async fn fetch_session(&self, contest_id: &str) -> Result<ExamSession, ServerError> {
        self.send_json(self.client.get(self.url(contest_id, "exam"))).await
    }

    async fn record_violation(
        &self,
        contest_id: &str,
        event: &ViolationEvent,
    ) -> Result<ViolationReportOutcome, ServerError> {
        let body = ViolationRequest {
            client_event_id: &event.client_event_id,
            kind: event.kind,
            reason: &event.reason_text,
            occurred_at: event.occurred_at,
        };
        self.send_json(self.client.post(self.url(contest_id, "exam/violations")).json(&body))
            .await
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// How often each endpoint was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub start_exam: u32,
    pub end_exam: u32,
    pub fetch_session: u32,
    pub record_violation: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    session: ExamSession,
    seen_events: HashSet<String>,
    calls: CallCounts,
    fail_reports: u32,
    fail_ends: u32,
    hang_reports: bool,
}

/// In-process exam server with a lock-at-max-warnings rule
#[derive(Debug)]
pub struct MemoryExamServer {
    policy: ContestPolicy,
    state: Mutex<MemoryState>,
}

impl MemoryExamServer {
    pub fn new(policy: ContestPolicy) -> Self {
        let session = ExamSession::not_started(policy.max_cheat_warnings);
        Self::with_session(policy, session)
    }

    /// Start from an existing sitting (page reload scenarios)
    pub fn with_session(policy: ContestPolicy, session: ExamSession) -> Self {
        Self {
            policy,
            state: Mutex::new(MemoryState {
                session,
                ..MemoryState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn session(&self) -> ExamSession {
        self.state().session.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// Next `n` reports fail with a transport error
    pub fn fail_next_reports(&self, n: u32) {
        self.state().fail_reports = n;
    }

    /// Next `n` endExam calls fail with a transport error
    pub fn fail_next_ends(&self, n: u32) {
        self.state().fail_ends = n;
    }

    /// Reports never answer while set
    pub fn hang_reports(&self, hang: bool) {
        self.state().hang_reports = hang;
    }

    /// Administrator unlock: locked → paused
    pub fn unlock_participant(&self) {
        let mut state = self.state();
        if state.session.status == ExamStatus::Locked {
            unlock(&mut state.session);
        }
    }

    fn outcome(&self, session: &ExamSession) -> ViolationReportOutcome {
        ViolationReportOutcome {
            violation_count: session.violation_count,
            max_warnings: session.max_warnings,
            locked: session.is_locked,
            lock_reason: session.lock_reason.clone(),
            auto_unlock_at: session.auto_unlock_at,
            bypass: session.is_bypassed,
        }
    }
}

fn unlock(session: &mut ExamSession) {
    session.status = ExamStatus::Paused;
    session.is_locked = false;
    session.lock_reason = None;
    session.auto_unlock_at = None;
}

#[async_trait]
impl ExamServer for MemoryExamServer {
    async fn start_exam(&self, contest_id: &str) -> Result<ExamSession, ServerError> {
        let mut state = self.state();
        state.calls.start_exam += 1;
        if state.session.status == ExamStatus::NotStarted {
            state.session.status = ExamStatus::InProgress;
        }
        debug!(contest = contest_id, status = %state.session.status, "memory server: start");
        Ok(state.session.clone())
    }

    async fn end_exam(&self, contest_id: &str) -> Result<ExamSession, ServerError> {
        let mut state = self.state();
        state.calls.end_exam += 1;
        if state.fail_ends > 0 {
            state.fail_ends -= 1;
            return Err(ServerError::Transport("simulated network failure".into()));
        }
        state.session.status = ExamStatus::Submitted;
        state.session.is_locked = false;
        state.session.auto_unlock_at = None;
        debug!(contest = contest_id, "memory server: end");
        Ok(state.session.clone())
    }

    async fn fetch_session(&self, _contest_id: &str) -> Result<ExamSession, ServerError> {
        let mut state = self.state();
        state.calls.fetch_session += 1;
        let due = state.session.status == ExamStatus::Locked
            && matches!(state.session.auto_unlock_at, Some(at) if at <= Utc::now());
        if due {
            unlock(&mut state.session);
        }
        Ok(state.session.clone())
    }

    async fn record_violation(
        &self,
        contest_id: &str,
        event: &ViolationEvent,
    ) -> Result<ViolationReportOutcome, ServerError> {
        let hang = {
            let mut state = self.state();
            state.calls.record_violation += 1;
            state.hang_reports
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state();
        if state.fail_reports > 0 {
            state.fail_reports -= 1;
            return Err(ServerError::Transport("simulated network failure".into()));
        }
        if state.session.status != ExamStatus::InProgress {
            return Err(ServerError::Rejected {
                status: 409,
                message: format!("sitting is {}", state.session.status),
            });
        }
        if !state.seen_events.insert(event.client_event_id.clone()) {
            return Ok(self.outcome(&state.session));
        }

        state.session.violation_count += 1;
        if !state.session.is_bypassed && state.session.violation_count >= state.session.max_warnings {
            state.session.status = ExamStatus::Locked;
            state.session.is_locked = true;
            state.session.lock_reason = Some(format!(
                "Exceeded {} warnings ({})",
                state.session.max_warnings, event.kind
            ));
            state.session.auto_unlock_at = self
                .policy
                .allow_auto_unlock
                .then(|| Utc::now() + chrono::Duration::minutes(self.policy.auto_unlock_minutes as i64));
        }
        debug!(
            contest = contest_id,
            count = state.session.violation_count,
            locked = state.session.is_locked,
            "memory server: violation"
        );
        Ok(self.outcome(&state.session))
    }
}

// =============================================================================
// TESTS
// =============================================================================
