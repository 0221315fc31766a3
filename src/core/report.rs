//! Violation report controller: the blocking report cycle
//!
//! Cycle: begin (notice up, pending) → one request → complete (pending off)
//! → dismissal. Only one event is ever in flight; `begin` refuses a second.
//!
//! KEY INVARIANT: a failed or timed-out request never produces an outcome
//! with a count in it, so a dropped request cannot raise the count.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::core::server::ExamServer;
use crate::error::ServerError;
use crate::types::{
    Moment, ReportFailure, ReportFailureKind, ReportResult, ViolationEvent, ViolationKind,
};

/// Tracks the one report cycle a session may have open
#[derive(Debug)]
pub struct ViolationReportController {
    contest_id: String,
    /// Monotonic counter feeding the client event id
    seq: u64,
    in_flight: Option<ViolationEvent>,
    /// Result of the cycle awaiting dismissal
    result: Option<ReportResult>,
}

impl ViolationReportController {
    pub fn new(contest_id: impl Into<String>) -> Self {
        Self {
            contest_id: contest_id.into(),
            seq: 0,
            in_flight: None,
            result: None,
        }
    }

    /// Open a cycle for `kind`; `None` if one is already open
    pub fn begin(&mut self, kind: ViolationKind, moment: Moment) -> Option<ViolationEvent> {
        if self.is_open() {
            return None;
        }
        self.seq += 1;
        let event = ViolationEvent {
            client_event_id: client_event_id(&self.contest_id, self.seq, moment),
            kind,
            occurred_at: moment.wall,
            reason_text: kind.reason_text().to_string(),
        };
        self.in_flight = Some(event.clone());
        Some(event)
    }

    /// Store the answer for the in-flight event. Returns `false` for an
    /// answer that does not belong to it.
    pub fn complete(&mut self, client_event_id: &str, result: ReportResult) -> bool {
        let matches = self
            .in_flight
            .as_ref()
            .map(|e| e.client_event_id == client_event_id)
            .unwrap_or(false);
        if !matches || self.result.is_some() {
            return false;
        }
        self.result = Some(result);
        true
    }

    /// Request sent, no answer yet
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some() && self.result.is_none()
    }

    /// A cycle is open (pending or awaiting dismissal)
    pub fn is_open(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&ViolationEvent> {
        self.in_flight.as_ref()
    }

    /// Close the cycle, returning its result
    pub fn close(&mut self) -> Option<ReportResult> {
        self.in_flight = None;
        self.result.take()
    }
}

/// Id the server can use to de-duplicate retried reports
fn client_event_id(contest_id: &str, seq: u64, moment: Moment) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contest_id.as_bytes());
    hasher.update(seq.to_be_bytes());
    hasher.update(moment.wall.timestamp_micros().to_be_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    digest[0..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Issue one report, bounded by `timeout`. Always resolves.
pub async fn send_report(
    server: Arc<dyn ExamServer>,
    contest_id: String,
    event: ViolationEvent,
    timeout: Duration,
) -> ReportResult {
    match tokio::time::timeout(timeout, server.record_violation(&contest_id, &event)).await {
        Ok(Ok(outcome)) => {
            info!(
                event_id = %event.client_event_id,
                kind = %event.kind,
                count = outcome.violation_count,
                max = outcome.max_warnings,
                locked = outcome.locked,
                "violation recorded"
            );
            ReportResult::Recorded(outcome)
        }
        Ok(Err(err)) => {
            warn!(event_id = %event.client_event_id, error = %err, "violation report failed");
            ReportResult::Failed(failure_from(&err))
        }
        Err(_) => {
            warn!(
                event_id = %event.client_event_id,
                timeout_ms = timeout.as_millis() as u64,
                "violation report timed out"
            );
            ReportResult::Failed(ReportFailure {
                kind: ReportFailureKind::TimedOut,
                message: format!("no answer within {}s", timeout.as_secs_f64()),
            })
        }
    }
}

fn failure_from(err: &ServerError) -> ReportFailure {
    let kind = match err {
        ServerError::Rejected { .. } => ReportFailureKind::Rejected,
        ServerError::Transport(_) | ServerError::Decode(_) => ReportFailureKind::Transport,
    };
    ReportFailure {
        kind,
        message: err.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::server::MemoryExamServer;
    use crate::types::{ContestPolicy, ViolationReportOutcome};

    fn recorded(count: u32) -> ReportResult {
        ReportResult::Recorded(ViolationReportOutcome {
            violation_count: count,
            max_warnings: 3,
            locked: false,
            lock_reason: None,
            auto_unlock_at: None,
            bypass: false,
        })
    }

    #[test]
    fn test_only_one_cycle_open() {
        let mut c = ViolationReportController::new("c1");
        let m = Moment::now();
        let first = c.begin(ViolationKind::TabHidden, m).unwrap();
        assert!(c.is_pending());
        assert!(c.begin(ViolationKind::WindowBlur, m).is_none());

        assert!(c.complete(&first.client_event_id, recorded(1)));
        assert!(!c.is_pending());
        assert!(c.is_open());
        // Still open until dismissed
        assert!(c.begin(ViolationKind::WindowBlur, m).is_none());

        assert_eq!(c.close(), Some(recorded(1)));
        assert!(c.begin(ViolationKind::WindowBlur, m).is_some());
    }

    #[test]
    fn test_stale_answer_rejected() {
        let mut c = ViolationReportController::new("c1");
        let m = Moment::now();
        c.begin(ViolationKind::TabHidden, m).unwrap();
        assert!(!c.complete("not-this-one", recorded(1)));
        assert!(c.is_pending());
    }

    #[test]
    fn test_event_ids_are_distinct() {
        let mut c = ViolationReportController::new("c1");
        let m = Moment::now();
        let a = c.begin(ViolationKind::TabHidden, m).unwrap();
        c.close();
        let b = c.begin(ViolationKind::TabHidden, m).unwrap();
        assert_ne!(a.client_event_id, b.client_event_id);
        assert_eq!(a.client_event_id.len(), 16);
        assert_eq!(a.reason_text, "Switched away from the exam tab");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_report_times_out() {
        let server = Arc::new(MemoryExamServer::new(ContestPolicy::default()));
        server.hang_reports(true);
        let mut c = ViolationReportController::new("c1");
        let event = c.begin(ViolationKind::TabHidden, Moment::now()).unwrap();

        let result = send_report(server.clone(), "c1".into(), event, Duration::from_secs(10)).await;
        match result {
            ReportResult::Failed(f) => assert_eq!(f.kind, ReportFailureKind::TimedOut),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_fails_open() {
        let server = Arc::new(MemoryExamServer::new(ContestPolicy::default()));
        server.fail_next_reports(1);
        let mut c = ViolationReportController::new("c1");
        let event = c.begin(ViolationKind::TabHidden, Moment::now()).unwrap();

        let result = send_report(server.clone(), "c1".into(), event, Duration::from_secs(10)).await;
        assert!(!result.locks());
        assert!(matches!(
            result,
            ReportResult::Failed(ReportFailure { kind: ReportFailureKind::Transport, .. })
        ));
        assert_eq!(server.session().violation_count, 0);
    }
}
