//! Event detector: raw platform notifications → violation candidates
//!
//! Rules:
//! - visibility hidden → candidate immediately
//! - fullscreen exit → candidate immediately (the state machine decides
//!   whether it is a violation or a submission prompt)
//! - focus loss ≤ debounce after a pointer interaction → discarded
//! - other focus loss → re-checked after a short delay, discarded if focus
//!   came back in between
//!
//! The detector never decides whether the session may report; that guard
//! lives in the state machine so suppression is in one place.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::MonitorConfig;
use crate::types::{PlatformEvent, ReasonCode, ViolationKind};

/// What one platform notification amounts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Nothing to act on
    Quiet,
    /// Dropped by the detector's own filters
    Discarded(ReasonCode),
    /// Focus loss waiting for its recheck
    Deferred,
    /// Candidate for the state machine's guard
    Candidate(ViolationKind),
    /// Focus still gone at recheck; `lost_at` is when it went
    BlurConfirmed { lost_at: Instant },
    /// Fullscreen became active
    FullscreenEntered,
}

/// Focus loss waiting to be confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingBlur {
    lost_at: Instant,
    recheck_at: Instant,
}

/// Classifies platform notifications, one candidate per physical action
#[derive(Debug)]
pub struct EventDetector {
    debounce: Duration,
    recheck_delay: Duration,
    ban_tab_switching: bool,
    /// Last pointer-down / click
    last_interaction: Option<Instant>,
    has_focus: bool,
    pending_blur: Option<PendingBlur>,
}

impl EventDetector {
    /// Create new detector
    pub fn new(config: &MonitorConfig, ban_tab_switching: bool) -> Self {
        Self {
            debounce: config.interaction_debounce(),
            recheck_delay: config.focus_recheck(),
            ban_tab_switching,
            last_interaction: None,
            has_focus: true,
            pending_blur: None,
        }
    }

    /// Classify one notification
    pub fn observe(&mut self, event: PlatformEvent, now: Instant) -> Detection {
        match event {
            PlatformEvent::Interaction => {
                self.last_interaction = Some(now);
                Detection::Quiet
            }
            PlatformEvent::FocusGained => {
                self.has_focus = true;
                if self.pending_blur.take().is_some() {
                    debug!("focus returned before recheck");
                    Detection::Discarded(ReasonCode::E002_FOCUS_RETURNED)
                } else {
                    Detection::Quiet
                }
            }
            PlatformEvent::FocusLost => {
                self.has_focus = false;
                if !self.ban_tab_switching {
                    return Detection::Discarded(ReasonCode::E002_TAB_SWITCH_ALLOWED);
                }
                if self.within_debounce(now) {
                    debug!("focus loss right after interaction, ignoring");
                    return Detection::Discarded(ReasonCode::E002_INTERACTION_DEBOUNCED);
                }
                self.pending_blur = Some(PendingBlur {
                    lost_at: now,
                    recheck_at: now + self.recheck_delay,
                });
                Detection::Deferred
            }
            PlatformEvent::VisibilityChanged { hidden: true } => {
                // A hidden page also blurs; the visibility signal wins
                self.pending_blur = None;
                if !self.ban_tab_switching {
                    return Detection::Discarded(ReasonCode::E002_TAB_SWITCH_ALLOWED);
                }
                Detection::Candidate(ViolationKind::TabHidden)
            }
            PlatformEvent::VisibilityChanged { hidden: false } => Detection::Quiet,
            PlatformEvent::FullscreenChanged { active: false } => {
                Detection::Candidate(ViolationKind::ExitFullscreen)
            }
            PlatformEvent::FullscreenChanged { active: true } => Detection::FullscreenEntered,
        }
    }

    /// Resolve a due focus recheck
    pub fn poll(&mut self, now: Instant) -> Detection {
        match self.pending_blur {
            Some(pending) if pending.recheck_at <= now => {
                self.pending_blur = None;
                if self.has_focus {
                    Detection::Discarded(ReasonCode::E002_FOCUS_RETURNED)
                } else {
                    Detection::BlurConfirmed {
                        lost_at: pending.lost_at,
                    }
                }
            }
            _ => Detection::Quiet,
        }
    }

    /// When `poll` next has something to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_blur.map(|p| p.recheck_at)
    }

    /// Drop a deferred focus loss the caller will not report
    pub fn cancel_pending(&mut self) {
        self.pending_blur = None;
    }

    fn within_debounce(&self, now: Instant) -> bool {
        self.last_interaction
            .map(|at| now.saturating_duration_since(at) <= self.debounce)
            .unwrap_or(false)
    }

    /// Forget pending work; interaction history is per session
    pub fn reset(&mut self) {
        self.last_interaction = None;
        self.pending_blur = None;
        self.has_focus = true;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> EventDetector {
        EventDetector::new(&MonitorConfig::default(), true)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_hidden_is_immediate_candidate() {
        let mut d = detector();
        let t0 = Instant::now();
        // Interaction does not debounce visibility
        d.observe(PlatformEvent::Interaction, t0);
        let out = d.observe(PlatformEvent::VisibilityChanged { hidden: true }, t0 + ms(10));
        assert_eq!(out, Detection::Candidate(ViolationKind::TabHidden));
    }

    #[test]
    fn test_blur_within_debounce_discarded() {
        let mut d = detector();
        let t0 = Instant::now();
        d.observe(PlatformEvent::Interaction, t0);
        let out = d.observe(PlatformEvent::FocusLost, t0 + ms(500));
        assert_eq!(out, Detection::Discarded(ReasonCode::E002_INTERACTION_DEBOUNCED));
        assert_eq!(d.next_deadline(), None);
    }

    #[test]
    fn test_blur_after_debounce_reported_after_recheck() {
        let mut d = detector();
        let t0 = Instant::now();
        d.observe(PlatformEvent::Interaction, t0);
        let lost_at = t0 + ms(501);
        assert_eq!(d.observe(PlatformEvent::FocusLost, lost_at), Detection::Deferred);
        assert_eq!(d.next_deadline(), Some(lost_at + ms(50)));

        // Too early
        assert_eq!(d.poll(lost_at + ms(49)), Detection::Quiet);
        assert_eq!(d.poll(lost_at + ms(50)), Detection::BlurConfirmed { lost_at });
        assert_eq!(d.next_deadline(), None);
    }

    #[test]
    fn test_cancelled_blur_never_confirms() {
        let mut d = detector();
        let t0 = Instant::now();
        assert_eq!(d.observe(PlatformEvent::FocusLost, t0), Detection::Deferred);
        d.cancel_pending();
        assert_eq!(d.next_deadline(), None);
        // Focus still gone, but nothing left to confirm
        assert_eq!(d.poll(t0 + ms(100)), Detection::Quiet);
    }

    #[test]
    fn test_blur_blip_discarded() {
        let mut d = detector();
        let t0 = Instant::now();
        assert_eq!(d.observe(PlatformEvent::FocusLost, t0), Detection::Deferred);
        let out = d.observe(PlatformEvent::FocusGained, t0 + ms(20));
        assert_eq!(out, Detection::Discarded(ReasonCode::E002_FOCUS_RETURNED));
        assert_eq!(d.poll(t0 + ms(100)), Detection::Quiet);
    }

    #[test]
    fn test_hidden_cancels_pending_blur() {
        let mut d = detector();
        let t0 = Instant::now();
        d.observe(PlatformEvent::FocusLost, t0);
        let out = d.observe(PlatformEvent::VisibilityChanged { hidden: true }, t0 + ms(5));
        assert_eq!(out, Detection::Candidate(ViolationKind::TabHidden));
        assert_eq!(d.poll(t0 + ms(100)), Detection::Quiet);
    }

    #[test]
    fn test_tab_switch_allowed_by_policy() {
        let mut d = EventDetector::new(&MonitorConfig::default(), false);
        let t0 = Instant::now();
        assert_eq!(
            d.observe(PlatformEvent::VisibilityChanged { hidden: true }, t0),
            Detection::Discarded(ReasonCode::E002_TAB_SWITCH_ALLOWED)
        );
        assert_eq!(
            d.observe(PlatformEvent::FocusLost, t0),
            Detection::Discarded(ReasonCode::E002_TAB_SWITCH_ALLOWED)
        );
        // Fullscreen is still enforced
        assert_eq!(
            d.observe(PlatformEvent::FullscreenChanged { active: false }, t0),
            Detection::Candidate(ViolationKind::ExitFullscreen)
        );
    }
}
