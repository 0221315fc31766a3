//! Session clock: grace window, auto-unlock countdown, lock status polling,
//! fullscreen-restore wait
//!
//! Timers are deadlines, not intervals. Cancelling one clears its field, so
//! a transition can never leave a second copy running.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::MonitorConfig;
use crate::types::Moment;
use crate::COUNTDOWN_TICK_MS;

/// Timer events that fell due in one `poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockSignals {
    pub grace_ended: bool,
    /// Countdown reached zero (fires at most once per `autoUnlockAt`)
    pub unlock_due: bool,
    pub poll_due: bool,
    pub restore_expired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countdown {
    unlock_at: DateTime<Utc>,
    next_tick: Option<Instant>,
    refresh_sent: bool,
}

/// Owns every timer of one session
#[derive(Debug)]
pub struct SessionClock {
    grace_period: Duration,
    poll_interval: Duration,
    restore_wait: Duration,
    grace_until: Option<Instant>,
    countdown: Option<Countdown>,
    next_poll: Option<Instant>,
    restore_deadline: Option<Instant>,
}

impl SessionClock {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
            poll_interval: config.status_poll_interval(),
            restore_wait: config.fullscreen_restore_wait(),
            grace_until: None,
            countdown: None,
            next_poll: None,
            restore_deadline: None,
        }
    }

    // -------------------------------------------------------------------------
    // Grace
    // -------------------------------------------------------------------------

    pub fn start_grace(&mut self, now: Instant) {
        self.grace_until = Some(now + self.grace_period);
    }

    pub fn in_grace(&self, now: Instant) -> bool {
        self.grace_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn cancel_grace(&mut self) {
        self.grace_until = None;
    }

    // -------------------------------------------------------------------------
    // Lock timers
    // -------------------------------------------------------------------------

    /// Start (or restart) polling and, when the server gave one, the
    /// countdown to `auto_unlock_at`
    pub fn start_lock_timers(&mut self, auto_unlock_at: Option<DateTime<Utc>>, now: Instant) {
        self.next_poll = Some(now + self.poll_interval);
        self.set_auto_unlock(auto_unlock_at, now);
    }

    /// Keep polling, replace the countdown target if it changed
    pub fn set_auto_unlock(&mut self, auto_unlock_at: Option<DateTime<Utc>>, now: Instant) {
        let unchanged = match (&self.countdown, auto_unlock_at) {
            (Some(c), Some(at)) => c.unlock_at == at,
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }
        self.countdown = auto_unlock_at.map(|unlock_at| Countdown {
            unlock_at,
            next_tick: Some(now + Duration::from_millis(COUNTDOWN_TICK_MS)),
            refresh_sent: false,
        });
    }

    pub fn cancel_lock_timers(&mut self) {
        self.countdown = None;
        self.next_poll = None;
    }

    /// Time left until auto-unlock, clamped at zero
    pub fn remaining(&self, wall: DateTime<Utc>) -> Option<chrono::Duration> {
        self.countdown
            .map(|c| (c.unlock_at - wall).max(chrono::Duration::zero()))
    }

    /// Time left as HH:MM:SS
    pub fn countdown_text(&self, wall: DateTime<Utc>) -> Option<String> {
        self.remaining(wall).map(format_hms)
    }

    // -------------------------------------------------------------------------
    // Fullscreen restore
    // -------------------------------------------------------------------------

    pub fn start_restore_wait(&mut self, now: Instant) {
        self.restore_deadline = Some(now + self.restore_wait);
    }

    pub fn cancel_restore_wait(&mut self) {
        self.restore_deadline = None;
    }

    // -------------------------------------------------------------------------
    // Driving
    // -------------------------------------------------------------------------

    /// Fire whatever is due at `moment`
    pub fn poll(&mut self, moment: Moment) -> ClockSignals {
        let mut signals = ClockSignals::default();
        let now = moment.at;

        if matches!(self.grace_until, Some(until) if until <= now) {
            self.grace_until = None;
            signals.grace_ended = true;
        }

        if matches!(self.restore_deadline, Some(deadline) if deadline <= now) {
            self.restore_deadline = None;
            signals.restore_expired = true;
        }

        if let Some(next) = self.next_poll {
            if next <= now {
                self.next_poll = Some(now + self.poll_interval);
                signals.poll_due = true;
            }
        }

        if let Some(countdown) = self.countdown.as_mut() {
            if !countdown.refresh_sent && countdown.unlock_at <= moment.wall {
                countdown.refresh_sent = true;
                countdown.next_tick = None;
                signals.unlock_due = true;
            } else if matches!(countdown.next_tick, Some(tick) if tick <= now) {
                countdown.next_tick = Some(now + Duration::from_millis(COUNTDOWN_TICK_MS));
            }
        }

        signals
    }

    /// Earliest instant at which `poll` has work
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.grace_until,
            self.restore_deadline,
            self.next_poll,
            self.countdown.and_then(|c| c.next_tick),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn cancel_all(&mut self) {
        self.grace_until = None;
        self.restore_deadline = None;
        self.cancel_lock_timers();
    }
}

/// Format a non-negative duration as HH:MM:SS
pub fn format_hms(d: chrono::Duration) -> String {
    let total = d.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> SessionClock {
        SessionClock::new(&MonitorConfig::default())
    }

    #[test]
    fn test_grace_window() {
        let mut c = clock();
        let m = Moment::now();
        c.start_grace(m.at);
        assert!(c.in_grace(m.at));
        assert!(c.in_grace(m.at + Duration::from_millis(2999)));
        assert!(!c.in_grace(m.at + Duration::from_millis(3000)));

        assert!(!c.poll(m.after(Duration::from_millis(2999))).grace_ended);
        assert!(c.poll(m.after(Duration::from_secs(3))).grace_ended);
        // Self-clears
        assert!(!c.poll(m.after(Duration::from_secs(4))).grace_ended);
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(chrono::Duration::seconds(0)), "00:00:00");
        assert_eq!(format_hms(chrono::Duration::seconds(299)), "00:04:59");
        assert_eq!(format_hms(chrono::Duration::seconds(3 * 3600 + 61)), "03:01:01");
        assert_eq!(format_hms(chrono::Duration::seconds(-5)), "00:00:00");
    }

    #[test]
    fn test_countdown_non_increasing_and_fires_once() {
        let mut c = clock();
        let m = Moment::now();
        let unlock_at = m.wall + chrono::Duration::seconds(3);
        c.start_lock_timers(Some(unlock_at), m.at);

        let mut last = c.remaining(m.wall).unwrap();
        let mut fired = 0;
        for step in 1..=10 {
            let t = m.after(Duration::from_millis(500 * step));
            let remaining = c.remaining(t.wall).unwrap();
            assert!(remaining <= last);
            last = remaining;
            if c.poll(t).unlock_due {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(c.countdown_text(m.after(Duration::from_secs(10)).wall).unwrap(), "00:00:00");
    }

    #[test]
    fn test_same_unlock_at_does_not_rearm() {
        let mut c = clock();
        let m = Moment::now();
        let unlock_at = m.wall + chrono::Duration::seconds(1);
        c.start_lock_timers(Some(unlock_at), m.at);
        let later = m.after(Duration::from_secs(2));
        assert!(c.poll(later).unlock_due);

        // Server still says the same instant: no second refresh
        c.set_auto_unlock(Some(unlock_at), later.at);
        assert!(!c.poll(later.after(Duration::from_secs(1))).unlock_due);

        // A new instant re-arms
        c.set_auto_unlock(Some(later.wall + chrono::Duration::seconds(1)), later.at);
        assert!(c.poll(later.after(Duration::from_secs(2))).unlock_due);
    }

    #[test]
    fn test_status_poll_repeats() {
        let mut c = clock();
        let m = Moment::now();
        c.start_lock_timers(None, m.at);
        assert!(!c.poll(m.after(Duration::from_secs(14))).poll_due);
        assert!(c.poll(m.after(Duration::from_secs(15))).poll_due);
        assert!(!c.poll(m.after(Duration::from_secs(16))).poll_due);
        assert!(c.poll(m.after(Duration::from_secs(30))).poll_due);

        c.cancel_lock_timers();
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn test_cancel_all_clears_every_deadline() {
        let mut c = clock();
        let m = Moment::now();
        c.start_grace(m.at);
        c.start_restore_wait(m.at);
        c.start_lock_timers(Some(m.wall + chrono::Duration::minutes(5)), m.at);
        assert!(c.next_deadline().is_some());
        c.cancel_all();
        assert_eq!(c.next_deadline(), None);
        assert_eq!(c.poll(m.after(Duration::from_secs(600))), ClockSignals::default());
    }
}
