//! Fullscreen guard: keeps the exam surface fullscreen while monitored
//!
//! Fullscreen is requested on activation and after every non-locking
//! report cycle, and released only on submission, exactly once.

use tracing::{debug, warn};

use crate::error::PlatformError;
use crate::types::Effect;

#[derive(Debug, Default)]
pub struct FullscreenGuard {
    /// Last fullscreen state the platform reported
    active: bool,
    released: bool,
}

impl FullscreenGuard {
    pub fn new(active: bool) -> Self {
        Self {
            active,
            released: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Record a platform fullscreen change
    pub fn observe(&mut self, active: bool) {
        self.active = active;
    }

    /// On entering in_progress: request only if not already fullscreen
    pub fn on_activation(&self) -> Option<Effect> {
        if self.active {
            None
        } else {
            Some(Effect::RequestFullscreen)
        }
    }

    /// Mandatory re-entry after a violation notice or a cancelled submission
    pub fn reenter(&self) -> Effect {
        Effect::RequestFullscreen
    }

    /// On submission; `None` after the first call or when not fullscreen
    pub fn release(&mut self) -> Option<Effect> {
        if self.released || !self.active {
            return None;
        }
        self.released = true;
        Some(Effect::ExitFullscreen)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Platform refused; not a violation, the next transition retries
    pub fn request_failed(&self, err: &PlatformError) {
        match err {
            PlatformError::FullscreenDenied(_) => warn!(error = %err, "fullscreen request denied"),
            PlatformError::Unavailable => debug!("no platform attached for fullscreen request"),
        }
    }
}
