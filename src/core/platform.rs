//! Platform boundary: where raw focus/visibility/fullscreen events come
//! from and where fullscreen commands go

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::error::PlatformError;
use crate::types::{Input, PlatformEvent};

/// Forwards platform events into a monitor queue
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Input>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { tx }
    }

    /// `false` once the monitor has stopped
    pub fn send(&self, event: PlatformEvent) -> bool {
        self.tx.send(Input::Platform(event)).is_ok()
    }
}

/// Host of the exam surface
pub trait Platform: Send + Sync {
    /// Start delivering events to `sink`; replaces any previous sink
    fn subscribe(&self, sink: EventSink);

    fn unsubscribe(&self);

    fn request_fullscreen(&self) -> Result<(), PlatformError>;

    fn exit_fullscreen(&self);

    fn is_fullscreen(&self) -> bool;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// HEADLESS
// =============================================================================

/// Calls made on a `HeadlessPlatform`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformCalls {
    pub subscribe: u32,
    pub unsubscribe: u32,
    pub request_fullscreen: u32,
    pub exit_fullscreen: u32,
}

#[derive(Debug, Default)]
struct HeadlessState {
    sink: Option<EventSink>,
    fullscreen: bool,
    deny_fullscreen: bool,
    calls: PlatformCalls,
}

/// In-memory platform. Fullscreen changes it makes are echoed back as
/// `fullscreen_changed` events, the way a browser reports them.
#[derive(Debug, Default)]
pub struct HeadlessPlatform {
    state: Mutex<HeadlessState>,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform that starts out fullscreen (reload while fullscreen)
    pub fn fullscreen() -> Self {
        let platform = Self::default();
        lock(&platform.state).fullscreen = true;
        platform
    }

    /// Refuse fullscreen requests, as without a user gesture
    pub fn deny_fullscreen(&self, deny: bool) {
        lock(&self.state).deny_fullscreen = deny;
    }

    /// Simulate a user or browser event. Returns whether it was delivered.
    pub fn emit(&self, event: PlatformEvent) -> bool {
        let mut state = lock(&self.state);
        if let PlatformEvent::FullscreenChanged { active } = event {
            state.fullscreen = active;
        }
        match &state.sink {
            Some(sink) => sink.send(event),
            None => false,
        }
    }

    pub fn calls(&self) -> PlatformCalls {
        lock(&self.state).calls
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.state).sink.is_some()
    }

    fn set_fullscreen(state: &mut HeadlessState, active: bool) {
        if state.fullscreen == active {
            return;
        }
        state.fullscreen = active;
        if let Some(sink) = &state.sink {
            sink.send(PlatformEvent::FullscreenChanged { active });
        }
    }
}

impl Platform for HeadlessPlatform {
    fn subscribe(&self, sink: EventSink) {
        let mut state = lock(&self.state);
        state.calls.subscribe += 1;
        state.sink = Some(sink);
    }

    fn unsubscribe(&self) {
        let mut state = lock(&self.state);
        state.calls.unsubscribe += 1;
        state.sink = None;
    }

    fn request_fullscreen(&self) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        state.calls.request_fullscreen += 1;
        if state.deny_fullscreen {
            return Err(PlatformError::FullscreenDenied("no user gesture".into()));
        }
        Self::set_fullscreen(&mut state, true);
        Ok(())
    }

    fn exit_fullscreen(&self) {
        let mut state = lock(&self.state);
        state.calls.exit_fullscreen += 1;
        Self::set_fullscreen(&mut state, false);
    }

    fn is_fullscreen(&self) -> bool {
        lock(&self.state).fullscreen
    }
}

// =============================================================================
// SHELL
// =============================================================================

/// Command pushed to a connected browser shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum ShellCommand {
    Subscribe,
    Unsubscribe,
    RequestFullscreen,
    ExitFullscreen,
}

#[derive(Debug, Default)]
struct ShellState {
    sink: Option<EventSink>,
    fullscreen: bool,
}

/// Platform backed by a browser shell connected over the bridge
#[derive(Debug)]
pub struct ShellPlatform {
    commands: broadcast::Sender<ShellCommand>,
    state: Mutex<ShellState>,
}

impl Default for ShellPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellPlatform {
    pub fn new() -> Self {
        let (commands, _) = broadcast::channel(64);
        Self {
            commands,
            state: Mutex::new(ShellState::default()),
        }
    }

    /// Commands for one connected shell
    pub fn commands(&self) -> broadcast::Receiver<ShellCommand> {
        self.commands.subscribe()
    }

    /// Event posted by the shell. Fullscreen state is always tracked; the
    /// event reaches the monitor only while subscribed.
    pub fn post(&self, event: PlatformEvent) -> bool {
        let mut state = lock(&self.state);
        if let PlatformEvent::FullscreenChanged { active } = event {
            state.fullscreen = active;
        }
        match &state.sink {
            Some(sink) => sink.send(event),
            None => {
                debug!(?event, "shell event while unsubscribed dropped");
                false
            }
        }
    }

    fn push(&self, command: ShellCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

impl Platform for ShellPlatform {
    fn subscribe(&self, sink: EventSink) {
        lock(&self.state).sink = Some(sink);
        self.push(ShellCommand::Subscribe);
    }

    fn unsubscribe(&self) {
        lock(&self.state).sink = None;
        self.push(ShellCommand::Unsubscribe);
    }

    fn request_fullscreen(&self) -> Result<(), PlatformError> {
        if self.push(ShellCommand::RequestFullscreen) {
            Ok(())
        } else {
            Err(PlatformError::Unavailable)
        }
    }

    fn exit_fullscreen(&self) {
        self.push(ShellCommand::ExitFullscreen);
    }

    fn is_fullscreen(&self) -> bool {
        lock(&self.state).fullscreen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_echoes_fullscreen_changes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let platform = HeadlessPlatform::new();
        platform.subscribe(EventSink::new(tx));

        platform.request_fullscreen().unwrap();
        assert!(platform.is_fullscreen());
        assert_eq!(
            rx.try_recv().unwrap(),
            Input::Platform(PlatformEvent::FullscreenChanged { active: true })
        );

        // Already fullscreen: no second event
        platform.request_fullscreen().unwrap();
        assert!(rx.try_recv().is_err());

        platform.exit_fullscreen();
        assert_eq!(
            rx.try_recv().unwrap(),
            Input::Platform(PlatformEvent::FullscreenChanged { active: false })
        );
        assert_eq!(platform.calls().request_fullscreen, 2);
    }

    #[test]
    fn test_headless_denied_fullscreen() {
        let platform = HeadlessPlatform::new();
        platform.deny_fullscreen(true);
        assert!(matches!(
            platform.request_fullscreen(),
            Err(PlatformError::FullscreenDenied(_))
        ));
        assert!(!platform.is_fullscreen());
    }

    #[test]
    fn test_shell_forwards_only_while_subscribed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shell = ShellPlatform::new();
        assert!(!shell.post(PlatformEvent::FocusLost));

        shell.subscribe(EventSink::new(tx));
        assert!(shell.post(PlatformEvent::FullscreenChanged { active: true }));
        assert!(shell.is_fullscreen());
        assert!(rx.try_recv().is_ok());

        shell.unsubscribe();
        assert!(!shell.post(PlatformEvent::FocusLost));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_shell_fullscreen_needs_connected_shell() {
        let shell = ShellPlatform::new();
        assert_eq!(shell.request_fullscreen(), Err(PlatformError::Unavailable));

        let mut commands = shell.commands();
        shell.request_fullscreen().unwrap();
        assert_eq!(commands.try_recv().unwrap(), ShellCommand::RequestFullscreen);
    }
}
