//! Monitor runtime: runs one state machine on a tokio task
//!
//! Every input (platform event, user action, server answer, timer) goes
//! through one unbounded queue, so the machine sees them strictly one at a
//! time. Server calls run as spawned tasks and post their result back.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::core::machine::ExamSessionStateMachine;
use crate::core::platform::{EventSink, Platform};
use crate::core::report::send_report;
use crate::core::server::ExamServer;
use crate::error::ServerError;
use crate::types::{Effect, Input, Moment, PlatformEvent, SessionView};

/// Wall clock derived from the tokio clock, so paused time moves both
struct WallClock {
    wall: DateTime<Utc>,
    at: Instant,
}

impl WallClock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            at: Instant::now(),
        }
    }

    fn moment(&self) -> Moment {
        let now = Instant::now();
        let elapsed = chrono::Duration::from_std(now - self.at).unwrap_or_else(|_| chrono::Duration::zero());
        Moment::new(now.into_std(), self.wall + elapsed)
    }
}

/// Control surface of a running monitor. Cheap to clone.
#[derive(Clone)]
pub struct MonitorHandle {
    contest_id: String,
    tx: mpsc::UnboundedSender<Input>,
    view: watch::Receiver<SessionView>,
    server: Arc<dyn ExamServer>,
    platform: Arc<dyn Platform>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("contest_id", &self.contest_id)
            .finish_non_exhaustive()
    }
}

/// Start the runtime for `machine`
pub fn spawn_monitor(
    machine: ExamSessionStateMachine,
    server: Arc<dyn ExamServer>,
    platform: Arc<dyn Platform>,
    config: &MonitorConfig,
) -> MonitorHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let clock = WallClock::start();
    let (view_tx, view_rx) = watch::channel(machine.view(clock.moment()));
    let contest_id = machine.contest_id().to_string();

    let runtime = MonitorRuntime {
        machine,
        server: server.clone(),
        platform: platform.clone(),
        report_timeout: config.report_timeout(),
        tx: tx.clone(),
        view: view_tx,
        clock,
    };
    let task = tokio::spawn(runtime.run(rx));
    info!(contest = %contest_id, "monitor started");

    MonitorHandle {
        contest_id,
        tx,
        view: view_rx,
        server,
        platform,
        task: Arc::new(Mutex::new(Some(task))),
    }
}

impl MonitorHandle {
    pub fn contest_id(&self) -> &str {
        &self.contest_id
    }

    fn send(&self, input: Input) {
        if self.tx.send(input).is_err() {
            debug!(contest = %self.contest_id, "monitor stopped, input dropped");
        }
    }

    /// Participant starts the exam
    pub fn activate(&self) {
        self.send(Input::Activate);
    }

    /// Page load: adopt whatever the server knows about this sitting
    pub async fn restore(&self) -> Result<(), ServerError> {
        let session = self.server.fetch_session(&self.contest_id).await?;
        self.send(Input::Restore {
            session,
            fullscreen_active: self.platform.is_fullscreen(),
        });
        Ok(())
    }

    pub fn dismiss_notice(&self) {
        self.send(Input::NoticeDismissed);
    }

    pub fn confirm_submission(&self) {
        self.send(Input::SubmitConfirmed);
    }

    pub fn cancel_submission(&self) {
        self.send(Input::SubmitCancelled);
    }

    /// Sitting submitted by an explicit action elsewhere
    pub fn submit(&self) {
        self.send(Input::ExternalSubmission);
    }

    /// Inject a platform event directly, bypassing the platform
    pub fn platform_event(&self, event: PlatformEvent) {
        self.send(Input::Platform(event));
    }

    /// Latest published view
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Wait for a view matching `predicate`; `None` if the monitor stopped first
    pub async fn wait_for<F>(&self, mut predicate: F) -> Option<SessionView>
    where
        F: FnMut(&SessionView) -> bool,
    {
        let mut rx = self.view.clone();
        let view = rx.wait_for(|view| predicate(view)).await.ok()?;
        Some((*view).clone())
    }

    /// Tear down and wait for the loop to stop
    pub async fn shutdown(&self) {
        self.send(Input::Teardown);
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

struct MonitorRuntime {
    machine: ExamSessionStateMachine,
    server: Arc<dyn ExamServer>,
    platform: Arc<dyn Platform>,
    report_timeout: Duration,
    tx: mpsc::UnboundedSender<Input>,
    view: watch::Sender<SessionView>,
    clock: WallClock,
}

impl MonitorRuntime {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        loop {
            let deadline = self.machine.next_deadline();
            let input = tokio::select! {
                received = rx.recv() => received.unwrap_or(Input::Teardown),
                _ = sleep_until(deadline) => Input::Tick,
            };

            let moment = self.clock.moment();
            for effect in self.machine.handle(input, moment) {
                self.perform(effect);
            }
            self.view.send_replace(self.machine.view(moment));

            if self.machine.is_torn_down() {
                break;
            }
        }
        info!(contest = %self.machine.contest_id(), "monitor stopped");
    }

    fn perform(&self, effect: Effect) {
        let contest_id = self.machine.contest_id().to_string();
        match effect {
            Effect::Subscribe => self.platform.subscribe(EventSink::new(self.tx.clone())),
            Effect::Unsubscribe => self.platform.unsubscribe(),
            Effect::RequestFullscreen => {
                if let Err(err) = self.platform.request_fullscreen() {
                    self.machine.fullscreen_request_failed(&err);
                }
            }
            Effect::ExitFullscreen => self.platform.exit_fullscreen(),
            Effect::StartExam => {
                let server = self.server.clone();
                self.post(async move {
                    Input::ExamStarted(server.start_exam(&contest_id).await.map_err(|e| e.to_string()))
                });
            }
            Effect::EndExam => {
                let server = self.server.clone();
                self.post(async move {
                    Input::SubmitCompleted(server.end_exam(&contest_id).await.map_err(|e| e.to_string()))
                });
            }
            Effect::RefreshStatus => {
                let server = self.server.clone();
                self.post(async move {
                    Input::StatusRefreshed(server.fetch_session(&contest_id).await.map_err(|e| e.to_string()))
                });
            }
            Effect::ReportViolation(event) => {
                let server = self.server.clone();
                let timeout = self.report_timeout;
                self.post(async move {
                    let client_event_id = event.client_event_id.clone();
                    let result = send_report(server, contest_id, event, timeout).await;
                    Input::ReportCompleted {
                        client_event_id,
                        result,
                    }
                });
            }
        }
    }

    /// Run `call` off the loop and queue its result
    fn post<F>(&self, call: F)
    where
        F: std::future::Future<Output = Input> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(call.await);
        });
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(Instant::from_std(at)).await,
        None => std::future::pending::<()>().await,
    }
}
