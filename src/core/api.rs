//! HTTP + WebSocket bridge to a browser shell
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /session - Current session view
//! - POST /session/activate - Start the exam
//! - POST /session/restore - Adopt the server session (page load)
//! - POST /session/events - Platform event from the shell
//! - POST /session/notice/dismiss - Dismiss the current notice
//! - POST /session/submit/confirm - Confirm submission
//! - POST /session/submit/cancel - Cancel submission
//! - POST /session/submit - External submission
//! - WS /ws - View updates and shell commands

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::core::machine::ExamSessionStateMachine;
use crate::core::monitor::{spawn_monitor, MonitorHandle};
use crate::core::platform::{ShellCommand, ShellPlatform};
use crate::core::server::ExamServer;
use crate::types::{ExamStatus, PlatformEvent, SessionView};

/// One monitored sitting exposed to a shell
#[derive(Debug, Clone)]
pub struct Bridge {
    pub monitor: MonitorHandle,
    pub shell: Arc<ShellPlatform>,
}

impl Bridge {
    /// Spawn a monitor driven by a shell platform
    pub fn start(config: &AppConfig, server: Arc<dyn ExamServer>) -> Self {
        let shell = Arc::new(ShellPlatform::new());
        let machine = ExamSessionStateMachine::new(
            config.contest_id.clone(),
            config.role,
            config.policy.clone(),
            &config.monitor,
        );
        let monitor = spawn_monitor(machine, server, shell.clone(), &config.monitor);
        Self { monitor, shell }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub contest_id: String,
    pub exam_status: ExamStatus,
}

/// Message pushed to the shell over the socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "data")]
pub enum ShellMessage {
    View(SessionView),
    Command(ShellCommand),
}

/// Create the API router
pub fn create_router(bridge: Bridge) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(get_session))
        .route("/session/activate", post(activate))
        .route("/session/restore", post(restore))
        .route("/session/events", post(post_event))
        .route("/session/notice/dismiss", post(dismiss_notice))
        .route("/session/submit/confirm", post(confirm_submission))
        .route("/session/submit/cancel", post(cancel_submission))
        .route("/session/submit", post(external_submission))
        .route("/ws", get(websocket_handler))
        .with_state(bridge)
}

/// Health check endpoint
async fn health(State(bridge): State<Bridge>) -> Json<HealthResponse> {
    let view = bridge.monitor.view();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        contest_id: view.contest_id,
        exam_status: view.status,
    })
}

async fn get_session(State(bridge): State<Bridge>) -> Json<SessionView> {
    Json(bridge.monitor.view())
}

async fn activate(State(bridge): State<Bridge>) -> StatusCode {
    bridge.monitor.activate();
    StatusCode::ACCEPTED
}

async fn restore(State(bridge): State<Bridge>) -> Result<StatusCode, (StatusCode, String)> {
    bridge.monitor.restore().await.map_err(|err| {
        warn!(error = %err, "restore failed");
        (StatusCode::BAD_GATEWAY, err.to_string())
    })?;
    Ok(StatusCode::ACCEPTED)
}

/// Events are accepted even while unsubscribed; they are dropped there
async fn post_event(State(bridge): State<Bridge>, Json(event): Json<PlatformEvent>) -> StatusCode {
    bridge.shell.post(event);
    StatusCode::ACCEPTED
}

async fn dismiss_notice(State(bridge): State<Bridge>) -> StatusCode {
    bridge.monitor.dismiss_notice();
    StatusCode::ACCEPTED
}

async fn confirm_submission(State(bridge): State<Bridge>) -> StatusCode {
    bridge.monitor.confirm_submission();
    StatusCode::ACCEPTED
}

async fn cancel_submission(State(bridge): State<Bridge>) -> StatusCode {
    bridge.monitor.cancel_submission();
    StatusCode::ACCEPTED
}

async fn external_submission(State(bridge): State<Bridge>) -> StatusCode {
    bridge.monitor.submit();
    StatusCode::ACCEPTED
}

/// WebSocket handler for the shell
async fn websocket_handler(State(bridge): State<Bridge>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, bridge))
}

/// Push views and commands out, read platform events in
async fn handle_websocket(socket: WebSocket, bridge: Bridge) {
    let (mut sender, mut receiver) = socket.split();
    let mut views = bridge.monitor.subscribe_view();
    let mut commands = bridge.shell.commands();

    let view = views.borrow_and_update().clone();
    let first = ShellMessage::View(view);
    if send(&mut sender, &first).await.is_err() {
        return;
    }

    loop {
        let outgoing = tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                ShellMessage::View(view)
            }
            command = commands.recv() => match command {
                Ok(command) => ShellMessage::Command(command),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "shell lagging, commands dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<PlatformEvent>(&text) {
                        Ok(event) => {
                            bridge.shell.post(event);
                        }
                        Err(err) => debug!(error = %err, "unreadable shell message"),
                    }
                    continue;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };
        if send(&mut sender, &outgoing).await.is_err() {
            break;
        }
    }
    debug!("shell disconnected");
}

async fn send<S>(sender: &mut S, message: &ShellMessage) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(message).unwrap_or_default();
    sender.send(Message::Text(json)).await
}

/// Run the API server
pub async fn run_server(addr: &str, bridge: Bridge) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(bridge);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "exam monitor bridge listening");
    axum::serve(listener, router).await?;
    Ok(())
}
