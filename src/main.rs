//! ExamGuard CLI
//!
//! Usage:
//!   examguard --serve                          # HTTP/WebSocket bridge
//!   examguard --replay trace.txt               # Replay a scripted trace
//!   examguard --replay trace.txt --json        # JSON lines output
//!   examguard --config examguard.toml --serve  # Load TOML configuration

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use colored::Colorize;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use examguard::config::{AppConfig, ServerConfig};
use examguard::core::{load_script, run_script, run_server, Bridge, ExamServer, HttpExamServer, MemoryExamServer, ReplayFrame};
use examguard::types::Role;
use examguard::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "examguard",
    version = VERSION,
    about = "ExamGuard - proctoring monitor for exam-mode contests",
    long_about = "ExamGuard watches a participant's exam surface for tab switches,\n\
                  focus loss and fullscreen exits, reports violations to the\n\
                  contest server and enforces the lock and submission rules.\n\n\
                  Modes:\n  \
                  --serve   HTTP/WebSocket bridge for a browser shell\n  \
                  --replay  Run a scripted event trace against an in-memory server\n\n\
                  Statuses:\n  \
                  NOT_STARTED - Exam not activated\n  \
                  IN_PROGRESS - Monitoring\n  \
                  LOCKED      - Too many violations, awaiting unlock\n  \
                  PAUSED      - Unlocked, leaving fullscreen submits\n  \
                  SUBMITTED   - Exam ended"
)]
struct Args {
    /// Run as HTTP/WebSocket bridge
    #[arg(short, long)]
    serve: bool,

    /// Bridge address
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Replay a script of `@<ms> <action> [arg]` lines
    #[arg(short, long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Contest id (overrides config)
    #[arg(long)]
    contest: Option<String>,

    /// Role of the signed-in user (overrides config)
    #[arg(long, value_parser = parse_role)]
    role: Option<Role>,

    /// Exam server base URL (overrides config)
    #[arg(long)]
    server_url: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

fn parse_role(value: &str) -> Result<Role, String> {
    match value.to_ascii_lowercase().as_str() {
        "participant" => Ok(Role::Participant),
        "teacher" => Ok(Role::Teacher),
        "proctor" => Ok(Role::Proctor),
        "admin" => Ok(Role::Admin),
        other => Err(format!("unknown role '{}'", other)),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("examguard=info")))
        .with_writer(std::io::stderr)
        .with_ansi(!args.no_color)
        .init();

    if args.no_color {
        colored::control::set_override(false);
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration");
            process::exit(2);
        }
    };

    if args.serve {
        run_serve(&args, &config).await;
    } else if let Some(ref path) = args.replay {
        run_replay(path, &args, &config).await;
    } else {
        let _ = Args::command().print_help();
        println!();
    }
}

/// File first, then flags on top
fn load_config(args: &Args) -> Result<AppConfig, examguard::error::ConfigError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(contest) = &args.contest {
        config.contest_id = contest.clone();
    }
    if let Some(role) = args.role {
        config.role = role;
    }
    if let Some(url) = &args.server_url {
        let token = config.server.as_ref().and_then(|s| s.token.clone());
        config.server = Some(ServerConfig {
            base_url: url.clone(),
            token,
        });
    }
    Ok(config)
}

/// Run the bridge
async fn run_serve(args: &Args, config: &AppConfig) {
    let server: Arc<dyn ExamServer> = match &config.server {
        Some(server) => Arc::new(HttpExamServer::new(server)),
        None => {
            warn!("no [server] configured, using in-memory exam server");
            Arc::new(MemoryExamServer::new(config.policy.clone()))
        }
    };
    let bridge = Bridge::start(config, server);

    print_header("Bridge", args.no_color);
    println!("  GET  /health                 - Health check");
    println!("  GET  /session                - Current view");
    println!("  POST /session/activate       - Start exam");
    println!("  POST /session/restore        - Restore on page load");
    println!("  POST /session/events         - Platform event");
    println!("  POST /session/notice/dismiss - Dismiss notice");
    println!("  POST /session/submit/confirm - Confirm submission");
    println!("  POST /session/submit/cancel  - Cancel submission");
    println!("  POST /session/submit         - External submission");
    println!("  WS   /ws                     - Live view + shell commands");
    println!();

    if let Err(err) = run_server(&args.addr, bridge).await {
        error!(error = %err, addr = %args.addr, "bridge stopped");
        process::exit(1);
    }
}

/// Replay a script and print one line per step
async fn run_replay(path: &PathBuf, args: &Args, config: &AppConfig) {
    let steps = match load_script(path) {
        Ok(steps) => steps,
        Err(err) => {
            error!(error = %err, path = %path.display(), "replay script");
            process::exit(2);
        }
    };

    if !args.json {
        print_header("Replay", args.no_color);
    }
    for frame in run_script(&steps, config).await {
        print_frame(&frame, args);
    }
}

fn print_frame(frame: &ReplayFrame, args: &Args) {
    if args.json {
        match serde_json::to_string(frame) {
            Ok(line) => println!("{}", line),
            Err(err) => error!(error = %err, "frame serialization"),
        }
        return;
    }

    let time = format!("@{:>6}", frame.at_ms);
    let action = format!("{:<18}", frame.action);
    if args.no_color {
        println!("{} {} {}", time, action, frame.view.to_parseable_string());
    } else {
        println!(
            "{} {} {}",
            time.dimmed(),
            action.bold(),
            frame.view.to_terminal_string()
        );
    }
}

/// Print header
fn print_header(mode: &str, no_color: bool) {
    let title = format!("ExamGuard v{} - {}", VERSION, mode);
    if no_color {
        println!("========================================");
        println!("  {}", title);
        println!("========================================");
    } else {
        println!("{}", "========================================".bold());
        println!("  {}", title.bold());
        println!("{}", "========================================".bold());
    }
    println!();
}
