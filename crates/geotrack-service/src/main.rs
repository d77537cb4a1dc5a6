//! geotrack-service - GPS session recorder and HTTP API.
//!
//! Run with: `cargo run -p geotrack-service`

use std::fs::File;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geotrack_service::{AppState, Config, ShutdownReason, api, ws};
use geotrack_store::Store;

mod service;

/// geotrack-service - GPS session recorder and HTTP API.
#[derive(Parser, Debug)]
#[command(name = "geotrack-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Send an action to a running service.
    Send {
        /// Action name, e.g. `start_session` or `end_session`.
        action: String,
        /// Action payload, e.g. the session name.
        #[arg(long)]
        data: Option<String>,
    },

    /// Export a session's samples as CSV.
    Export {
        /// Session id.
        #[arg(short, long)]
        session: i64,
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage the background service.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand, Debug)]
enum ServiceAction {
    /// Install geotrack-service as a system service.
    Install {
        /// Install as user-level service (no root/admin required).
        #[arg(long)]
        user: bool,
    },

    /// Uninstall the geotrack-service system service.
    Uninstall {
        #[arg(long)]
        user: bool,
    },

    /// Start the geotrack-service system service.
    Start {
        #[arg(long)]
        user: bool,
    },

    /// Stop the geotrack-service system service.
    Stop {
        #[arg(long)]
        user: bool,
    },

    /// Check whether the service answers on its bind address.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Service { action }) => handle_service_action(action, &config).await,
        Some(Command::Send { action, data }) => send_action(&config, action, data).await,
        Some(Command::Export { session, output }) => export_session(&config, session, output),
        Some(Command::Run) | None => run_server(config).await,
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("geotrack_service={level}").parse()?)
                .add_directive(format!("geotrack_core={level}").parse()?)
                .add_directive(format!("geotrack_store={level}").parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("Using default configuration: {}", e);
            Config::default()
        }),
    };

    // Override config with CLI args
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn handle_service_action(action: ServiceAction, config: &Config) -> anyhow::Result<()> {
    use service::{Level, ServiceStatus};

    let level = |user: bool| if user { Level::User } else { Level::System };
    let (action_name, result) = match action {
        ServiceAction::Install { user } => ("install", service::install(level(user))),
        ServiceAction::Uninstall { user } => ("uninstall", service::uninstall(level(user))),
        ServiceAction::Start { user } => ("start", service::start(level(user))),
        ServiceAction::Stop { user } => ("stop", service::stop(level(user))),
        ServiceAction::Status => {
            match service::status(&config.server.bind).await {
                ServiceStatus::Running => println!("geotrack-service is running"),
                ServiceStatus::Stopped => println!("geotrack-service is stopped"),
            }
            return Ok(());
        }
    };

    match result {
        Ok(()) => {
            println!("Successfully {}ed geotrack-service", action_name);
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to {} service: {}", action_name, e);
            Err(e.into())
        }
    }
}

async fn send_action(config: &Config, action: String, data: Option<String>) -> anyhow::Result<()> {
    let url = format!("http://{}/api/actions", config.server.bind);
    let body = serde_json::json!({ "action": action, "data": data });

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Failed to reach geotrack-service at {}", config.server.bind))?;

    let status = response.status();
    let text = response.text().await?;
    if status.is_success() {
        println!("{}", text);
        Ok(())
    } else {
        anyhow::bail!("Service rejected the action ({}): {}", status, text)
    }
}

fn export_session(config: &Config, session: i64, output: Option<PathBuf>) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;
    if store.get_session(session)?.is_none() {
        anyhow::bail!("Session not found: {}", session);
    }

    let rows = match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            store.export_samples_csv(session, file)?
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            let rows = store.export_samples_csv(session, &mut lock)?;
            lock.flush()?;
            rows
        }
    };

    info!("Exported {} samples", rows);
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;
    let source = config.position.build_source()?;
    let addr: SocketAddr = config.server.bind.parse()?;
    let terminate_closes_session = config.controller.terminate_closes_session;

    let (state, controller_task) = AppState::start(store, source, config).await;

    // Forward process signals to the controller
    let handle = state.controller.clone();
    tokio::spawn(async move {
        match wait_for_signal(terminate_closes_session).await {
            Ok(reason) => {
                info!(reason = ?reason, "Signal received");
                if handle.shutdown(reason).await.is_err() {
                    info!("Controller already stopped");
                }
            }
            Err(e) => warn!("Failed to install signal handlers: {}", e),
        }
    });

    let app = Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = controller_task.await {
                warn!("Controller task failed: {}", e);
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal(terminate_closes_session: bool) -> io::Result<ShutdownReason> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigint.recv() => Ok(ShutdownReason::Host),
        _ = sigterm.recv() => Ok(if terminate_closes_session {
            ShutdownReason::DeviceShuttingDown
        } else {
            ShutdownReason::Host
        }),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal(_terminate_closes_session: bool) -> io::Result<ShutdownReason> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownReason::Host)
}
