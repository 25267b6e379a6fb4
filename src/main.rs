//! fixa controller
//!
//! Live-tunes the fixables of a running application over the network, from
//! the console or from a MIDI controller.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fixa_controller::cli;
use fixa_controller::config::AppConfig;
use fixa_controller::hardware::{self, ControllerDevice};
use fixa_controller::paths::AppPaths;
use fixa_controller::persistence::{SledValueStore, ValueStore};
use fixa_controller::session::{SessionEvent, SessionHandle, SessionState};
use fixa_controller::stream::DemoTarget;
use fixa_controller::transport::WebSocketConnector;

/// fixa controller - tune a running app's fixables live
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Target to connect to (ws://host:port)
    #[arg(short, long, env = "FIXA_ENDPOINT")]
    endpoint: Option<String>,

    /// MIDI input port name (substring match)
    #[arg(long, env = "FIXA_MIDI_PORT")]
    midi_port: Option<String>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Run the envelope demo target on this port instead of a controller
    #[arg(long, value_name = "PORT")]
    serve_demo: Option<u16>,

    /// Disable the interactive console
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let paths = AppPaths::detect();

    init_logging(&args.log_level)?;

    if args.list_ports {
        list_ports_formatted();
        return Ok(());
    }

    if let Some(port) = args.serve_demo {
        return serve_demo(port).await;
    }

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    info!("Configuration file: {}", config_path.display());

    let mut config = AppConfig::load(&config_path).await?;
    if let Some(endpoint) = args.endpoint {
        config.controller.endpoint = Some(endpoint);
    }
    if let Some(port) = args.midi_port {
        config.midi.input_port = Some(port);
    }
    config.validate().context("Invalid configuration")?;

    run_app(config, &paths, !args.no_console, shutdown_signal()).await?;

    info!("fixa controller shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    paths: &AppPaths,
    console: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let value_store = open_value_store(&config, paths);
    let (session, mut events) = SessionHandle::spawn(
        config.session_settings(),
        Arc::new(WebSocketConnector),
        value_store,
    );

    // Kept alive for the lifetime of the app; dropping it closes the port
    let _device = match &config.midi.input_port {
        Some(pattern) => match ControllerDevice::connect(pattern, session.controller_handoff()) {
            Ok(device) => {
                info!("Controller connected: {}", device.port_name());
                Some(device)
            }
            Err(e) => {
                warn!("Controller unavailable: {:#}", e);
                None
            }
        },
        None => None,
    };

    if let Some(endpoint) = &config.controller.endpoint {
        session.open_connection(endpoint.clone());
    }

    let (console_tx, mut console_rx) = mpsc::unbounded_channel();
    if console {
        cli::print_help();
        cli::spawn_console(console_tx);
    } else {
        drop(console_tx);
    }

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(command) = console_rx.recv() => {
                match cli::execute(command, &session).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => warn!("Command failed: {:#}", e),
                }
            }
            Some(event) = events.recv() => report_event(event),
            _ = &mut shutdown => break,
        }
    }

    hang_up_gracefully(&session, &mut events).await;
    session.shutdown();
    Ok(())
}

/// Hang up if connected and give the target a moment to answer
async fn hang_up_gracefully(
    session: &SessionHandle,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) {
    let connected = matches!(
        session.snapshot().await.map(|s| s.state),
        Ok(SessionState::Connected)
    );
    if !connected {
        return;
    }

    session.hang_up();
    let ended = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(event) = events.recv().await {
            if matches!(event, SessionEvent::Disconnected { .. }) {
                return;
            }
        }
    })
    .await;
    if ended.is_err() {
        warn!("Target did not answer the hang up");
    }
}

fn report_event(event: SessionEvent) {
    match event {
        SessionEvent::Connected { stream_name, .. } => {
            println!("{} {}", "Connected to".green(), stream_name.bold());
        }
        SessionEvent::Disconnected { connection } => {
            println!("{} ({})", "Disconnected".yellow(), connection);
        }
        SessionEvent::Bound { number, descriptor } => {
            println!("Input {} bound to {}", number.to_string().green(), descriptor);
        }
        SessionEvent::BindingIncompatible { kind, voice } => {
            println!(
                "{}",
                format!("A {} binding cannot learn from {}, still waiting", kind, voice).yellow()
            );
        }
        SessionEvent::DecodeFailed { error, .. } => debug!("Undecodable frame: {}", error),
        SessionEvent::Changed => {}
    }
}

fn open_value_store(config: &AppConfig, paths: &AppPaths) -> Option<Arc<dyn ValueStore>> {
    let path = match &config.persistence.path {
        Some(path) => path.clone(),
        None => {
            if let Err(e) = paths.ensure_directories() {
                warn!("Cannot create state directory: {:#}", e);
                return None;
            }
            paths.sled_db_path()
        }
    };

    match SledValueStore::open(&path) {
        Ok(store) => Some(Arc::new(store) as Arc<dyn ValueStore>),
        Err(e) => {
            warn!("Value store unavailable at {}: {}", path.display(), e);
            None
        }
    }
}

async fn serve_demo(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("Failed to bind demo target to port {}", port))?;
    let target = Arc::new(DemoTarget::envelope());

    tokio::select! {
        result = target.serve(listener) => result,
        _ = shutdown_signal() => Ok(()),
    }
}

fn list_ports_formatted() {
    println!("\n{}", "=== Available MIDI Input Ports ===".bold().cyan());

    match hardware::list_ports() {
        Ok(ports) if ports.is_empty() => println!("  {}", "No input ports found".dimmed()),
        Ok(ports) => {
            for port in ports {
                println!("  {}", port);
            }
        }
        Err(e) => println!("  {}", format!("Failed to list ports: {}", e).red()),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
