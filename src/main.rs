//! soilwatch - command line entry point
//!
//! Headless front end for the session: messages go to stdout as
//! `topic: payload(retained)` lines, warnings and errors to stderr, logs to
//! stderr through tracing.

use clap::{Parser, Subcommand};
use soilwatch::automation::AutomationController;
use soilwatch::config::AppConfig;
use soilwatch::error::ErrorKind;
use soilwatch::observability::init_default_logging;
use soilwatch::protocol::{parse_topic_list, PublishResult, TopicFilter};
use soilwatch::session::{ConnectionState, Session, SessionObserver, TracingObserver};
use soilwatch::transport::mqtt::MqttTransport;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// How long to wait for the broker's CONNACK
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Soil moisture controller and MQTT client
#[derive(Parser)]
#[command(name = "soilwatch")]
#[command(about = "MQTT client that watches soil moisture and drives irrigation")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, subscribe and run automation until interrupted
    Run,
    /// Publish one message to a comma-separated list of topics
    Publish {
        /// Topics, e.g. "public/X/a, public/X/b"
        #[arg(short, long)]
        topics: String,
        /// Message text
        #[arg(short, long)]
        message: String,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

/// Prints session notifications for a terminal user
struct ConsoleObserver {
    log: TracingObserver,
}

impl SessionObserver for ConsoleObserver {
    fn on_state_change(&self, state: &ConnectionState) {
        self.log.on_state_change(state);
    }

    fn on_message_received(&self, line: &str) {
        println!("{line}");
    }

    fn on_publish_result(&self, result: &PublishResult) {
        self.log.on_publish_result(result);
        if !result.success {
            eprintln!("Could not publish to {}", result.topic);
        }
    }

    fn on_subscribe_confirmed(&self, filters: &[TopicFilter]) {
        self.log.on_subscribe_confirmed(filters);
    }

    fn on_warning(&self, message: &str) {
        eprintln!("WARNING: {message}");
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        eprintln!("ERROR ({kind:?}): {message}");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose > 0);

    info!("Starting soilwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_session(config).await,
        Commands::Publish { topics, message } => publish_once(config, &topics, &message).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(config_path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(AppConfig::load_from_file(path)?);
    }

    let default_paths = ["soilwatch.toml", "config/soilwatch.toml"];
    for path_str in default_paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(AppConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create soilwatch.toml".into())
}

/// Wire the session to the real MQTT transport
fn build_session(
    config: &AppConfig,
) -> Result<Arc<Session<MqttTransport>>, Box<dyn std::error::Error>> {
    let controller = AutomationController::new(config.topic_scheme()?, config.thresholds()?)
        .with_automation(config.automation.enabled);

    let observer = Arc::new(ConsoleObserver {
        log: TracingObserver,
    });
    Ok(Arc::new(
        Session::new(MqttTransport::new(), controller, observer)
            .with_keep_alive(config.keep_alive()),
    ))
}

/// Connect and start dispatching; returns the dispatch task once acknowledged
async fn connect_and_dispatch(
    session: &Arc<Session<MqttTransport>>,
    config: &AppConfig,
) -> Result<JoinHandle<()>, Box<dyn std::error::Error>> {
    let dispatcher = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    let connected = match session.connect(&config.connection_config()).await {
        Ok(()) => session.wait_until_connected(CONNECT_TIMEOUT).await,
        Err(e) => Err(e),
    };

    if let Err(e) = connected {
        dispatcher.abort();
        return Err(e.into());
    }
    Ok(dispatcher)
}

async fn run_session(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(&config)?;
    let dispatcher = connect_and_dispatch(&session, &config).await?;

    let mut filters = config.subscribe_filters();
    if filters.is_empty() {
        filters.push(TopicFilter::at_most_once(config.topic_scheme()?.scope_filter()));
    }
    if let Err(e) = session.subscribe(filters).await {
        session.disconnect().await;
        dispatcher.abort();
        return Err(e.into());
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut state_rx = session.subscribe_state();

    info!(client_id = %config.client_id(), "Watching soil moisture, press Ctrl-C to stop");

    let ended = tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
            None
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
            None
        }
        state = wait_for_session_end(&mut state_rx) => Some(state),
    };

    session.disconnect().await;
    dispatcher.abort();

    match ended {
        Some(ConnectionState::Failed(reason)) => Err(reason.into()),
        Some(_) => {
            warn!("Session ended by the broker side");
            Ok(())
        }
        None => Ok(()),
    }
}

/// Resolve once the session leaves Connected for good
async fn wait_for_session_end(state_rx: &mut watch::Receiver<ConnectionState>) -> ConnectionState {
    loop {
        let state = state_rx.borrow_and_update().clone();
        if matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Failed(_)
        ) {
            return state;
        }
        if state_rx.changed().await.is_err() {
            return ConnectionState::Disconnected;
        }
    }
}

async fn publish_once(
    config: AppConfig,
    topics: &str,
    message: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(&config)?;
    let dispatcher = connect_and_dispatch(&session, &config).await?;

    let outcome = session.publish(&parse_topic_list(topics), message).await;

    session.disconnect().await;
    dispatcher.abort();

    let results = outcome?;
    let failed: Vec<&str> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.topic.as_str())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("publish failed for: {}", failed.join(", ")).into())
    }
}

fn handle_config_command(config: &AppConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
        println!("client id: {}", config.client_id());
        let scheme = config.topic_scheme()?;
        println!("status topic: {}", scheme.status_topic());
        println!("control topic: {}", scheme.control_topic());
    }

    info!("Configuration validation complete");
    Ok(())
}
