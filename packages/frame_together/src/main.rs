use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use frame_together::bridge::run_bridge;
use frame_together::config::{
    DEFAULT_SERVER_URL, FileConfig, FrameConfig, SessionTimings, load_config, validate_server_url,
};
use frame_together::store::{FileSettingsStore, Settings, SettingsStore};
use frame_together::transport::WebSocketConnector;
use frame_together::SessionManager;

#[derive(Parser)]
#[command(name = "frametogether")]
#[command(about = "Keep video playback in step with friends through a relay server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding settings.toml and config.toml (default ~/.frametogether)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session manager, serving the JSON-lines bridge on stdin/stdout
    Run,

    /// Validate and persist the relay server URL
    SetServer(SetServerArgs),

    /// Print persisted settings and session tunables
    ShowConfig,
}

#[derive(Parser)]
struct SetServerArgs {
    /// Relay URL, ws:// or wss://
    #[arg(required_unless_present = "default", conflicts_with = "default")]
    url: Option<String>,

    /// Use the public FrameTogether relay
    #[arg(long)]
    default: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = FrameConfig::new(cli.data_dir.clone())?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::SetServer(args) => set_server(&config, args),
        Commands::ShowConfig => show_config(&config),
    }
}

/// Logs go to stderr; stdout carries the bridge protocol.
fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "frame_together=debug,frametogether=debug,info"
    } else {
        "frame_together=info,frametogether=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn session_timings(config: &FrameConfig) -> Result<SessionTimings> {
    let fc: FileConfig = load_config(&config.data_dir)
        .extract()
        .context("failed to load config.toml")?;
    Ok(SessionTimings::from_file(&fc.session))
}

async fn run(config: FrameConfig) -> Result<()> {
    let timings = session_timings(&config)?;
    info!(
        heartbeat = ?timings.heartbeat_interval,
        reconnect = ?timings.reconnect_delay,
        "Starting FrameTogether session manager"
    );

    let store = FileSettingsStore::new(config.settings_path());
    let manager = SessionManager::start(store, Arc::new(WebSocketConnector), timings);

    let bridge = run_bridge(
        manager.clone(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );

    tokio::select! {
        result = bridge => {
            if let Err(e) = result {
                warn!(error = %e, "bridge stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    manager.shutdown().await.context("session manager already stopped")?;
    Ok(())
}

fn set_server(config: &FrameConfig, args: SetServerArgs) -> Result<()> {
    let input = match (args.default, args.url) {
        (true, _) => DEFAULT_SERVER_URL.to_string(),
        (false, Some(url)) => url,
        (false, None) => anyhow::bail!("a server URL or --default is required"),
    };
    let url = validate_server_url(&input)?;

    let mut store = FileSettingsStore::new(config.settings_path());
    store
        .save(&Settings {
            server_url: Some(url.clone()),
        })
        .with_context(|| format!("failed to write {}", store.path().display()))?;
    println!("Server URL set to {url}");
    Ok(())
}

fn show_config(config: &FrameConfig) -> Result<()> {
    let store = FileSettingsStore::new(config.settings_path());
    let settings = store.load().context("failed to read settings")?;
    let timings = session_timings(config)?;

    println!("data dir:           {}", config.data_dir.display());
    println!(
        "server url:         {}",
        settings.server_url.as_deref().unwrap_or("(not set)")
    );
    println!("heartbeat interval: {:?}", timings.heartbeat_interval);
    println!("reconnect delay:    {:?}", timings.reconnect_delay);
    println!("join delay:         {:?}", timings.join_delay);
    Ok(())
}
