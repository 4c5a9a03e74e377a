use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use vigilante_daemon::{
    config::Config,
    handler::DaemonState,
    socket::{handle_client, SocketServer},
};

/// Fleet process usage rollup daemon.
#[derive(Parser)]
#[command(name = "vigilante-daemon", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let (config, load_error) = if config_path.exists() {
        match Config::load(&config_path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    } else {
        (Config::default(), None)
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.general.log_level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {}", level))?;
    fmt().with_env_filter(filter).with_target(true).init();

    info!("Vigilante daemon starting...");
    match load_error {
        Some(e) => warn!("Failed to load config: {:#}, using defaults", e),
        None if !config_path.exists() => info!("No config file found, using defaults"),
        None => info!("Loaded config from {:?}", config_path),
    }
    info!("Tenant databases under {:?}", config.storage.data_dir);

    let socket_path = config
        .server
        .socket_path
        .clone()
        .unwrap_or_else(SocketServer::socket_path);
    let server = SocketServer::bind(&socket_path)
        .await
        .with_context(|| format!("failed to bind {:?}", socket_path))?;

    let state = Arc::new(DaemonState::new(&config));

    info!("Daemon ready, listening for connections...");

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        handle_client(stream, state).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
        }
    }

    Ok(())
}
