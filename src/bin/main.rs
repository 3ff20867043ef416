use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

use shunt::config::{FromPath, ShuntConfig};
use shunt::utils::tracing::log_subscriber;
use shunt::{Result, ShuntServer};
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "shunt",
    about = "Single-port protocol demultiplexer - probe the first client bytes, forward to the matching backend"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "shunt.toml")]
    config: PathBuf,
    /// Prefix for environment variable overrides
    #[arg(long, default_value = "SHUNT_")]
    env_prefix: String,
}

#[tokio::main]
async fn main() {
    let _logger = tracing::subscriber::set_default(log_subscriber("info"));
    let cli = Cli::parse();

    if let Err(e) = run(cli.config, cli.env_prefix).await {
        error!("A critical error occurred: {e}");
        exit(1);
    }
}

async fn run(config_path: PathBuf, env_prefix: String) -> Result<()> {
    let config = ShuntConfig::from_path(&config_path, &env_prefix)?;
    tracing::subscriber::set_global_default(log_subscriber(&config.log.level))?;

    let server = ShuntServer::new(config)?;

    tokio::select! {
        result = server.run() => result,
        _ = shutdown_signal() => {
            info!("Shutting down.");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => stream.recv().await,
                Err(_) => std::future::pending::<Option<()>>().await,
            }
        };

        tokio::select! {
            _ = ctrl_c => { info!("Received Ctrl+C, shutting down..."); },
            _ = terminate => { info!("Received SIGTERM, shutting down..."); },
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("Received Ctrl+C, shutting down...");
    }
}
