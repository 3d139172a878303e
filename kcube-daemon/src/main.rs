//! `kcubed`: the headless process that hosts a [`kcube::supervisor::Supervisor`]
//! for every vault in the global daemon config and keeps them syncing in the
//! background. No subcommands, no UI — the frontend that would otherwise
//! drive this (the desktop app) is out of scope for this crate.

mod trace;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kcube::api_client::ApiClient;
use kcube::config::DaemonConfig;
use kcube::supervisor::Supervisor;
use kcube::worker::WorkerEvent;
use log::{error, info, warn};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(version, author, about = "K-Cube headless sync daemon")]
struct Args {
    /// Path to the daemon config JSON. Defaults to `~/.kcube/config.json`.
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".kcube").join("config.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_dir = format!("{}/.kcube/logs", std::env::var("HOME").unwrap_or_else(|_| ".".to_string()));
    let _guards = trace::init_logging(&log_dir, &args.log_level)?;

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = DaemonConfig::load(&config_path)?;
    info!("kcubed starting, config: {}", config_path.display());

    if !config.is_logged_in() {
        warn!("no cached session; worker validation will fail until `kcube login` is run");
    }

    let api = ApiClient::new(config.remote_url.clone())?;
    if let Some(token) = &config.api_token {
        api.set_token(Some(token.clone()));
    }

    let mut supervisor = Supervisor::new(api, config);
    let (auth_error_tx, mut auth_error_rx) = mpsc::channel::<String>(1);

    let vault_paths = supervisor.vault_paths();
    for path in vault_paths {
        if let Err(e) = supervisor.add_vault(&path) {
            error!("failed to start worker for {}: {e}", path.display());
            continue;
        }
        if let Ok(mut events) = supervisor.subscribe(&path) {
            let path_for_log = path.clone();
            let auth_error_tx = auth_error_tx.clone();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    info!("[{}] {:?}", path_for_log.display(), event);
                    if let WorkerEvent::AuthError(msg) = event {
                        let _ = auth_error_tx.send(msg).await;
                    }
                }
            });
        }
    }
    drop(auth_error_tx);

    info!("kcubed running, waiting for shutdown signal");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("kcubed shutting down");
            supervisor.shutdown().await;
        }
        Some(msg) = auth_error_rx.recv() => {
            error!("auth error during sync, stopping all workers and clearing cached session: {msg}");
            supervisor.stop_all_and_require_login().await;
        }
    }

    Ok(())
}
