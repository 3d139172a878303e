use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use kcube::api_client::ApiClient;
use kcube::config::DaemonConfig;
use kcube::message::{Message, MessageType};
use kcube::repo::Repository;
use kcube::sync::Synchronizer;
use log::info;

use crate::show;

/// The various kinds of commands the `kcube` binary can run.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new vault in the current (or given) directory.
    Init {
        path: Option<PathBuf>,
    },
    /// Show staged/unstaged/untracked changes.
    Status,
    /// Stage files (or directories) for the next commit.
    Add {
        paths: Vec<PathBuf>,
    },
    /// Record the staged changes as a new version.
    Commit {
        #[clap(short = 'm', long = "message")]
        message: String,
        #[clap(long = "type", value_enum)]
        kind: Option<CliMessageType>,
    },
    /// Unstage paths, or everything if none are given.
    Reset {
        paths: Vec<PathBuf>,
    },
    /// Create a new version that restores the working tree to an earlier version's state.
    Revert {
        version: String,
    },
    /// Overwrite the working tree (or a single path) with a version's content.
    Restore {
        version: String,
        path: Option<String>,
        #[clap(long)]
        hard: bool,
    },
    /// Show version history, optionally filtered to a single path.
    Log {
        path: Option<String>,
    },
    /// Set the vault's remote server URL.
    Remote {
        url: String,
    },
    /// Log in to the remote server and cache the access token.
    Login {
        #[clap(long)]
        email: String,
        #[clap(long)]
        password: String,
    },
    /// Reconcile the current vault with the server.
    Sync,
    /// Clone a server-side vault into a new local directory.
    Clone {
        vault_id: String,
        dir: Option<PathBuf>,
    },
    /// Vault-management commands (currently just `list`).
    Vault {
        #[clap(subcommand)]
        action: VaultAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum VaultAction {
    /// List every vault registered under your account on the server.
    List,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliMessageType {
    Feat,
    Fix,
    Refactor,
    Style,
    Doc,
}

impl From<CliMessageType> for MessageType {
    fn from(kind: CliMessageType) -> Self {
        match kind {
            CliMessageType::Feat => MessageType::Feat,
            CliMessageType::Fix => MessageType::Fix,
            CliMessageType::Refactor => MessageType::Refactor,
            CliMessageType::Style => MessageType::Style,
            CliMessageType::Doc => MessageType::Doc,
        }
    }
}

const DAEMON_CONFIG_DIR: &str = ".kcube";
const DAEMON_CONFIG_FILE: &str = "config.json";

fn daemon_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(DAEMON_CONFIG_DIR).join(DAEMON_CONFIG_FILE))
}

fn load_daemon_config() -> Result<DaemonConfig> {
    Ok(DaemonConfig::load(&daemon_config_path()?)?)
}

fn save_daemon_config(config: &DaemonConfig) -> Result<()> {
    Ok(config.persist(&daemon_config_path()?)?)
}

fn open_current_repo() -> Result<Repository> {
    let cwd = std::env::current_dir()?;
    Ok(Repository::find(&cwd)?)
}

fn api_client(config: &DaemonConfig) -> Result<ApiClient> {
    if config.remote_url.is_empty() {
        bail!("no remote configured; run `kcube remote <url>` first");
    }
    let client = ApiClient::new(config.remote_url.clone())?;
    if let Some(token) = &config.api_token {
        client.set_token(Some(token.clone()));
    }
    Ok(client)
}

/// Runs one CLI command to completion.
pub async fn run(command: Command) -> Result<()> {
    match command {
        Command::Init { path } => {
            let path = path.unwrap_or(std::env::current_dir()?);
            Repository::initialize(&path)?;
            println!("initialized K-Cube vault at {}", path.display());
        }
        Command::Status => {
            let mut repo = open_current_repo()?;
            let report = repo.get_status()?;
            show::status(&report);
        }
        Command::Add { paths } => {
            let mut repo = open_current_repo()?;
            let paths = if paths.is_empty() { vec![repo.root().to_path_buf()] } else { paths };
            repo.add(&paths)?;
        }
        Command::Commit { message, kind } => {
            let mut repo = open_current_repo()?;
            let mut msg = Message::new(message);
            msg.kind = kind.map(Into::into);
            let summary = repo.commit(msg)?;
            show::commit(&summary);
        }
        Command::Reset { paths } => {
            let mut repo = open_current_repo()?;
            repo.reset(&paths)?;
        }
        Command::Revert { version } => {
            let mut repo = open_current_repo()?;
            let summary = repo.revert(&version)?;
            show::commit(&summary);
        }
        Command::Restore { version, path, hard } => {
            let mut repo = open_current_repo()?;
            repo.restore(&version, path.as_deref(), hard)?;
        }
        Command::Log { path } => {
            let mut repo = open_current_repo()?;
            let versions = repo.get_history(path.as_deref())?;
            show::history(&versions);
        }
        Command::Remote { url } => {
            let mut repo = open_current_repo()?;
            repo.set_remote_url(url)?;
        }
        Command::Login { email, password } => {
            let mut config = load_daemon_config()?;
            if config.remote_url.is_empty() {
                bail!("no remote configured; run `kcube remote <url>` first");
            }
            let client = api_client(&config)?;
            let token = client.login(&email, &password).await?;
            config.api_token = Some(token);
            config.user_email = Some(email);
            save_daemon_config(&config)?;
            info!("logged in");
            println!("logged in");
        }
        Command::Sync => {
            let config = load_daemon_config()?;
            let client = api_client(&config)?;
            let mut repo = open_current_repo()?;
            let vault_id = repo.config().vault_id.clone();
            let mut synchronizer = Synchronizer::new(&mut repo, &client, vault_id);
            let result = synchronizer.sync().await?;
            show::sync_result(&result);
        }
        Command::Clone { vault_id, dir } => {
            let config = load_daemon_config()?;
            let client = api_client(&config)?;
            let summary = client.get_vault_details(&vault_id).await?;
            let dest = dir.unwrap_or_else(|| PathBuf::from(&summary.name));
            let mut repo = Repository::initialize(&dest)?;
            repo.set_remote_url_and_id(config.remote_url.clone(), summary.id)?;
            let local_vault_id = repo.config().vault_id.clone();

            let mut synchronizer = Synchronizer::new(&mut repo, &client, local_vault_id);
            let result = synchronizer.sync().await?;
            show::sync_result(&result);

            let latest = repo.index_mut().latest_version_hash()?.context("cloned vault has no versions")?;
            repo.restore(&latest, None, true)?;
            println!("cloned into {}", dest.display());
        }
        Command::Vault { action } => match action {
            VaultAction::List => {
                let config = load_daemon_config()?;
                let client = api_client(&config)?;
                let vaults = client.list_vaults().await?;
                for vault in vaults {
                    println!("{} {}", vault.id, vault.name);
                }
            }
        },
    }
    Ok(())
}
