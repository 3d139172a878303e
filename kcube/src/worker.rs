//! The per-vault worker: a concurrent state machine that validates, watches,
//! debounces, auto-commits, syncs, and checks out.
//!
//! The source's signal/slot wiring becomes message channels, per spec §9: a
//! worker owns `stop`/`manual_sync` input channels and a `status` output
//! channel the supervisor subscribes to. No shared mutable state between
//! workers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::api_client::ApiClient;
use crate::message::Message;
use crate::repo::Repository;
use crate::sync::{SyncDirection, SyncResult, Synchronizer};
use crate::watcher::VaultWatcher;

const DEBOUNCE: Duration = Duration::from_secs(2);
const STATUS_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    Validating,
    Monitoring,
    Syncing(SyncDirection),
    SyncFinished(SyncResult),
    SyncError(String),
    /// A syncing step failed with an auth error (401/403). Per spec §7 this
    /// is the one error kind a worker does not just log and keep going on —
    /// the supervisor is expected to stop every worker and require
    /// re-login rather than keep retrying with a dead token.
    AuthError(String),
    ValidationFailed(String),
    Finished,
}

pub struct WorkerHandle {
    pub vault_path: PathBuf,
    stop_tx: Option<oneshot::Sender<()>>,
    manual_sync_tx: mpsc::Sender<()>,
    status_tx: broadcast::Sender<WorkerEvent>,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.status_tx.subscribe()
    }

    pub async fn trigger_manual_sync(&self) {
        let _ = self.manual_sync_tx.send(()).await;
    }

    /// Signals the worker to stop and waits for it to emit `Finished`.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Spawns a worker task for the vault at `vault_path`.
pub fn spawn(vault_path: PathBuf, api: Arc<ApiClient>) -> WorkerHandle {
    let (stop_tx, stop_rx) = oneshot::channel();
    let (manual_sync_tx, manual_sync_rx) = mpsc::channel(1);
    let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

    let task_status_tx = status_tx.clone();
    let task_path = vault_path.clone();
    let join = tokio::spawn(async move {
        run(task_path, api, stop_rx, manual_sync_rx, task_status_tx).await;
    });

    WorkerHandle { vault_path, stop_tx: Some(stop_tx), manual_sync_tx, status_tx, join }
}

async fn run(
    vault_path: PathBuf,
    api: Arc<ApiClient>,
    mut stop_rx: oneshot::Receiver<()>,
    mut manual_sync_rx: mpsc::Receiver<()>,
    status_tx: broadcast::Sender<WorkerEvent>,
) {
    let _ = status_tx.send(WorkerEvent::Validating);

    let (mut repo, vault_id, watcher, mut change_rx) = match validate(&vault_path, &api).await {
        Ok(validated) => validated,
        Err(e) => {
            let _ = status_tx.send(WorkerEvent::ValidationFailed(e.to_string()));
            let _ = status_tx.send(WorkerEvent::Finished);
            return;
        }
    };

    let _ = status_tx.send(WorkerEvent::Monitoring);

    let mut deadline: Option<tokio::time::Instant> = None;
    loop {
        let sleep_until_deadline = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = &mut stop_rx => break,
            _ = manual_sync_rx.recv() => {
                deadline = None;
                sync_step(&mut repo, &api, &vault_id, &watcher, &status_tx).await;
            }
            maybe_event = change_rx.recv() => {
                if maybe_event.is_none() {
                    break;
                }
                deadline = Some(tokio::time::Instant::now() + DEBOUNCE);
            }
            _ = sleep_until_deadline, if deadline.is_some() => {
                deadline = None;
                sync_step(&mut repo, &api, &vault_id, &watcher, &status_tx).await;
            }
        }
    }

    let _ = status_tx.send(WorkerEvent::Finished);
}

async fn validate(
    vault_path: &PathBuf,
    api: &ApiClient,
) -> crate::error::CResult<(Repository, String, VaultWatcher, mpsc::Receiver<crate::watcher::ChangeEvent>)> {
    let repo = Repository::find(vault_path)?;
    let vault_id = repo.config().vault_id.clone();
    api.get_vault_details(&vault_id).await?;

    let (change_tx, change_rx) = mpsc::channel(64);
    let watcher = VaultWatcher::spawn(repo.root(), change_tx)?;
    Ok((repo, vault_id, watcher, change_rx))
}

async fn sync_step(
    repo: &mut Repository,
    api: &ApiClient,
    vault_id: &str,
    watcher: &VaultWatcher,
    status_tx: &broadcast::Sender<WorkerEvent>,
) {
    if let Err(e) = sync_step_inner(repo, api, vault_id, watcher, status_tx).await {
        if e.is_auth() {
            let _ = status_tx.send(WorkerEvent::AuthError(e.to_string()));
        } else {
            let _ = status_tx.send(WorkerEvent::SyncError(e.to_string()));
        }
    }
}

async fn sync_step_inner(
    repo: &mut Repository,
    api: &ApiClient,
    vault_id: &str,
    watcher: &VaultWatcher,
    status_tx: &broadcast::Sender<WorkerEvent>,
) -> crate::error::CResult<()> {
    let status = repo.get_status()?;
    if !status.is_clean() {
        repo.add(&[repo.root().to_path_buf()])?;
        repo.commit(Message::auto("Auto-sync changes"))?;
    }

    let mut synchronizer = Synchronizer::new(repo, api, vault_id.to_string());
    let (to_upload, to_download) = synchronizer.plan().await?;

    let direction = match (!to_upload.is_empty(), !to_download.is_empty()) {
        (true, true) => SyncDirection::Bidirectional,
        (true, false) => SyncDirection::Upload,
        (false, true) => SyncDirection::Download,
        (false, false) => SyncDirection::None,
    };
    if direction != SyncDirection::None {
        let _ = status_tx.send(WorkerEvent::Syncing(direction));
    }

    let result = synchronizer.apply(&to_upload, &to_download).await?;

    if result.downloaded > 0 {
        watcher.suspend();
        let latest = repo.index_mut().latest_version_hash()?;
        if let Some(latest) = latest {
            repo.restore(&latest, None, true)?;
        }
        watcher.resume();
    }

    let _ = status_tx.send(WorkerEvent::SyncFinished(result));
    Ok(())
}
