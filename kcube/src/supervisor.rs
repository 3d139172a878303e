//! Owns one worker per linked vault and the shared API client, per spec §9's
//! no-global-singletons mandate: a CLI or daemon process constructs one
//! `Supervisor` and drives every vault operation through it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::api_client::ApiClient;
use crate::config::DaemonConfig;
use crate::error::{CResult, Error};
use crate::repo::Repository;
use crate::worker::{self, WorkerHandle};

pub struct Supervisor {
    api: Arc<ApiClient>,
    config: DaemonConfig,
    workers: HashMap<PathBuf, WorkerHandle>,
    restart_lock: Mutex<()>,
}

impl Supervisor {
    pub fn new(api: ApiClient, config: DaemonConfig) -> Self {
        Self { api: Arc::new(api), config, workers: HashMap::new(), restart_lock: Mutex::new(()) }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn is_logged_in(&self) -> bool {
        self.config.is_logged_in()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.config.api_token = token.clone();
        self.api.set_token(token);
    }

    pub fn logout(&mut self) {
        self.config.logout();
        self.api.set_token(None);
    }

    pub fn vault_paths(&self) -> Vec<PathBuf> {
        self.config.vault_paths.clone()
    }

    /// Registers an already-initialized vault directory and starts its
    /// worker. Idempotent on the path: re-adding a running vault is a no-op.
    pub fn add_vault(&mut self, path: &Path) -> CResult<()> {
        let path = path.canonicalize()?;
        if self.workers.contains_key(&path) {
            return Ok(());
        }
        if !self.config.vault_paths.contains(&path) {
            self.config.vault_paths.push(path.clone());
        }
        let handle = worker::spawn(path.clone(), self.api.clone());
        self.workers.insert(path, handle);
        Ok(())
    }

    /// Initializes a brand new local vault at `path`, registers it with the
    /// server, and starts its worker.
    pub async fn create_vault(&mut self, path: &Path, name: &str) -> CResult<()> {
        let summary = self.api.create_vault(name, None).await?;
        let mut repo = Repository::initialize(path)?;
        repo.set_remote_url_and_id(self.config.remote_url.clone(), summary.id)?;
        self.add_vault(path)
    }

    /// Clones an existing server-side vault into a fresh local directory.
    pub async fn clone_vault(&mut self, vault_id: &str, dest: &Path) -> CResult<()> {
        let summary = self.api.get_vault_details(vault_id).await?;
        let mut repo = Repository::initialize(dest)?;
        repo.set_remote_url_and_id(self.config.remote_url.clone(), summary.id)?;
        self.add_vault(dest)
    }

    /// Stops and forgets a vault's worker without deleting local files.
    pub async fn unlink_vault(&mut self, path: &Path) -> CResult<()> {
        let path = path.canonicalize()?;
        if let Some(handle) = self.workers.remove(&path) {
            handle.stop().await;
        }
        self.config.vault_paths.retain(|p| p != &path);
        Ok(())
    }

    /// Unlinks the vault locally and deletes it server-side.
    pub async fn delete_vault(&mut self, path: &Path, vault_id: &str) -> CResult<()> {
        self.unlink_vault(path).await?;
        self.api.delete_vault(vault_id).await
    }

    pub async fn trigger_manual_sync(&self, path: &Path) -> CResult<()> {
        let path = path.canonicalize()?;
        match self.workers.get(&path) {
            Some(handle) => {
                handle.trigger_manual_sync().await;
                Ok(())
            }
            None => Err(Error::NotFound(format!("no running worker for {}", path.display()))),
        }
    }

    pub fn subscribe(&self, path: &Path) -> CResult<tokio::sync::broadcast::Receiver<worker::WorkerEvent>> {
        let path = path.canonicalize()?;
        match self.workers.get(&path) {
            Some(handle) => Ok(handle.subscribe()),
            None => Err(Error::NotFound(format!("no running worker for {}", path.display()))),
        }
    }

    /// Stops every worker and restarts one per configured vault path,
    /// serialized behind a single lock so no two restart calls race and spin
    /// up duplicate workers for the same path (spec §4.7).
    pub async fn restart_all(&mut self) -> CResult<()> {
        let _guard = self.restart_lock.lock().await;

        let old_workers: Vec<WorkerHandle> = self.workers.drain().map(|(_, h)| h).collect();
        for handle in old_workers {
            handle.stop().await;
        }

        for path in self.config.vault_paths.clone() {
            let handle = worker::spawn(path.clone(), self.api.clone());
            self.workers.insert(path, handle);
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let handles: Vec<WorkerHandle> = self.workers.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.stop().await;
        }
    }

    /// Stops every worker and clears the cached credential. Per spec §7, an
    /// auth error during a syncing step is the one non-validation failure
    /// that isn't just logged and retried: it means the cached token is
    /// dead, so every worker is stopped until the user runs `kcube login`
    /// again.
    pub async fn stop_all_and_require_login(&mut self) {
        self.shutdown().await;
        self.logout();
    }
}
