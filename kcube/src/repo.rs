//! The repository engine: status diff, add, commit, reset, revert, restore,
//! and history queries over a single vault.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::config::VaultConfig;
use crate::error::{CResult, Error};
use crate::index::{IndexDb, VersionRecord, VersionSummary};
use crate::message::Message;
use crate::object_store::ObjectStore;
use crate::staging::{StagingArea, DELETED_SENTINEL};
use crate::util::{self, KCUBE_DIR};

/// The six disjoint lists `get_status` returns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusReport {
    pub staged_new: Vec<String>,
    pub staged_modified: Vec<String>,
    pub staged_deleted: Vec<String>,
    pub unstaged_modified: Vec<String>,
    pub unstaged_deleted: Vec<String>,
    pub untracked: Vec<String>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.staged_new.is_empty()
            && self.staged_modified.is_empty()
            && self.staged_deleted.is_empty()
            && self.unstaged_modified.is_empty()
            && self.unstaged_deleted.is_empty()
            && self.untracked.is_empty()
    }
}

#[derive(Debug)]
pub struct Repository {
    root: PathBuf,
    object_store: ObjectStore,
    index: IndexDb,
    staging: StagingArea,
    config: VaultConfig,
    config_path: PathBuf,
}

impl Repository {
    fn kcube_dir(root: &Path) -> PathBuf {
        root.join(KCUBE_DIR)
    }

    /// Creates a fresh vault at `path`. Fails if any ancestor of `path`
    /// (inclusive) already contains a `.kcube/`.
    pub fn initialize(path: &Path) -> CResult<Self> {
        if util::find_vault_root(path).is_some() {
            return Err(Error::AlreadyAVault(path.to_path_buf()));
        }
        let root = path.to_path_buf();
        std::fs::create_dir_all(&root)?;
        let kcube_dir = Self::kcube_dir(&root);
        std::fs::create_dir_all(&kcube_dir)?;
        std::fs::create_dir_all(kcube_dir.join("versions"))?;

        let object_store = ObjectStore::new(kcube_dir.join("versions"))?;
        let index = IndexDb::open(kcube_dir.join("index.db"))?;
        let staging = StagingArea::load(kcube_dir.join("staging.json"))?;
        staging.persist()?;

        let config = VaultConfig::new(Uuid::new_v4().to_string(), String::new());
        let config_path = kcube_dir.join("config.json");
        config.persist(&config_path)?;

        log::info!("initialized K-Cube vault at {}", root.display());
        Ok(Self { root, object_store, index, staging, config, config_path })
    }

    /// Walks upward from `path` looking for the first ancestor containing
    /// `.kcube/` and opens the repository there.
    pub fn find(path: &Path) -> CResult<Self> {
        let root = util::find_vault_root(path).ok_or(Error::NotAVault)?;
        Self::open(root)
    }

    fn open(root: PathBuf) -> CResult<Self> {
        let kcube_dir = Self::kcube_dir(&root);
        let object_store = ObjectStore::new(kcube_dir.join("versions"))?;
        let index = IndexDb::open(kcube_dir.join("index.db"))?;
        let staging = StagingArea::load(kcube_dir.join("staging.json"))?;
        let config_path = kcube_dir.join("config.json");
        let config = VaultConfig::load(&config_path)?;
        Ok(Self { root, object_store, index, staging, config, config_path })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn set_remote_url(&mut self, remote_url: impl Into<String>) -> CResult<()> {
        self.config.remote_url = remote_url.into();
        self.config.persist(&self.config_path)
    }

    /// Binds this local vault to a server-assigned vault id, replacing the
    /// client-generated one `initialize` picks provisionally.
    pub fn set_remote_url_and_id(&mut self, remote_url: impl Into<String>, vault_id: impl Into<String>) -> CResult<()> {
        self.config.remote_url = remote_url.into();
        self.config.vault_id = vault_id.into();
        self.config.persist(&self.config_path)
    }

    pub fn object_store(&self) -> &ObjectStore {
        &self.object_store
    }

    pub fn index_mut(&mut self) -> &mut IndexDb {
        &mut self.index
    }

    // -- path helpers --------------------------------------------------

    /// Resolves a user-supplied path (absolute, or relative to the vault
    /// root) to an absolute path lexically inside the vault, without
    /// requiring the path to exist (deleted files must resolve too).
    fn resolve(&self, raw: &Path) -> CResult<PathBuf> {
        let joined = if raw.is_absolute() { raw.to_path_buf() } else { self.root.join(raw) };
        let normalized = normalize_lexically(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(Error::PathOutsideVault(raw.to_path_buf()));
        }
        Ok(normalized)
    }

    fn rel_path(&self, abs: &Path) -> CResult<String> {
        let rel = abs.strip_prefix(&self.root).map_err(|_| Error::PathOutsideVault(abs.to_path_buf()))?;
        Ok(rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/"))
    }

    fn is_inside_kcube_dir(path: &Path) -> bool {
        path.components().any(|c| c.as_os_str() == KCUBE_DIR)
    }

    fn walk_files(&self, dir: &Path) -> CResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(&current)? {
                let entry = entry?;
                let path = entry.path();
                if Self::is_inside_kcube_dir(&path) {
                    continue;
                }
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    // -- manifests -------------------------------------------------------

    fn last_commit_manifest(&mut self) -> CResult<BTreeMap<String, String>> {
        match self.index.latest_version_hash()? {
            Some(hash) => self.index.version_manifest(&hash),
            None => Ok(BTreeMap::new()),
        }
    }

    fn working_tree_manifest(&self) -> CResult<BTreeMap<String, String>> {
        let mut manifest = BTreeMap::new();
        for file in self.walk_files(&self.root)? {
            let rel = self.rel_path(&file)?;
            let bytes = std::fs::read(&file)?;
            let compressed = util::compress(&bytes)?;
            manifest.insert(rel, util::sha256_hex(&compressed));
        }
        Ok(manifest)
    }

    fn tracked_paths(&mut self) -> CResult<BTreeSet<String>> {
        let last = self.last_commit_manifest()?;
        let mut tracked: BTreeSet<String> = last.into_keys().collect();
        tracked.extend(self.staging.iter().map(|(p, _)| p.to_string()));
        Ok(tracked)
    }

    // -- status ------------------------------------------------------------

    pub fn get_status(&mut self) -> CResult<StatusReport> {
        let last = self.last_commit_manifest()?;
        let working = self.working_tree_manifest()?;

        let mut report = StatusReport::default();

        // staged changes = staging vs last commit
        let mut combined = last.clone();
        for (path, value) in self.staging.iter() {
            if value == DELETED_SENTINEL {
                report.staged_deleted.push(path.to_string());
                combined.remove(path);
            } else if !last.contains_key(path) {
                report.staged_new.push(path.to_string());
                combined.insert(path.to_string(), value.to_string());
            } else if last.get(path).map(String::as_str) != Some(value) {
                report.staged_modified.push(path.to_string());
                combined.insert(path.to_string(), value.to_string());
            } else {
                combined.insert(path.to_string(), value.to_string());
            }
        }

        // unstaged = working tree vs (staging overlayed on last commit)
        for (path, hash) in &combined {
            match working.get(path) {
                Some(working_hash) if working_hash != hash => {
                    report.unstaged_modified.push(path.clone());
                }
                None => report.unstaged_deleted.push(path.clone()),
                _ => {}
            }
        }

        // untracked = in working tree but in neither staging nor last commit
        let staged_paths: BTreeSet<&str> = self.staging.iter().map(|(p, _)| p).collect();
        for path in working.keys() {
            if !staged_paths.contains(path.as_str()) && !last.contains_key(path) {
                report.untracked.push(path.clone());
            }
        }

        report.staged_new.sort();
        report.staged_modified.sort();
        report.staged_deleted.sort();
        report.unstaged_modified.sort();
        report.unstaged_deleted.sort();
        report.untracked.sort();
        Ok(report)
    }

    // -- add / reset ---------------------------------------------------

    fn stage_existing_file(&mut self, abs: &Path) -> CResult<()> {
        let rel = self.rel_path(abs)?;
        let bytes = std::fs::read(abs)?;
        let compressed = util::compress(&bytes)?;
        let hash = util::sha256_hex(&compressed);
        if !self.index.blob_exists(&hash)? {
            self.object_store.write_blob(&hash, &compressed)?;
            self.index.insert_blob(&hash, bytes.len() as u64, compressed.len() as u64)?;
        }
        self.staging.set_hash(rel, hash);
        Ok(())
    }

    pub fn add(&mut self, paths: &[PathBuf]) -> CResult<()> {
        let tracked = self.tracked_paths()?;

        for raw in paths {
            let abs = self.resolve(raw)?;
            if abs.is_dir() {
                for file in self.walk_files(&abs)? {
                    self.stage_existing_file(&file)?;
                }
                let rel_prefix = self.rel_path(&abs)?;
                for rel in &tracked {
                    let under_dir = rel_prefix.is_empty()
                        || *rel == rel_prefix
                        || rel.starts_with(&format!("{rel_prefix}/"));
                    if under_dir && !self.root.join(rel).is_file() {
                        self.staging.set_deleted(rel.clone());
                    }
                }
            } else if abs.is_file() {
                self.stage_existing_file(&abs)?;
            } else {
                let rel = self.rel_path(&abs)?;
                if tracked.contains(&rel) {
                    self.staging.set_deleted(rel);
                }
                // a never-tracked, nonexistent path is a no-op.
            }
        }

        self.staging.persist()
    }

    pub fn reset(&mut self, paths: &[PathBuf]) -> CResult<()> {
        if paths.is_empty() {
            self.staging.clear();
        } else {
            for raw in paths {
                let abs = self.resolve(raw)?;
                let rel = self.rel_path(&abs)?;
                self.staging.remove(&rel);
            }
        }
        self.staging.persist()
    }

    // -- commit / revert -------------------------------------------------

    fn apply_staging(last: &BTreeMap<String, String>, staging: &StagingArea) -> BTreeMap<String, String> {
        let mut manifest = last.clone();
        for (path, value) in staging.iter() {
            if value == DELETED_SENTINEL {
                manifest.remove(path);
            } else {
                manifest.insert(path.to_string(), value.to_string());
            }
        }
        manifest
    }

    pub fn commit(&mut self, message: Message) -> CResult<VersionSummary> {
        if self.staging.is_empty() {
            return Err(Error::EmptyStagingCommit);
        }
        let last = self.last_commit_manifest()?;
        let new_manifest = Self::apply_staging(&last, &self.staging);
        let timestamp = util::now_epoch();
        let hash = version_hash(timestamp, &message, &new_manifest)?;

        self.index.insert_version(&VersionRecord {
            hash: hash.clone(),
            timestamp,
            message: message.clone(),
            manifest: new_manifest,
        })?;

        self.staging.clear();
        self.staging.persist()?;

        log::info!("committed {} ({})", &hash[..12.min(hash.len())], message.summary);
        Ok(VersionSummary { hash, timestamp, message })
    }

    pub fn revert(&mut self, version_prefix: &str) -> CResult<VersionSummary> {
        let target_hash = self.index.resolve_prefix(version_prefix)?;
        let target_manifest = self.index.version_manifest(&target_hash)?;
        let parent_manifest = match self.index.parent_version_hash(&target_hash)? {
            Some(parent) => self.index.version_manifest(&parent)?,
            None => BTreeMap::new(),
        };

        let mut new_manifest = self.last_commit_manifest()?;
        for path in target_manifest.keys() {
            match parent_manifest.get(path) {
                Some(value) => {
                    new_manifest.insert(path.clone(), value.clone());
                }
                None => {
                    new_manifest.remove(path);
                }
            }
        }
        for (path, value) in &parent_manifest {
            if !target_manifest.contains_key(path) {
                new_manifest.insert(path.clone(), value.clone());
            }
        }

        let message = Message::revert(
            format!("Revert {}", &target_hash[..12.min(target_hash.len())]),
            target_hash.clone(),
        );
        let timestamp = util::now_epoch();
        let hash = version_hash(timestamp, &message, &new_manifest)?;

        self.index.insert_version(&VersionRecord {
            hash: hash.clone(),
            timestamp,
            message: message.clone(),
            manifest: new_manifest,
        })?;

        log::info!("reverted {} as {}", &target_hash[..12.min(target_hash.len())], &hash[..12.min(hash.len())]);
        Ok(VersionSummary { hash, timestamp, message })
    }

    // -- restore -----------------------------------------------------------

    fn write_from_blob(&self, rel: &str, blob_hash: &str) -> CResult<()> {
        let dest = self.root.join(rel);
        if let Some(dir) = dest.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let bytes = self.object_store.read_blob(blob_hash)?;
        std::fs::write(dest, bytes)?;
        Ok(())
    }

    fn remove_if_present(&self, rel: &str) -> CResult<()> {
        let dest = self.root.join(rel);
        if dest.is_file() {
            std::fs::remove_file(dest)?;
        }
        Ok(())
    }

    pub fn restore(&mut self, version_prefix: &str, path: Option<&str>, hard: bool) -> CResult<()> {
        let hash = self.index.resolve_prefix(version_prefix)?;
        let manifest = self.index.version_manifest(&hash)?;

        if let Some(path) = path {
            match manifest.get(path) {
                Some(blob_hash) => self.write_from_blob(path, blob_hash)?,
                None => self.remove_if_present(path)?,
            }
            return Ok(());
        }

        let last = self.last_commit_manifest()?;
        let mut previously_tracked: BTreeSet<String> = last.into_keys().collect();
        previously_tracked.extend(self.staging.iter().map(|(p, _)| p.to_string()));

        for (path, blob_hash) in &manifest {
            self.write_from_blob(path, blob_hash)?;
        }
        for path in &previously_tracked {
            if !manifest.contains_key(path) {
                self.remove_if_present(path)?;
            }
        }

        if hard {
            for file in self.walk_files(&self.root)? {
                let rel = self.rel_path(&file)?;
                if !manifest.contains_key(&rel) {
                    std::fs::remove_file(file)?;
                }
            }
        }

        self.staging.clear();
        self.staging.persist()?;
        Ok(())
    }

    // -- history -----------------------------------------------------------

    pub fn get_history(&mut self, path: Option<&str>) -> CResult<Vec<VersionSummary>> {
        self.index.history(path)
    }
}

/// Canonical JSON serialization of `{timestamp, message, manifest}` with
/// sorted keys, hashed with SHA-256. `serde_json::Value`'s `Map` is a
/// `BTreeMap` here (the `preserve_order` feature is not enabled), so object
/// keys serialize in sorted order at every nesting level.
fn version_hash(timestamp: i64, message: &Message, manifest: &BTreeMap<String, String>) -> CResult<String> {
    let value = serde_json::json!({
        "timestamp": timestamp,
        "message": message,
        "manifest": manifest,
    });
    let canonical = serde_json::to_vec(&value)?;
    Ok(util::sha256_hex(&canonical))
}

/// Resolves `.`/`..` components without touching the filesystem, so paths
/// that no longer exist (deletions) can still be validated and rel-pathed.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::initialize(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn initialize_rejects_nested_vault() {
        let (dir, _repo) = init_repo();
        let err = Repository::initialize(&dir.path().join("sub")).unwrap_err();
        assert!(matches!(err, Error::AlreadyAVault(_)));
    }

    #[test]
    fn fresh_vault_is_clean() {
        let (_dir, mut repo) = init_repo();
        assert!(repo.get_status().unwrap().is_clean());
        assert!(repo.get_history(None).unwrap().is_empty());
    }

    #[test]
    fn add_then_commit_end_to_end() {
        let (dir, mut repo) = init_repo();
        std::fs::write(dir.path().join("note1.md"), "This is note 1.").unwrap();

        repo.add(&[dir.path().join("note1.md")]).unwrap();
        let status = repo.get_status().unwrap();
        assert_eq!(status.staged_new, vec!["note1.md".to_string()]);

        let summary = repo.commit(Message::new("Add note 1")).unwrap();
        assert_eq!(summary.message.summary, "Add note 1");
        assert!(repo.get_status().unwrap().is_clean());

        let history = repo.get_history(None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message.summary, "Add note 1");
    }

    #[test]
    fn commit_with_empty_staging_fails() {
        let (_dir, mut repo) = init_repo();
        let err = repo.commit(Message::new("nothing")).unwrap_err();
        assert!(matches!(err, Error::EmptyStagingCommit));
    }

    #[test]
    fn restore_single_file_from_earlier_version() {
        let (dir, mut repo) = init_repo();
        let note = dir.path().join("note1.md");
        std::fs::write(&note, "This is note 1.").unwrap();
        repo.add(&[note.clone()]).unwrap();
        let v1 = repo.commit(Message::new("Add note 1")).unwrap();

        std::fs::write(&note, "v2").unwrap();
        repo.add(&[note.clone()]).unwrap();
        repo.commit(Message::new("v2")).unwrap();

        repo.restore(&v1.hash, Some("note1.md"), false).unwrap();
        assert_eq!(std::fs::read_to_string(&note).unwrap(), "This is note 1.");

        let status = repo.get_status().unwrap();
        assert_eq!(status.unstaged_modified, vec!["note1.md".to_string()]);
    }

    #[test]
    fn add_dot_then_reset_reports_unstaged_deleted() {
        let (dir, mut repo) = init_repo();
        std::fs::write(dir.path().join("a.md"), "A").unwrap();
        std::fs::write(dir.path().join("b.md"), "B").unwrap();
        repo.add(&[dir.path().to_path_buf()]).unwrap();
        repo.commit(Message::new("seed")).unwrap();

        std::fs::remove_file(dir.path().join("b.md")).unwrap();
        repo.add(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(repo.get_status().unwrap().staged_deleted, vec!["b.md".to_string()]);

        repo.reset(&[PathBuf::from("b.md")]).unwrap();
        assert!(repo.get_status().unwrap().staged_deleted.is_empty());
        assert_eq!(repo.get_status().unwrap().unstaged_deleted, vec!["b.md".to_string()]);
    }

    #[test]
    fn add_outside_vault_is_rejected() {
        let (_dir, mut repo) = init_repo();
        let outside = tempfile::tempdir().unwrap();
        let file = outside.path().join("x.md");
        std::fs::write(&file, "x").unwrap();
        let err = repo.add(&[file]).unwrap_err();
        assert!(matches!(err, Error::PathOutsideVault(_)));
    }

    #[test]
    fn add_never_tracked_missing_path_is_noop() {
        let (dir, mut repo) = init_repo();
        repo.add(&[dir.path().join("ghost.md")]).unwrap();
        assert!(repo.get_status().unwrap().is_clean());
    }

    #[test]
    fn revert_removes_file_added_by_target_version() {
        let (dir, mut repo) = init_repo();
        std::fs::write(dir.path().join("a.md"), "A").unwrap();
        repo.add(&[dir.path().to_path_buf()]).unwrap();
        let v1 = repo.commit(Message::new("add a")).unwrap();

        std::fs::write(dir.path().join("x.md"), "X").unwrap();
        repo.add(&[dir.path().to_path_buf()]).unwrap();
        let v2 = repo.commit(Message::new("add x")).unwrap();

        let reverted = repo.revert(&v2.hash).unwrap();
        let manifest = repo.index_mut().version_manifest(&reverted.hash).unwrap();
        assert!(!manifest.contains_key("x.md"));
        assert!(manifest.contains_key("a.md"));

        let history = repo.get_history(None).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().any(|v| v.hash == v1.hash));
        assert!(history.iter().any(|v| v.hash == v2.hash));
    }

    #[test]
    fn add_is_idempotent() {
        let (dir, mut repo) = init_repo();
        std::fs::write(dir.path().join("a.md"), "A").unwrap();
        repo.add(&[dir.path().to_path_buf()]).unwrap();
        let first = repo.get_status().unwrap();
        repo.add(&[dir.path().to_path_buf()]).unwrap();
        let second = repo.get_status().unwrap();
        assert_eq!(first, second);
    }
}
