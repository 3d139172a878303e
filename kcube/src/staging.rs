//! The staging area: a serialized mapping `path -> blob-hash | DELETED`
//! representing the next commit. Persisted as one JSON document so it is
//! atomic to swap and small enough to rewrite wholesale.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::CResult;

pub const DELETED_SENTINEL: &str = "_DELETED_";

#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl StagingArea {
    /// Loads `<vault>/.kcube/staging.json`, or starts empty if absent.
    pub fn load(path: PathBuf) -> CResult<Self> {
        let entries = if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn get(&self, rel_path: &str) -> Option<&str> {
        self.entries.get(rel_path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn set_hash(&mut self, rel_path: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(rel_path.into(), hash.into());
    }

    pub fn set_deleted(&mut self, rel_path: impl Into<String>) {
        self.entries.insert(rel_path.into(), DELETED_SENTINEL.to_string());
    }

    pub fn remove(&mut self, rel_path: &str) {
        self.entries.remove(rel_path);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Atomically rewrites the staging file (write sibling temp + rename).
    pub fn persist(&self) -> CResult<()> {
        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.path.with_extension(format!("json.tmp-{}", std::process::id()));
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
