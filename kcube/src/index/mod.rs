//! The index database: a hand-rolled relational layer over the vault's own
//! [`LogCask`] engine. Row families are namespaced by key prefix rather than
//! by separate tables, since a single `LogCask` file backs everything:
//!
//! - `blob:<hash>` → `{uncompressed_size, compressed_size}`
//! - `version:<hash>` → `{timestamp, message}`
//! - `byts:<be_u64(timestamp)><hash>` → `<hash>`, an ordered secondary index
//!   used for latest-version and history queries
//! - `vf:<version_hash>\0<path>` → `<blob_hash>`, the version→file→blob rows
//!
//! Multi-row writes are issued as a batch of `set` calls followed by one
//! `flush()`; there is no rollback if a `set` in the middle fails; the index
//! is then treated as corrupt, the practical equivalent of "commit as a
//! single transaction" without an external database (see DESIGN.md).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::message::Message;
use crate::storage::engine::Engine;
use crate::storage::log_cask::LogCask;

const BLOB_PREFIX: &[u8] = b"blob:";
const VERSION_PREFIX: &[u8] = b"version:";
const BY_TIMESTAMP_PREFIX: &[u8] = b"byts:";
const VERSION_FILE_PREFIX: &[u8] = b"vf:";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct BlobRow {
    uncompressed_size: u64,
    compressed_size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct VersionRow {
    timestamp: i64,
    message: Message,
}

/// A version row as returned by history/lookup queries.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionSummary {
    pub hash: String,
    pub timestamp: i64,
    pub message: Message,
}

/// A version plus its full manifest, ready to insert (local commit or a
/// downloaded record from the synchronizer).
#[derive(Clone, Debug)]
pub struct VersionRecord {
    pub hash: String,
    pub timestamp: i64,
    pub message: Message,
    pub manifest: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct IndexDb {
    engine: LogCask,
}

impl IndexDb {
    /// Opens (or creates) the index database at `<vault>/.kcube/index.db`.
    pub fn open(path: PathBuf) -> CResult<Self> {
        Ok(Self { engine: LogCask::new(path)? })
    }

    fn blob_key(hash: &str) -> Vec<u8> {
        [BLOB_PREFIX, hash.as_bytes()].concat()
    }

    fn version_key(hash: &str) -> Vec<u8> {
        [VERSION_PREFIX, hash.as_bytes()].concat()
    }

    fn by_timestamp_key(timestamp: i64, hash: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(BY_TIMESTAMP_PREFIX.len() + 8 + hash.len());
        key.extend_from_slice(BY_TIMESTAMP_PREFIX);
        key.extend_from_slice(&(timestamp as u64).to_be_bytes());
        key.extend_from_slice(hash.as_bytes());
        key
    }

    fn version_file_key(version_hash: &str, path: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(VERSION_FILE_PREFIX.len() + version_hash.len() + 1 + path.len());
        key.extend_from_slice(VERSION_FILE_PREFIX);
        key.extend_from_slice(version_hash.as_bytes());
        key.push(0);
        key.extend_from_slice(path.as_bytes());
        key
    }

    fn version_file_prefix(version_hash: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(VERSION_FILE_PREFIX.len() + version_hash.len() + 1);
        key.extend_from_slice(VERSION_FILE_PREFIX);
        key.extend_from_slice(version_hash.as_bytes());
        key.push(0);
        key
    }

    pub fn blob_exists(&mut self, hash: &str) -> CResult<bool> {
        Ok(self.engine.get(&Self::blob_key(hash))?.is_some())
    }

    pub fn insert_blob(&mut self, hash: &str, uncompressed_size: u64, compressed_size: u64) -> CResult<()> {
        let row = BlobRow { uncompressed_size, compressed_size };
        self.engine.set(&Self::blob_key(hash), serde_json::to_vec(&row)?)?;
        self.engine.flush()?;
        Ok(())
    }

    pub fn all_blob_hashes(&mut self) -> CResult<Vec<String>> {
        let mut hashes = Vec::new();
        for item in self.engine.scan_prefix(BLOB_PREFIX) {
            let (key, _) = item?;
            hashes.push(String::from_utf8_lossy(&key[BLOB_PREFIX.len()..]).into_owned());
        }
        Ok(hashes)
    }

    fn version_exists(&mut self, hash: &str) -> CResult<bool> {
        Ok(self.engine.get(&Self::version_key(hash))?.is_some())
    }

    pub fn all_version_hashes(&mut self) -> CResult<Vec<String>> {
        let mut hashes = Vec::new();
        for item in self.engine.scan_prefix(VERSION_PREFIX) {
            let (key, _) = item?;
            hashes.push(String::from_utf8_lossy(&key[VERSION_PREFIX.len()..]).into_owned());
        }
        Ok(hashes)
    }

    /// Inserts a version and its manifest rows as one logical write. The
    /// referenced blob hashes must already exist (foreign-key check),
    /// matching the spec's requirement that blobs precede versions locally.
    pub fn insert_version(&mut self, record: &VersionRecord) -> CResult<()> {
        for blob_hash in record.manifest.values() {
            if !self.blob_exists(blob_hash)? {
                return Err(Error::CorruptStore(format!(
                    "version {} references unknown blob {}",
                    record.hash, blob_hash
                )));
            }
        }

        let row = VersionRow { timestamp: record.timestamp, message: record.message.clone() };
        self.engine.set(&Self::version_key(&record.hash), serde_json::to_vec(&row)?)?;
        self.engine.set(
            &Self::by_timestamp_key(record.timestamp, &record.hash),
            record.hash.as_bytes().to_vec(),
        )?;
        for (path, blob_hash) in &record.manifest {
            self.engine.set(&Self::version_file_key(&record.hash, path), blob_hash.as_bytes().to_vec())?;
        }
        self.engine.flush()?;
        Ok(())
    }

    /// Inserts a batch of downloaded versions, skipping any hash already
    /// present (idempotent bulk insert, per spec §4.2).
    pub fn bulk_insert_versions(&mut self, records: &[VersionRecord]) -> CResult<()> {
        for record in records {
            if self.version_exists(&record.hash)? {
                continue;
            }
            self.insert_version(record)?;
        }
        Ok(())
    }

    pub fn version_message(&mut self, hash: &str) -> CResult<Option<VersionSummary>> {
        let Some(bytes) = self.engine.get(&Self::version_key(hash))? else {
            return Ok(None);
        };
        let row: VersionRow = serde_json::from_slice(&bytes)?;
        Ok(Some(VersionSummary { hash: hash.to_string(), timestamp: row.timestamp, message: row.message }))
    }

    pub fn version_manifest(&mut self, hash: &str) -> CResult<BTreeMap<String, String>> {
        let mut manifest = BTreeMap::new();
        let prefix = Self::version_file_prefix(hash);
        for item in self.engine.scan_prefix(&prefix) {
            let (key, value) = item?;
            let path = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            let blob_hash = String::from_utf8_lossy(&value).into_owned();
            manifest.insert(path, blob_hash);
        }
        Ok(manifest)
    }

    pub fn blob_hash_for_file(&mut self, version_hash: &str, path: &str) -> CResult<Option<String>> {
        let key = Self::version_file_key(version_hash, path);
        Ok(self.engine.get(&key)?.map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// All version hashes in timestamp order (ascending, oldest first).
    fn ordered_version_hashes(&mut self) -> CResult<Vec<String>> {
        let mut hashes = Vec::new();
        for item in self.engine.scan_prefix(BY_TIMESTAMP_PREFIX) {
            let (_, value) = item?;
            hashes.push(String::from_utf8_lossy(&value).into_owned());
        }
        Ok(hashes)
    }

    pub fn latest_version_hash(&mut self) -> CResult<Option<String>> {
        Ok(self.ordered_version_hashes()?.pop())
    }

    /// Parent version: the one with the largest timestamp strictly less than
    /// `hash`'s own. `None` if `hash` is the first version.
    pub fn parent_version_hash(&mut self, hash: &str) -> CResult<Option<String>> {
        let ordered = self.ordered_version_hashes()?;
        let pos = ordered.iter().position(|h| h == hash);
        match pos {
            Some(0) | None => Ok(None),
            Some(i) => Ok(Some(ordered[i - 1].clone())),
        }
    }

    /// Versions ordered by timestamp descending, optionally filtered to
    /// those whose manifest contains `path`.
    pub fn history(&mut self, path: Option<&str>) -> CResult<Vec<VersionSummary>> {
        let mut ordered = self.ordered_version_hashes()?;
        ordered.reverse();

        let mut out = Vec::new();
        for hash in ordered {
            if let Some(path) = path {
                if self.blob_hash_for_file(&hash, path)?.is_none() {
                    continue;
                }
            }
            if let Some(summary) = self.version_message(&hash)? {
                out.push(summary);
            }
        }
        Ok(out)
    }

    /// Resolves a (possibly short) hex prefix to exactly one version hash.
    pub fn resolve_prefix(&mut self, prefix: &str) -> CResult<String> {
        let mut matches: Vec<String> =
            self.all_version_hashes()?.into_iter().filter(|h| h.starts_with(prefix)).collect();
        match matches.len() {
            0 => Err(Error::UnknownVersion(prefix.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::AmbiguousVersion(prefix.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, IndexDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = IndexDb::open(dir.path().join("index.db")).unwrap();
        (dir, db)
    }

    fn record(hash: &str, timestamp: i64, files: &[(&str, &str)]) -> VersionRecord {
        VersionRecord {
            hash: hash.to_string(),
            timestamp,
            message: Message::new("test"),
            manifest: files.iter().map(|(p, b)| (p.to_string(), b.to_string())).collect(),
        }
    }

    #[test]
    fn insert_version_rejects_unknown_blob() {
        let (_dir, mut db) = open();
        let err = db.insert_version(&record("v1", 1, &[("a.md", "deadbeef")])).unwrap_err();
        assert!(matches!(err, Error::CorruptStore(_)));
    }

    #[test]
    fn insert_and_query_version() {
        let (_dir, mut db) = open();
        db.insert_blob("deadbeef", 10, 5).unwrap();
        db.insert_version(&record("v1", 100, &[("a.md", "deadbeef")])).unwrap();

        assert_eq!(db.latest_version_hash().unwrap(), Some("v1".to_string()));
        assert_eq!(db.version_manifest("v1").unwrap().get("a.md"), Some(&"deadbeef".to_string()));
        assert_eq!(db.blob_hash_for_file("v1", "a.md").unwrap(), Some("deadbeef".to_string()));
        assert_eq!(db.blob_hash_for_file("v1", "missing.md").unwrap(), None);
    }

    #[test]
    fn latest_tracks_timestamp_not_insertion_order() {
        let (_dir, mut db) = open();
        db.insert_blob("h1", 1, 1).unwrap();
        db.insert_version(&record("later", 200, &[("a.md", "h1")])).unwrap();
        db.insert_version(&record("earlier", 100, &[("a.md", "h1")])).unwrap();
        assert_eq!(db.latest_version_hash().unwrap(), Some("later".to_string()));
        assert_eq!(db.parent_version_hash("later").unwrap(), Some("earlier".to_string()));
        assert_eq!(db.parent_version_hash("earlier").unwrap(), None);
    }

    #[test]
    fn history_filters_by_path() {
        let (_dir, mut db) = open();
        db.insert_blob("h1", 1, 1).unwrap();
        db.insert_version(&record("v1", 100, &[("a.md", "h1")])).unwrap();
        db.insert_version(&record("v2", 200, &[("b.md", "h1")])).unwrap();

        let all = db.history(None).unwrap();
        assert_eq!(all.iter().map(|v| v.hash.clone()).collect::<Vec<_>>(), vec!["v2", "v1"]);

        let filtered = db.history(Some("a.md")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].hash, "v1");
    }

    #[test]
    fn resolve_prefix_classifies_ambiguous_and_unknown() {
        let (_dir, mut db) = open();
        db.insert_blob("h1", 1, 1).unwrap();
        db.insert_version(&record("aaaa1111", 1, &[("a.md", "h1")])).unwrap();
        db.insert_version(&record("aaaa2222", 2, &[("a.md", "h1")])).unwrap();

        assert!(matches!(db.resolve_prefix("zzzz").unwrap_err(), Error::UnknownVersion(_)));
        assert!(matches!(db.resolve_prefix("aaaa").unwrap_err(), Error::AmbiguousVersion(_)));
        assert_eq!(db.resolve_prefix("aaaa1").unwrap(), "aaaa1111");
    }

    #[test]
    fn bulk_insert_is_idempotent() {
        let (_dir, mut db) = open();
        db.insert_blob("h1", 1, 1).unwrap();
        let records = vec![record("v1", 100, &[("a.md", "h1")])];
        db.bulk_insert_versions(&records).unwrap();
        db.bulk_insert_versions(&records).unwrap();
        assert_eq!(db.all_version_hashes().unwrap(), vec!["v1".to_string()]);
    }
}
