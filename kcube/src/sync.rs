//! The synchronizer: a stateless protocol driver over a repository and an
//! API client. Computes the version-set diff with the server and transfers
//! the missing versions (and their referenced blobs) in both directions.

use std::collections::BTreeSet;

use crate::api_client::{ApiClient, BlobWire, VersionWire};
use crate::error::CResult;
use crate::index::VersionRecord;
use crate::repo::Repository;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncDirection {
    None,
    Upload,
    Download,
    Bidirectional,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncResult {
    pub uploaded: usize,
    pub downloaded: usize,
    pub direction: SyncDirection,
}

pub struct Synchronizer<'a> {
    repo: &'a mut Repository,
    api: &'a ApiClient,
    vault_id: String,
}

impl<'a> Synchronizer<'a> {
    pub fn new(repo: &'a mut Repository, api: &'a ApiClient, vault_id: impl Into<String>) -> Self {
        Self { repo, api, vault_id: vault_id.into() }
    }

    /// Computes the version-set diff with the server without transferring
    /// anything, so a caller can classify and emit the pre-transfer
    /// direction before driving the actual upload/download (spec §4.6 step
    /// 2-3: `check_sync_state` then `sync_started(direction)`).
    pub async fn plan(&mut self) -> CResult<(Vec<String>, Vec<String>)> {
        let local_hashes = self.repo.index_mut().all_version_hashes()?;
        let check = self.api.check_sync_state(&self.vault_id, &local_hashes).await?;
        Ok((check.versions_to_upload, check.versions_to_download))
    }

    /// Transfers the version sets computed by [`Self::plan`].
    pub async fn apply(&mut self, to_upload: &[String], to_download: &[String]) -> CResult<SyncResult> {
        let uploaded = if !to_upload.is_empty() { self.upload(to_upload).await? } else { 0 };
        let downloaded = if !to_download.is_empty() { self.download(to_download).await? } else { 0 };

        let direction = match (uploaded > 0, downloaded > 0) {
            (true, true) => SyncDirection::Bidirectional,
            (true, false) => SyncDirection::Upload,
            (false, true) => SyncDirection::Download,
            (false, false) => SyncDirection::None,
        };
        Ok(SyncResult { uploaded, downloaded, direction })
    }

    /// Runs one full reconciliation pass: upload local-only versions,
    /// download remote-only versions. Does not perform the post-download
    /// checkout; callers (the worker) are responsible for that (spec §4.4).
    pub async fn sync(&mut self) -> CResult<SyncResult> {
        let (to_upload, to_download) = self.plan().await?;
        self.apply(&to_upload, &to_download).await
    }

    async fn upload(&mut self, hashes: &[String]) -> CResult<usize> {
        let mut records = Vec::with_capacity(hashes.len());
        let mut blob_hashes: BTreeSet<String> = BTreeSet::new();
        for hash in hashes {
            let summary = self.repo.index_mut().version_message(hash)?;
            let manifest = self.repo.index_mut().version_manifest(hash)?;
            if let Some(summary) = summary {
                blob_hashes.extend(manifest.values().cloned());
                records.push(VersionWire {
                    hash: summary.hash,
                    timestamp: summary.timestamp,
                    message: summary.message,
                    manifest,
                });
            }
        }

        let mut blobs = Vec::with_capacity(blob_hashes.len());
        for hash in &blob_hashes {
            let compressed = self.repo.object_store().read_blob_compressed(hash)?;
            blobs.push(BlobWire { hash: hash.clone(), content_b64: base64_encode(&compressed) });
        }
        if !blobs.is_empty() {
            self.api.upload_blobs(&self.vault_id, &blobs).await?;
        }
        if !records.is_empty() {
            self.api.upload_versions(&self.vault_id, &records).await?;
        }
        Ok(records.len())
    }

    async fn download(&mut self, hashes: &[String]) -> CResult<usize> {
        let versions = self.api.download_versions(&self.vault_id, hashes).await?;

        let mut needed: BTreeSet<String> = BTreeSet::new();
        for version in &versions {
            for blob_hash in version.manifest.values() {
                if !self.repo.index_mut().blob_exists(blob_hash)? {
                    needed.insert(blob_hash.clone());
                }
            }
        }

        if !needed.is_empty() {
            let wanted: Vec<String> = needed.into_iter().collect();
            let blobs = self.api.download_blobs(&self.vault_id, &wanted).await?;
            for blob in blobs {
                let compressed = base64_decode(&blob.content_b64)?;
                self.repo.object_store().write_blob(&blob.hash, &compressed)?;
                let uncompressed = crate::util::decompress(&compressed)?;
                self.repo.index_mut().insert_blob(&blob.hash, uncompressed.len() as u64, compressed.len() as u64)?;
            }
        }

        let records: Vec<VersionRecord> = versions
            .into_iter()
            .map(|v| VersionRecord { hash: v.hash, timestamp: v.timestamp, message: v.message, manifest: v.manifest })
            .collect();
        let count = records.len();
        self.repo.index_mut().bulk_insert_versions(&records)?;
        Ok(count)
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> CResult<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| crate::error::Error::Internal(format!("invalid base64 blob content: {e}")))
}
