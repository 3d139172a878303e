//! Content-addressed on-disk store of compressed blobs.
//!
//! Blob `H` lives at `versions/<H[0..2]>/<H[2..]>`. The store only knows how
//! to read and write bytes by hash; whether a hash is "new" is the index
//! database's concern (`IndexDb::blob_exists`), matching the spec's split
//! between the object store and the index.

use std::path::{Path, PathBuf};

use crate::error::{CResult, Error};
use crate::util;

#[derive(Debug)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// `root` is `<vault>/.kcube/versions`.
    pub fn new(root: PathBuf) -> CResult<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join(&hash[0..2]).join(&hash[2..])
    }

    pub fn has_blob(&self, hash: &str) -> bool {
        self.blob_path(hash).is_file()
    }

    /// Writes already zlib-compressed bytes under `hash`, atomically. A
    /// no-op if the blob file already exists.
    pub fn write_blob(&self, hash: &str, compressed: &[u8]) -> CResult<()> {
        let path = self.blob_path(hash);
        if path.is_file() {
            return Ok(());
        }
        let dir = path.parent().expect("blob path always has a parent");
        std::fs::create_dir_all(dir)?;

        let tmp_path = dir.join(format!("{}.tmp-{}", &hash[2..], std::process::id()));
        std::fs::write(&tmp_path, compressed)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Reads and zlib-decompresses the blob for `hash`.
    pub fn read_blob(&self, hash: &str) -> CResult<Vec<u8>> {
        let path = self.blob_path(hash);
        let compressed = std::fs::read(&path)
            .map_err(|_| Error::CorruptStore(format!("missing blob file for {hash}")))?;
        util::decompress(&compressed)
    }

    /// Reads the raw compressed bytes for `hash`, for sync uploads.
    pub fn read_blob_compressed(&self, hash: &str) -> CResult<Vec<u8>> {
        let path = self.blob_path(hash);
        std::fs::read(&path).map_err(|_| Error::CorruptStore(format!("missing blob file for {hash}")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
