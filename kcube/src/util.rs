//! Hashing, compression, timestamps, and vault-root discovery.
//!
//! Kept deliberately small and dependency-light, the way the teacher's own
//! `storage` module sits underneath everything else without depending on it.

use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

use crate::error::CResult;

/// Name of the per-vault metadata directory.
pub const KCUBE_DIR: &str = ".kcube";

/// Computes the lower-hex SHA-256 digest of `content`.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Compresses `content` with zlib at the default compression level.
pub fn compress(content: &[u8]) -> CResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    Ok(encoder.finish()?)
}

/// Decompresses zlib-compressed `content`.
pub fn decompress(content: &[u8]) -> CResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(content);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Seconds since the Unix epoch, truncated to `i64`.
pub fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Walks upward from `start` looking for the first ancestor (inclusive)
/// containing a `.kcube` directory.
pub fn find_vault_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.canonicalize().ok()?;
    loop {
        if current.join(KCUBE_DIR).is_dir() {
            return Some(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_decompress_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let compressed = compress(&data).unwrap();
        assert_ne!(compressed, data);
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn compress_decompress_round_trips_empty() {
        let data: Vec<u8> = Vec::new();
        let compressed = compress(&data).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn sha256_hex_is_stable_and_64_chars() {
        let h1 = sha256_hex(b"hello");
        let h2 = sha256_hex(b"hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, sha256_hex(b"hellp"));
    }

    #[test]
    fn find_vault_root_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir(dir.path().join(KCUBE_DIR)).unwrap();

        let found = find_vault_root(&nested).unwrap();
        assert_eq!(found, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn find_vault_root_returns_none_outside_any_vault() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_vault_root(dir.path()).is_none());
    }
}
