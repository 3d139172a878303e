//! On-disk configuration documents: the per-vault `config.json` and the
//! process-wide daemon config at `~/.kcube/config.json`.

use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::error::{CResult, Error};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// `<vault>/.kcube/config.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub vault_id: String,
    pub remote_url: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

impl VaultConfig {
    pub fn new(vault_id: impl Into<String>, remote_url: impl Into<String>) -> Self {
        Self { vault_id: vault_id.into(), remote_url: remote_url.into(), schema_version: CURRENT_SCHEMA_VERSION }
    }

    pub fn load(path: &Path) -> CResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        if config.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(Error::CorruptStore(format!(
                "vault config schema version {} is newer than this binary understands ({})",
                config.schema_version, CURRENT_SCHEMA_VERSION
            )));
        }
        Ok(config)
    }

    pub fn persist(&self, path: &Path) -> CResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// The daemon's process-wide config, persisted at `~/.kcube/config.json`.
/// Not a vault config: it lists the vaults the daemon supervises.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub remote_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub vault_paths: Vec<PathBuf>,
}

impl DaemonConfig {
    pub fn load(path: &Path) -> CResult<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn persist(&self, path: &Path) -> CResult<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.api_token.is_some()
    }

    pub fn logout(&mut self) {
        self.api_token = None;
        self.user_email = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = VaultConfig::new("vault-1", "https://example.com");
        config.persist(&path).unwrap();

        let loaded = VaultConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn vault_config_rejects_future_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"vault_id":"v","remote_url":"https://x","schema_version":999}"#,
        )
        .unwrap();

        let err = VaultConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptStore(_)));
    }

    #[test]
    fn daemon_config_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load(&dir.path().join("config.json")).unwrap();
        assert!(!config.is_logged_in());
        assert!(config.vault_paths.is_empty());
    }

    #[test]
    fn daemon_config_logout_clears_token_and_email() {
        let mut config = DaemonConfig {
            api_token: Some("tok".to_string()),
            user_email: Some("a@b.com".to_string()),
            ..Default::default()
        };
        config.logout();
        assert!(!config.is_logged_in());
        assert!(config.user_email.is_none());
    }
}
