use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use kh_auth::{Configuration, HttpSettings};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub const CONFIG_FILE: &str = "keyhandle.toml";

/// Contents of `keyhandle.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Secure store entry the token is persisted under
    pub token_identifier: String,
    pub oauth: Configuration,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    pub automated: Option<AutomatedSettings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Keyring,
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// File store directory; the platform config dir when unset
    pub dir: Option<PathBuf>,
    pub keyring_service: String,
    /// Environment variable holding the file store passphrase
    pub passphrase_env: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dir: None,
            keyring_service: kh_vault::DEFAULT_SERVICE.to_string(),
            passphrase_env: "KEYHANDLE_PASSPHRASE".to_string(),
        }
    }
}

/// Selects a pre-provisioned test account instead of the interactive flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatedSettings {
    /// JSON catalog of test accounts
    pub catalog: PathBuf,
    /// Title of the account to log in as
    pub user: String,
}

impl Settings {
    /// Platform location of `keyhandle.toml`
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "keyhandle")
            .context("Could not determine the config directory")?;
        Ok(dirs.config_dir().join(CONFIG_FILE))
    }

    #[instrument(level = "debug")]
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        settings
            .oauth
            .validate()
            .with_context(|| format!("Invalid [oauth] section in {}", path.display()))?;

        debug!(backend = ?settings.storage.backend, "Loaded settings");
        Ok(settings)
    }

    /// Resolve a relative catalog path against the config file's directory
    pub fn catalog_path(&self, config_path: &Path) -> Option<PathBuf> {
        let automated = self.automated.as_ref()?;
        if automated.catalog.is_absolute() {
            return Some(automated.catalog.clone());
        }
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Some(base.join(&automated.catalog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
token_identifier = "desktop"

[oauth]
base_url = "https://sso.example.com"
client_id = "desktop"
authorize_path = "/auth"
token_path = "/token"
userinfo_path = "/userinfo"
redirect_url = "http://127.0.0.1:8765/callback"
redirect_scheme = "http"
scopes = ["openid", "profile"]
"#;

    #[tokio::test]
    async fn test_minimal_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, MINIMAL).unwrap();

        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(settings.token_identifier, "desktop");
        assert_eq!(settings.oauth.scopes, vec!["openid", "profile"]);
        assert_eq!(settings.http, HttpSettings::default());
        assert_eq!(settings.storage, StorageSettings::default());
        assert!(settings.automated.is_none());
    }

    #[tokio::test]
    async fn test_full_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        let content = format!(
            r#"{MINIMAL}
[http]
connect_timeout = 5
request_timeout = 10
user_agent = "tests"

[storage]
backend = "file"
dir = "/tmp/vault"

[automated]
catalog = "users.json"
user = "Test user"
"#
        );
        std::fs::write(&path, content).unwrap();

        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(settings.http.connect_timeout, Duration::from_secs(5));
        assert_eq!(settings.http.user_agent, "tests");
        assert_eq!(settings.storage.backend, StorageBackend::File);
        assert_eq!(settings.storage.dir, Some(PathBuf::from("/tmp/vault")));
        assert_eq!(settings.storage.keyring_service, "keyhandle");
        assert_eq!(
            settings.catalog_path(&path),
            Some(temp.path().join("users.json"))
        );
    }

    #[tokio::test]
    async fn test_invalid_oauth_section_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, MINIMAL.replace(r#"client_id = "desktop""#, r#"client_id = """#))
            .unwrap();

        assert!(Settings::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Settings::load(&temp.path().join("absent.toml")).await;
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
    }
}
