use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use fs2::FileExt;
use kh_auth::{SecureStore, StoreError};
use tokio::fs;
use tracing::{debug, error};

use crate::crypto::{self, EncryptedBlob};
use crate::errors::{Result, VaultError};
use crate::key_manager::{KeyManager, KeySettings};
use crate::passphrase::PassphraseSource;

/// Encrypted file-backed [`SecureStore`]
///
/// One file per identifier. File names are the base64url form of the
/// identifier, so any identifier is a safe file name. Every read goes to
/// disk, since other processes may share the directory.
///
/// # Directory Structure
/// ```text
/// ~/.config/keyhandle/vault/
/// ├── meta.json              # Key metadata (salt, KDF cost)
/// ├── lock                   # Advisory lock file
/// └── entries/
///     └── ZGVza3RvcA.json    # Encrypted value for "desktop"
/// ```
#[derive(Debug)]
pub struct FileSecureStore {
    entries_dir: PathBuf,
    lock_file: PathBuf,
    key_manager: KeyManager,
}

impl FileSecureStore {
    /// Open (and create if needed) a store rooted at `storage_dir`
    pub async fn new(
        storage_dir: impl AsRef<Path>,
        passphrase: Arc<dyn PassphraseSource>,
        settings: &KeySettings,
    ) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        let entries_dir = storage_dir.join("entries");
        let lock_file = storage_dir.join("lock");

        fs::create_dir_all(&entries_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&storage_dir, perms.clone())?;
            std::fs::set_permissions(&entries_dir, perms)?;
        }

        let key_manager = KeyManager::open(&storage_dir, passphrase.as_ref(), settings).await?;
        debug!(dir = %storage_dir.display(), "Opened file secure store");

        Ok(Self {
            entries_dir,
            lock_file,
            key_manager,
        })
    }

    /// Platform config directory for the store
    pub fn default_storage_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "keyhandle")
            .map(|dirs| dirs.config_dir().join("vault"))
    }

    fn entry_path(&self, identifier: &str) -> PathBuf {
        self.entries_dir
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(identifier)))
    }

    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| VaultError::LockTimeout)?;

        Ok(lock_file)
    }

    async fn read_entry(&self, identifier: &str) -> Result<Option<String>> {
        let path = self.entry_path(identifier);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let blob: EncryptedBlob =
            serde_json::from_str(&content).map_err(|_| VaultError::CorruptedStore)?;
        let plaintext = crypto::open(self.key_manager.key(), &blob, identifier)?;
        let value = String::from_utf8(plaintext).map_err(|_| VaultError::CorruptedStore)?;

        Ok(Some(value))
    }

    async fn write_entry(&self, identifier: &str, value: &str) -> Result<()> {
        let path = self.entry_path(identifier);
        let blob = crypto::seal(self.key_manager.key(), value.as_bytes(), identifier)?;
        let json = serde_json::to_string_pretty(&blob)?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json).await?;
        std::fs::File::open(&temp_path)?.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn delete_entry(&self, identifier: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(identifier)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl SecureStore for FileSecureStore {
    async fn get_string(&self, identifier: &str) -> Option<String> {
        match self.read_entry(identifier).await {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to read secure store entry: {e}");
                None
            }
        }
    }

    async fn save(&self, value: &str, identifier: &str) -> std::result::Result<(), StoreError> {
        let _lock = self.acquire_lock()?;
        self.write_entry(identifier, value).await?;
        Ok(())
    }

    async fn remove(&self, identifier: &str) -> std::result::Result<(), StoreError> {
        let _lock = self.acquire_lock()?;
        self.delete_entry(identifier).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_manager::KdfParams;
    use crate::passphrase::StaticPassphrase;
    use tempfile::TempDir;

    fn test_settings() -> KeySettings {
        KeySettings {
            keyring_service: None,
            kdf: KdfParams {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        }
    }

    async fn create_test_store(dir: &Path) -> FileSecureStore {
        FileSecureStore::new(
            dir,
            Arc::new(StaticPassphrase::new("test-passphrase")),
            &test_settings(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let temp = TempDir::new().unwrap();
        let store = create_test_store(temp.path()).await;

        store.save("access\trefresh\tBearer\t60.0\t299.0", "desktop").await.unwrap();
        assert_eq!(
            store.get_string("desktop").await.as_deref(),
            Some("access\trefresh\tBearer\t60.0\t299.0")
        );
        assert!(store.get_string("other").await.is_none());
    }

    #[tokio::test]
    async fn test_value_survives_reopen() {
        let temp = TempDir::new().unwrap();
        create_test_store(temp.path())
            .await
            .save("value", "desktop")
            .await
            .unwrap();

        let reopened = create_test_store(temp.path()).await;
        assert_eq!(reopened.get_string("desktop").await.as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_file_is_encrypted() {
        let temp = TempDir::new().unwrap();
        let store = create_test_store(temp.path()).await;
        store.save("plain-secret", "desktop").await.unwrap();

        let path = temp.path().join("entries").join("ZGVza3RvcA.json");
        let content = std::fs::read_to_string(path).unwrap();
        assert!(!content.contains("plain-secret"));
    }

    #[tokio::test]
    async fn test_overwrite_and_remove() {
        let temp = TempDir::new().unwrap();
        let store = create_test_store(temp.path()).await;

        store.save("first", "desktop").await.unwrap();
        store.save("second", "desktop").await.unwrap();
        assert_eq!(store.get_string("desktop").await.as_deref(), Some("second"));

        store.remove("desktop").await.unwrap();
        assert!(store.get_string("desktop").await.is_none());

        // Removing an absent entry is fine
        store.remove("desktop").await.unwrap();
    }

    #[tokio::test]
    async fn test_sees_changes_from_another_instance() {
        let temp = TempDir::new().unwrap();
        let reader = create_test_store(temp.path()).await;
        let writer = create_test_store(temp.path()).await;

        writer.save("first", "desktop").await.unwrap();
        assert_eq!(reader.get_string("desktop").await.as_deref(), Some("first"));

        writer.save("second", "desktop").await.unwrap();
        assert_eq!(reader.get_string("desktop").await.as_deref(), Some("second"));

        writer.remove("desktop").await.unwrap();
        assert!(reader.get_string("desktop").await.is_none());
    }

    #[tokio::test]
    async fn test_wrong_passphrase_reads_nothing() {
        let temp = TempDir::new().unwrap();
        create_test_store(temp.path())
            .await
            .save("value", "desktop")
            .await
            .unwrap();

        let other = FileSecureStore::new(
            temp.path(),
            Arc::new(StaticPassphrase::new("wrong")),
            &test_settings(),
        )
        .await
        .unwrap();
        assert!(other.get_string("desktop").await.is_none());
    }

    #[tokio::test]
    async fn test_held_lock_makes_store_unavailable() {
        let temp = TempDir::new().unwrap();
        let store = create_test_store(temp.path()).await;

        let _held = store.acquire_lock().unwrap();
        let result = store.save("value", "desktop").await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = create_test_store(temp.path()).await;
        store.save("value", "desktop").await.unwrap();

        let dir_mode = std::fs::metadata(temp.path().join("entries"))
            .unwrap()
            .permissions()
            .mode();
        let file_mode = std::fs::metadata(store.entry_path("desktop"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(file_mode & 0o777, 0o600);
    }
}
