use std::path::Path;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::EncryptionKey;
use crate::errors::{Result, VaultError};
use crate::passphrase::PassphraseSource;

const SALT_LEN: usize = 32;
const META_FILE: &str = "meta.json";

/// Argon2id cost parameters, recorded next to the salt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    // m=64MiB, t=3, p=1
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Contents of `meta.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMeta {
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Base64 salt for the passphrase-derived key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_salt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kdf: Option<KdfParams>,
}

impl Default for KeyMeta {
    fn default() -> Self {
        Self {
            version: 1,
            created_at: chrono::Utc::now(),
            passphrase_salt: None,
            kdf: None,
        }
    }
}

/// Where the file store key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySettings {
    /// OS keyring service holding the key; `None` skips the keyring entirely
    pub keyring_service: Option<String>,
    /// Cost used when a new salt is created
    pub kdf: KdfParams,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            keyring_service: Some(crate::DEFAULT_SERVICE.to_string()),
            kdf: KdfParams::default(),
        }
    }
}

/// Resolves the 32-byte key for a [`FileSecureStore`](crate::FileSecureStore)
///
/// Lookup order:
/// 1. the OS keyring entry, when a service is configured
/// 2. Argon2id over a passphrase, with the salt kept in `meta.json`
/// 3. a fresh random key, only if it can be saved to the keyring
pub struct KeyManager {
    meta: KeyMeta,
    key: EncryptionKey,
}

impl KeyManager {
    pub async fn open(
        storage_dir: &Path,
        passphrase: &dyn PassphraseSource,
        settings: &KeySettings,
    ) -> Result<Self> {
        let meta_path = storage_dir.join(META_FILE);
        let mut meta = if fs::try_exists(&meta_path).await? {
            let content = fs::read_to_string(&meta_path).await?;
            serde_json::from_str(&content).map_err(|_| VaultError::CorruptedStore)?
        } else {
            KeyMeta::default()
        };

        let service = settings.keyring_service.as_deref();
        let key = match service.map_or(Ok(None), os_keyring::load) {
            Ok(Some(key)) => {
                debug!("Loaded store key from OS keyring");
                key
            }
            result => {
                if let Err(e) = &result {
                    debug!("Keyring unavailable ({e}), falling back to passphrase");
                }
                Self::fallback_key(&mut meta, passphrase, settings.kdf, service).await?
            }
        };

        let meta_json = serde_json::to_string_pretty(&meta)?;
        fs::write(&meta_path, meta_json).await?;

        Ok(Self { meta, key })
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    pub fn meta(&self) -> &KeyMeta {
        &self.meta
    }

    async fn fallback_key(
        meta: &mut KeyMeta,
        passphrase: &dyn PassphraseSource,
        kdf: KdfParams,
        service: Option<&str>,
    ) -> Result<EncryptionKey> {
        if let Some(secret) = passphrase.passphrase("Enter passphrase for token storage").await {
            let key = derive_from_passphrase(meta, &secret, kdf)?;
            if let Some(service) = service
                && let Err(e) = os_keyring::save(service, &key)
            {
                warn!("Failed to cache store key in keyring: {e}");
            }
            return Ok(key);
        }

        // No passphrase: a random key is only usable if the keyring keeps it.
        let service = service.ok_or(VaultError::PassphraseUnavailable)?;
        let key = EncryptionKey::generate();
        os_keyring::save(service, &key).map_err(|e| {
            warn!("Cannot persist a generated store key: {e}");
            VaultError::PassphraseUnavailable
        })?;
        debug!("Generated new store key and saved it to the OS keyring");
        Ok(key)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("meta", &self.meta)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id key derivation; creates and records the salt on first use
fn derive_from_passphrase(
    meta: &mut KeyMeta,
    passphrase: &Zeroizing<String>,
    default_kdf: KdfParams,
) -> Result<EncryptionKey> {
    let salt = match &meta.passphrase_salt {
        Some(encoded) => STANDARD
            .decode(encoded)
            .map_err(|_| VaultError::CorruptedStore)?,
        None => {
            let mut salt = vec![0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            meta.passphrase_salt = Some(STANDARD.encode(&salt));
            meta.kdf = Some(default_kdf);
            salt
        }
    };
    let kdf = *meta.kdf.get_or_insert(default_kdf);

    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(32))
        .map_err(|e| VaultError::Crypto(format!("Invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), &salt, &mut key[..])
        .map_err(|e| VaultError::Crypto(format!("Key derivation failed: {e}")))?;

    Ok(EncryptionKey::from_bytes(*key))
}

#[cfg(feature = "keyring-support")]
mod os_keyring {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    use crate::crypto::EncryptionKey;
    use crate::errors::{Result, VaultError};

    const KEY_ACCOUNT: &str = "kh-vault:v1";

    pub fn load(service: &str) -> Result<Option<EncryptionKey>> {
        let entry = ::keyring::Entry::new(service, KEY_ACCOUNT)
            .map_err(|e| VaultError::Keyring(format!("Failed to access keyring: {e}")))?;

        let encoded = match entry.get_password() {
            Ok(encoded) => encoded,
            Err(::keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(VaultError::Keyring(format!("Failed to read from keyring: {e}"))),
        };

        let bytes: [u8; 32] = STANDARD
            .decode(encoded)
            .map_err(|_| VaultError::CorruptedStore)?
            .try_into()
            .map_err(|_| VaultError::CorruptedStore)?;
        Ok(Some(EncryptionKey::from_bytes(bytes)))
    }

    pub fn save(service: &str, key: &EncryptionKey) -> Result<()> {
        let entry = ::keyring::Entry::new(service, KEY_ACCOUNT)
            .map_err(|e| VaultError::Keyring(format!("Failed to access keyring: {e}")))?;
        entry
            .set_password(&STANDARD.encode(key.as_bytes()))
            .map_err(|e| VaultError::Keyring(format!("Failed to write to keyring: {e}")))
    }
}

#[cfg(not(feature = "keyring-support"))]
mod os_keyring {
    use crate::crypto::EncryptionKey;
    use crate::errors::{Result, VaultError};

    pub fn load(_service: &str) -> Result<Option<EncryptionKey>> {
        Err(VaultError::Keyring("built without keyring support".to_string()))
    }

    pub fn save(_service: &str, _key: &EncryptionKey) -> Result<()> {
        Err(VaultError::Keyring("built without keyring support".to_string()))
    }
}
