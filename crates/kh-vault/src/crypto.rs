use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::errors::{Result, VaultError};

const NONCE_LEN: usize = 12;
const FORMAT_VERSION: &str = "v1";

/// AES-256 key (32 bytes)
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    /// Raw key bytes; never log these
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// One encrypted store entry as written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// Base64url nonce (12 bytes)
    pub nonce: String,
    /// Base64url ciphertext with the GCM tag appended
    pub ciphertext: String,
    pub version: String,
}

// Binds a blob to the identifier it was written under.
fn associated_data(version: &str, identifier: &str) -> Vec<u8> {
    format!("kh-vault|{version}|{identifier}").into_bytes()
}

/// Encrypt `plaintext` for the entry named `identifier`
pub fn seal(key: &EncryptionKey, plaintext: &[u8], identifier: &str) -> Result<EncryptedBlob> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let aad = associated_data(FORMAT_VERSION, identifier);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|e| VaultError::Crypto(format!("Encryption failed: {e}")))?;

    Ok(EncryptedBlob {
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        version: FORMAT_VERSION.to_string(),
    })
}

/// Decrypt a blob written for `identifier`
///
/// A wrong key, a tampered blob and a blob moved to another identifier all
/// surface as [`VaultError::CorruptedStore`].
pub fn open(key: &EncryptionKey, blob: &EncryptedBlob, identifier: &str) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&blob.nonce)
        .map_err(|_| VaultError::CorruptedStore)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(VaultError::CorruptedStore);
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(&blob.ciphertext)
        .map_err(|_| VaultError::CorruptedStore)?;

    let aad = associated_data(&blob.version, identifier);
    cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| VaultError::CorruptedStore)
}
