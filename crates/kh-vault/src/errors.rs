use kh_auth::StoreError;
use thiserror::Error;

/// Secure storage error types
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    #[error("OS keyring error: {0}")]
    Keyring(String),

    #[error("Stored data is corrupted or was encrypted with another key")]
    CorruptedStore,

    #[error("Store is locked by another process")]
    LockTimeout,

    #[error("No passphrase available to unlock the store")]
    PassphraseUnavailable,
}

impl From<VaultError> for StoreError {
    fn from(error: VaultError) -> Self {
        match error {
            VaultError::LockTimeout | VaultError::PassphraseUnavailable => {
                StoreError::Unavailable(error.to_string())
            }
            other => StoreError::Backend(Box::new(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
