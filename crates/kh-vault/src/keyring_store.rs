use kh_auth::{SecureStore, StoreError};
use tracing::warn;

use crate::errors::VaultError;

/// [`SecureStore`] backed by the OS keyring
///
/// Each identifier is one keyring entry under `service`. Keyring calls are
/// blocking, so they run on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringSecureStore {
    service: String,
}

impl KeyringSecureStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn with_entry<T, F>(&self, identifier: &str, operation: F) -> Result<T, VaultError>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> Result<T, VaultError> + Send + 'static,
    {
        let service = self.service.clone();
        let identifier = identifier.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &identifier)
                .map_err(|e| VaultError::Keyring(format!("Failed to access keyring: {e}")))?;
            operation(entry)
        })
        .await
        .map_err(|e| VaultError::Keyring(format!("Keyring task failed: {e}")))?
    }
}

#[async_trait::async_trait]
impl SecureStore for KeyringSecureStore {
    async fn get_string(&self, identifier: &str) -> Option<String> {
        let result = self
            .with_entry(identifier, |entry| match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(VaultError::Keyring(format!("Failed to read from keyring: {e}"))),
            })
            .await;

        result.unwrap_or_else(|e| {
            warn!("{e}");
            None
        })
    }

    async fn save(&self, value: &str, identifier: &str) -> Result<(), StoreError> {
        let value = value.to_string();
        self.with_entry(identifier, move |entry| {
            entry
                .set_password(&value)
                .map_err(|e| VaultError::Keyring(format!("Failed to write to keyring: {e}")))
        })
        .await?;
        Ok(())
    }

    async fn remove(&self, identifier: &str) -> Result<(), StoreError> {
        self.with_entry(identifier, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(VaultError::Keyring(format!("Failed to delete from keyring: {e}"))),
        })
        .await?;
        Ok(())
    }
}
