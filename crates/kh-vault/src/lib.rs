//! Secure token storage backends for `kh-auth`
//!
//! Two [`kh_auth::SecureStore`] implementations:
//!
//! - [`KeyringSecureStore`] keeps each value in the OS keyring
//!   (feature `keyring-support`, on by default)
//! - [`FileSecureStore`] keeps each value in its own AES-256-GCM encrypted
//!   file. The key lives in the OS keyring when possible and is otherwise
//!   derived from a passphrase with Argon2id.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kh_auth::SecureStore;
//! use kh_vault::{EnvPassphrase, FileSecureStore, KeySettings};
//!
//! # async fn example() -> kh_vault::Result<()> {
//! let store = FileSecureStore::new(
//!     "/tmp/keyhandle-vault",
//!     Arc::new(EnvPassphrase::new("KEYHANDLE_PASSPHRASE")),
//!     &KeySettings::default(),
//! )
//! .await?;
//!
//! if let Some(value) = store.get_string("desktop").await {
//!     println!("{} bytes stored", value.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod errors;
pub mod file_store;
pub mod key_manager;
#[cfg(feature = "keyring-support")]
pub mod keyring_store;
pub mod passphrase;

/// Keyring service used when none is configured
pub const DEFAULT_SERVICE: &str = "keyhandle";

pub use errors::{Result, VaultError};
pub use file_store::FileSecureStore;
pub use key_manager::{KdfParams, KeyManager, KeySettings};
#[cfg(feature = "keyring-support")]
pub use keyring_store::KeyringSecureStore;
pub use passphrase::{EnvPassphrase, NoPassphrase, PassphraseSource, StaticPassphrase};
