use zeroize::Zeroizing;

/// Supplies the passphrase a file store key is derived from
///
/// Consulted only when the OS keyring cannot provide the key.
#[async_trait::async_trait]
pub trait PassphraseSource: Send + Sync {
    /// `None` when no passphrase is available or the user declines
    async fn passphrase(&self, prompt: &str) -> Option<Zeroizing<String>>;
}

/// Keyring only; never yields a passphrase
#[derive(Debug, Clone, Default)]
pub struct NoPassphrase;

#[async_trait::async_trait]
impl PassphraseSource for NoPassphrase {
    async fn passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        None
    }
}

/// Fixed passphrase, mostly for tests
#[derive(Clone)]
pub struct StaticPassphrase {
    secret: Zeroizing<String>,
}

impl StaticPassphrase {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
        }
    }
}

impl std::fmt::Debug for StaticPassphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticPassphrase([REDACTED])")
    }
}

#[async_trait::async_trait]
impl PassphraseSource for StaticPassphrase {
    async fn passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        Some(self.secret.clone())
    }
}

/// Reads the passphrase from an environment variable
#[derive(Debug, Clone)]
pub struct EnvPassphrase {
    variable: String,
}

impl EnvPassphrase {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

#[async_trait::async_trait]
impl PassphraseSource for EnvPassphrase {
    async fn passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        std::env::var(&self.variable)
            .ok()
            .filter(|value| !value.is_empty())
            .map(Zeroizing::new)
    }
}
