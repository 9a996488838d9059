use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use kh_auth::{
    AuthError, AuthenticationHandler, AuthorizationSession, AutomatedLoginCatalog,
    HttpTokenExchange, LoginType, LoopbackAuthorizationSession, MemorySecureStore,
    S256PkceGenerator, SecureStore, SystemClock, TokenSource,
};
use url::Url;
use kh_vault::{EnvPassphrase, FileSecureStore, KeySettings};
use tracing::{debug, info, instrument};

use crate::settings::{Settings, StorageBackend};

/// Open the secure store selected in `[storage]`
#[instrument(skip(settings), level = "debug")]
pub async fn build_store(settings: &Settings) -> Result<Arc<dyn SecureStore>> {
    let storage = &settings.storage;
    let store: Arc<dyn SecureStore> = match storage.backend {
        StorageBackend::Memory => Arc::new(MemorySecureStore::new()),
        StorageBackend::Keyring => keyring_store(&storage.keyring_service)?,
        StorageBackend::File => {
            let dir = match &storage.dir {
                Some(dir) => dir.clone(),
                None => FileSecureStore::default_storage_dir()
                    .context("Could not determine the vault directory")?,
            };
            let key_settings = KeySettings {
                keyring_service: Some(storage.keyring_service.clone()),
                ..KeySettings::default()
            };
            let store = FileSecureStore::new(
                &dir,
                Arc::new(EnvPassphrase::new(&storage.passphrase_env)),
                &key_settings,
            )
            .await
            .with_context(|| format!("Failed to open vault at {}", dir.display()))?;
            Arc::new(store)
        }
    };
    debug!(backend = ?storage.backend, "Secure store ready");
    Ok(store)
}

#[cfg(feature = "keyring-support")]
fn keyring_store(service: &str) -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(kh_vault::KeyringSecureStore::new(service)))
}

#[cfg(not(feature = "keyring-support"))]
fn keyring_store(_service: &str) -> Result<Arc<dyn SecureStore>> {
    bail!("keyhandle was built without keyring support; use backend = \"file\"")
}

/// Live login from `[oauth]`, or the `[automated]` test account when set
pub async fn login_type(settings: &Settings, config_path: &Path) -> Result<LoginType> {
    let Some(catalog_path) = settings.catalog_path(config_path) else {
        return Ok(LoginType::Live {
            configuration: settings.oauth.clone(),
            token_identifier: settings.token_identifier.clone(),
        });
    };
    let Some(automated) = &settings.automated else {
        bail!("[automated] section missing");
    };

    let json = tokio::fs::read_to_string(&catalog_path)
        .await
        .with_context(|| format!("Failed to read {}", catalog_path.display()))?;
    let catalog = AutomatedLoginCatalog::from_json(&json)
        .with_context(|| format!("Failed to parse {}", catalog_path.display()))?;

    info!(user = %automated.user, "Using automated test account");
    catalog
        .login_type(&automated.user)
        .with_context(|| format!("No usable test account titled '{}'", automated.user))
}

pub async fn build_handler(settings: &Settings, config_path: &Path) -> Result<AuthenticationHandler> {
    let login_type = login_type(settings, config_path).await?;
    let store = build_store(settings).await?;
    let exchange =
        HttpTokenExchange::new(&settings.http).context("Failed to build HTTP client")?;
    let session: Arc<dyn AuthorizationSession> = match &login_type {
        LoginType::Live { configuration, .. } => Arc::new(
            LoopbackAuthorizationSession::new(
                &configuration.redirect_url,
                Arc::new(|url: &Url| {
                    eprintln!("Open this URL in your browser to sign in:\n\n  {url}\n");
                }),
            )
            .context("Redirect URL cannot be served locally")?,
        ),
        LoginType::Automatic { .. } => Arc::new(NoInteractiveSession),
    };

    Ok(AuthenticationHandler::new(
        login_type,
        store,
        Arc::new(exchange),
        session,
        Arc::new(SystemClock),
        &S256PkceGenerator,
    ))
}

/// Automated accounts never open a browser
struct NoInteractiveSession;

#[async_trait::async_trait]
impl AuthorizationSession for NoInteractiveSession {
    async fn start(
        &self,
        _authorization_url: &Url,
        _callback_scheme: &str,
    ) -> kh_auth::Result<Url> {
        Err(AuthError::NoAutomatedLoginSupport)
    }
}

/// One line summary for `token` and `status`
pub fn describe(source: Option<TokenSource>, expires_in: i64) -> String {
    match source {
        Some(source) => format!("token from {source}, expires in {expires_in}s"),
        None => format!("stored token valid, expires in {expires_in}s"),
    }
}
