use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::config::Configuration;
use crate::errors::{AuthError, Result};
use crate::exchange::TokenExchange;
use crate::jwt;
use crate::login::{AuthorizationSession, LoginOrchestrator, build_authorization_url};
use crate::models::{LoginType, UserModel};
use crate::pkce::{PkceGenerator, PkceVariables};
use crate::store::SecureStore;
use crate::token::{TokenModel, TokenSource};

/// Hands out a currently valid access token
///
/// Depending on what is stored this returns the cached token, refreshes it
/// silently, or walks the user through the interactive login. Every
/// collaborator is injected so tests can swap in fakes.
///
/// Two concurrent [`fetch_token`](Self::fetch_token) calls that both see an
/// expired access token will both refresh; the store keeps whichever token
/// was written last. Only the interactive session itself is guarded.
pub struct AuthenticationHandler {
    login_type: LoginType,
    pkce: PkceVariables,
    store: Arc<dyn SecureStore>,
    exchange: Arc<dyn TokenExchange>,
    clock: Arc<dyn Clock>,
    orchestrator: LoginOrchestrator,
}

impl AuthenticationHandler {
    /// Build a handler; the PKCE pair is generated once here and reused for
    /// every login this handler performs.
    pub fn new(
        login_type: LoginType,
        store: Arc<dyn SecureStore>,
        exchange: Arc<dyn TokenExchange>,
        session: Arc<dyn AuthorizationSession>,
        clock: Arc<dyn Clock>,
        pkce: &dyn PkceGenerator,
    ) -> Self {
        Self {
            login_type,
            pkce: pkce.generate(),
            store,
            exchange,
            clock,
            orchestrator: LoginOrchestrator::new(session),
        }
    }

    pub fn login_type(&self) -> &LoginType {
        &self.login_type
    }

    pub fn code_challenge(&self) -> &str {
        &self.pkce.code_challenge
    }

    /// Return a usable token and where it came from
    #[instrument(skip(self))]
    pub async fn fetch_token(&self) -> Result<(TokenModel, TokenSource)> {
        let (configuration, token_identifier) = match &self.login_type {
            LoginType::Automatic {
                credentials,
                endpoint,
            } => {
                let token = self
                    .exchange
                    .exchange_automated_credentials(credentials, endpoint)
                    .await?;
                info!(user = credentials.title(), "Obtained token via automated login");
                return Ok((token, TokenSource::AutomatedLogin));
            }
            LoginType::Live {
                configuration,
                token_identifier,
            } => (configuration, token_identifier.as_str()),
        };

        let now = self.clock.now();
        let stored = self
            .store
            .get_string(token_identifier)
            .await
            .and_then(|wrapped| TokenModel::unwrap(&wrapped, now));

        let Some(token) = stored else {
            debug!("No usable stored token");
            return self.interactive_login(configuration, token_identifier).await;
        };

        if token.access_token_is_valid(now) {
            debug!("Stored access token is valid");
            return Ok((token, TokenSource::Keychain));
        }

        if !token.refresh_token_is_valid(now) {
            debug!("Stored access and refresh tokens have both expired");
            return self.interactive_login(configuration, token_identifier).await;
        }

        debug!("Access token expired, refreshing");
        match self
            .exchange
            .refresh(&token.refresh_token, &self.pkce.code_verifier, configuration)
            .await
        {
            Ok(refreshed) => {
                self.persist(token_identifier, &refreshed, now).await;
                info!("Refreshed access token");
                Ok((refreshed, TokenSource::Refresh))
            }
            Err(e) if e.is_client_rejection() => {
                warn!(error = %e, "Refresh token rejected, falling back to interactive login");
                self.remove_entry(token_identifier).await;
                self.interactive_login(configuration, token_identifier).await
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed");
                self.remove_entry(token_identifier).await;
                Err(e)
            }
        }
    }

    /// Run the interactive login regardless of what is stored
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<TokenModel> {
        let (configuration, token_identifier) = self.live()?;
        self.interactive_login(configuration, token_identifier)
            .await
            .map(|(token, _)| token)
    }

    /// Userinfo for the current token; not available for automated login
    #[instrument(skip(self))]
    pub async fn get_user(&self) -> Result<UserModel> {
        let (configuration, _) = self.live()?;
        let (token, _) = self.fetch_token().await?;
        self.exchange
            .fetch_user_info(&token.access_token, configuration)
            .await
    }

    /// Stored token if its refresh token is still valid, without any network call
    ///
    /// A stale or unreadable entry is removed.
    #[instrument(skip(self))]
    pub async fn check_token_if_exist(&self) -> Option<TokenModel> {
        let (_, token_identifier) = self.live().ok()?;
        let wrapped = self.store.get_string(token_identifier).await?;

        let now = self.clock.now();
        match TokenModel::unwrap(&wrapped, now) {
            Some(token) if token.refresh_token_is_valid(now) => Some(token),
            _ => {
                debug!("Removing stale stored token");
                self.remove_entry(token_identifier).await;
                None
            }
        }
    }

    /// Forget the stored token; harmless when nothing is stored
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if let Ok((_, token_identifier)) = self.live() {
            self.remove_entry(token_identifier).await;
            info!("Logged out");
        }
    }

    /// Decode the payload of a JWT access token without verifying it
    ///
    /// Field names of `T` are matched against the snake_case claim names as-is.
    pub fn get_payload<T: DeserializeOwned>(&self, access_token: &str) -> Option<T> {
        jwt::decode_payload(access_token)
    }

    fn live(&self) -> Result<(&Configuration, &str)> {
        match &self.login_type {
            LoginType::Live {
                configuration,
                token_identifier,
            } => Ok((configuration, token_identifier.as_str())),
            LoginType::Automatic { .. } => Err(AuthError::NoAutomatedLoginSupport),
        }
    }

    async fn interactive_login(
        &self,
        configuration: &Configuration,
        token_identifier: &str,
    ) -> Result<(TokenModel, TokenSource)> {
        let authorization_url = build_authorization_url(configuration, &self.pkce.code_challenge)?;
        let code = self
            .orchestrator
            .obtain_authorization_code(&authorization_url, &configuration.redirect_scheme)
            .await?;

        match self
            .exchange
            .exchange_authorization_code(&code, &self.pkce.code_verifier, configuration)
            .await
        {
            Ok(token) => {
                // The session may have kept the user for minutes; lifetimes
                // count from the exchange response.
                self.persist(token_identifier, &token, self.clock.now()).await;
                info!("Obtained token via interactive login");
                Ok((token, TokenSource::LoginSheet))
            }
            Err(e) => {
                warn!(error = %e, "Authorization code exchange failed");
                self.remove_entry(token_identifier).await;
                Err(e)
            }
        }
    }

    // Delete, then write. Store failures only cost us the cache.
    async fn persist(
        &self,
        token_identifier: &str,
        token: &TokenModel,
        issued_at: DateTime<Utc>,
    ) {
        let wrapped = token.wrap(issued_at);
        self.remove_entry(token_identifier).await;
        if let Err(e) = self.store.save(&wrapped, token_identifier).await {
            warn!(error = %e, "Failed to persist token");
        }
    }

    async fn remove_entry(&self, token_identifier: &str) {
        if let Err(e) = self.store.remove(token_identifier).await {
            warn!(error = %e, "Failed to remove stored token");
        }
    }
}

impl std::fmt::Debug for AuthenticationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationHandler")
            .field("login_type", &self.login_type)
            .field("pkce", &self.pkce)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}
