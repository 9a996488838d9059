use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::Configuration;
use crate::errors::{AuthError, Result};

/// Message carried by the error for a second concurrent login attempt
pub const SESSION_ALREADY_ACTIVE: &str = "Authentication session already active";

/// An interactive consent session, e.g. a system browser
///
/// Resolves with the full callback URL, or `DismissLogin` when the user or
/// the platform cancels.
#[async_trait::async_trait]
pub trait AuthorizationSession: Send + Sync {
    async fn start(&self, authorization_url: &Url, callback_scheme: &str) -> Result<Url>;
}

/// Authorize endpoint URL carrying the PKCE `S256` challenge
pub fn build_authorization_url(configuration: &Configuration, code_challenge: &str) -> Result<Url> {
    let mut url = configuration.authorize_url()?;
    url.query_pairs_mut()
        .append_pair("client_id", &configuration.client_id)
        .append_pair("redirect_uri", &configuration.redirect_url)
        .append_pair("response_type", "code")
        .append_pair("scope", &configuration.scope_string())
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", code_challenge);
    Ok(url)
}

/// Pull the authorization code out of a redirect callback
pub fn extract_authorization_code(callback: &Url, redirect_scheme: &str) -> Result<String> {
    if !callback.scheme().eq_ignore_ascii_case(redirect_scheme) {
        warn!(scheme = callback.scheme(), "Callback scheme does not match");
        return Err(AuthError::InvalidData);
    }

    let mut code = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in callback.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        let reason = match description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        return Err(AuthError::DismissLogin(reason));
    }

    code.ok_or(AuthError::InvalidData)
}

/// Drives one interactive session at a time
///
/// A second call while a session is in flight fails straight away with
/// [`AuthError::InternalError`]; it never queues.
pub struct LoginOrchestrator {
    session: Arc<dyn AuthorizationSession>,
    active: AtomicBool,
}

impl LoginOrchestrator {
    pub fn new(session: Arc<dyn AuthorizationSession>) -> Self {
        Self {
            session,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[instrument(skip(self, authorization_url))]
    pub async fn obtain_authorization_code(
        &self,
        authorization_url: &Url,
        redirect_scheme: &str,
    ) -> Result<String> {
        let _guard = ActiveSession::acquire(&self.active)
            .ok_or_else(|| AuthError::InternalError(SESSION_ALREADY_ACTIVE.to_string()))?;

        debug!("Starting interactive authorization session");
        let callback = self.session.start(authorization_url, redirect_scheme).await?;
        extract_authorization_code(&callback, redirect_scheme)
    }
}

impl std::fmt::Debug for LoginOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginOrchestrator")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

// Clears the flag on every exit path, including a dropped future.
struct ActiveSession<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ActiveSession<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
