use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{AuthError, Result};

/// Default user agent sent with every token endpoint request
pub const DEFAULT_USER_AGENT: &str = "keyhandle";

/// OAuth2 endpoints and client registration for the live login flow
///
/// Immutable once handed to an [`AuthenticationHandler`](crate::AuthenticationHandler).
///
/// ```
/// use kh_auth::Configuration;
///
/// let config = Configuration {
///     base_url: "https://sso.example.com".to_string(),
///     client_id: "mobile-app".to_string(),
///     authorize_path: "/realms/main/protocol/openid-connect/auth".to_string(),
///     token_path: "/realms/main/protocol/openid-connect/token".to_string(),
///     userinfo_path: "/realms/main/protocol/openid-connect/userinfo".to_string(),
///     redirect_url: "com.example.app:/callback".to_string(),
///     redirect_scheme: "com.example.app".to_string(),
///     scopes: vec!["openid".to_string(), "profile".to_string()],
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub base_url: String,
    pub client_id: String,
    pub authorize_path: String,
    pub token_path: String,
    pub userinfo_path: String,
    /// Registered redirect URI, sent as `redirect_uri`
    pub redirect_url: String,
    /// Scheme the interactive session listens for
    pub redirect_scheme: String,
    pub scopes: Vec<String>,
}

impl Configuration {
    /// Check the registration fields are present and the base URL parses
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty()
            || self.redirect_url.trim().is_empty()
            || self.redirect_scheme.trim().is_empty()
            || self.scopes.is_empty()
        {
            return Err(AuthError::InvalidConfiguration);
        }
        Url::parse(&self.base_url).map_err(|_| AuthError::InvalidUrl)?;
        Ok(())
    }

    pub fn authorize_url(&self) -> Result<Url> {
        self.endpoint(&self.authorize_path)
    }

    pub fn token_url(&self) -> Result<Url> {
        self.endpoint(&self.token_path)
    }

    pub fn userinfo_url(&self) -> Result<Url> {
        self.endpoint(&self.userinfo_path)
    }

    /// Scopes as sent on the wire
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    // Base and path are always joined by exactly one slash.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}")).map_err(|_| AuthError::InvalidUrl)
    }
}

/// HTTP client settings for the token exchange client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    #[serde(with = "seconds")]
    pub connect_timeout: Duration,
    #[serde(with = "seconds")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
