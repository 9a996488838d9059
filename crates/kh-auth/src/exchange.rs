use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{Configuration, HttpSettings};
use crate::errors::{AuthError, Result};
use crate::models::{AutomatedCredentials, UserModel};
use crate::token::TokenModel;

/// Network operations against the token, userinfo and automated-login endpoints
///
/// None of these retry; the handler decides what a failure means.
#[async_trait::async_trait]
pub trait TokenExchange: Send + Sync {
    /// `grant_type=authorization_code`
    async fn exchange_authorization_code(
        &self,
        code: &str,
        code_verifier: &str,
        configuration: &Configuration,
    ) -> Result<TokenModel>;

    /// `grant_type=refresh_token`
    async fn refresh(
        &self,
        refresh_token: &str,
        code_verifier: &str,
        configuration: &Configuration,
    ) -> Result<TokenModel>;

    async fn exchange_automated_credentials(
        &self,
        credentials: &AutomatedCredentials,
        endpoint: &Url,
    ) -> Result<TokenModel>;

    async fn fetch_user_info(
        &self,
        access_token: &str,
        configuration: &Configuration,
    ) -> Result<UserModel>;
}

/// [`TokenExchange`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    http: Client,
}

impl HttpTokenExchange {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| AuthError::InternalError(format!("HTTP client: {e}")))?;

        Ok(Self { http })
    }

    /// Wrap an already configured client
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    async fn post_token_form(
        &self,
        configuration: &Configuration,
        form: &[(&str, &str)],
    ) -> Result<TokenModel> {
        let url = configuration.token_url()?;
        send(self.http.post(url).form(form)).await
    }
}

#[async_trait::async_trait]
impl TokenExchange for HttpTokenExchange {
    #[instrument(skip(self, code, code_verifier, configuration))]
    async fn exchange_authorization_code(
        &self,
        code: &str,
        code_verifier: &str,
        configuration: &Configuration,
    ) -> Result<TokenModel> {
        debug!("Exchanging authorization code for tokens");
        self.post_token_form(
            configuration,
            &[
                ("code_verifier", code_verifier),
                ("redirect_uri", configuration.redirect_url.as_str()),
                ("client_id", configuration.client_id.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ],
        )
        .await
    }

    #[instrument(skip(self, refresh_token, code_verifier, configuration))]
    async fn refresh(
        &self,
        refresh_token: &str,
        code_verifier: &str,
        configuration: &Configuration,
    ) -> Result<TokenModel> {
        debug!("Refreshing access token");
        self.post_token_form(
            configuration,
            &[
                ("code_verifier", code_verifier),
                ("redirect_uri", configuration.redirect_url.as_str()),
                ("client_id", configuration.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
        )
        .await
    }

    #[instrument(skip(self, credentials), fields(user = credentials.title()))]
    async fn exchange_automated_credentials(
        &self,
        credentials: &AutomatedCredentials,
        endpoint: &Url,
    ) -> Result<TokenModel> {
        debug!(realm = credentials.realm(), "Exchanging automated credentials");
        let body = credentials.request_body();
        send(self.http.post(endpoint.clone()).json(&body)).await
    }

    #[instrument(skip(self, access_token, configuration))]
    async fn fetch_user_info(
        &self,
        access_token: &str,
        configuration: &Configuration,
    ) -> Result<UserModel> {
        let url = configuration.userinfo_url()?;
        debug!("Fetching user info");
        send(self.http.get(url).bearer_auth(access_token)).await
    }
}

/// Send a request and decode a JSON body, mapping every failure onto [`AuthError`]
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        warn!("Request failed without a response: {e}");
        AuthError::NoResponse
    })?;

    let status = response.status();
    if !status.is_success() {
        debug!(status = status.as_u16(), "Unexpected status code");
        return Err(AuthError::UnexpectedStatusCode(status.as_u16()));
    }

    let body = response.bytes().await.map_err(|_| AuthError::NoResponse)?;
    if body.is_empty() {
        return Err(AuthError::InvalidData);
    }

    serde_json::from_slice(&body).map_err(|e| {
        debug!("Response body did not decode: {e}");
        AuthError::DecodingError
    })
}
