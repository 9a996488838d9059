use thiserror::Error;

/// Failures surfaced by the authentication handler and its collaborators.
///
/// The set is closed: transport, decoding and session failures are all
/// mapped onto one of these variants before they reach a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Response body could not be decoded")]
    DecodingError,

    #[error("No response from server")]
    NoResponse,

    #[error("Invalid URL")]
    InvalidUrl,

    #[error("Invalid configuration")]
    InvalidConfiguration,

    #[error("Invalid data")]
    InvalidData,

    #[error("Login dismissed: {0}")]
    DismissLogin(String),

    #[error("Unexpected status code: {0}")]
    UnexpectedStatusCode(u16),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Only supported for live login, not for automated login")]
    NoAutomatedLoginSupport,
}

impl AuthError {
    /// True for a 4xx status, which the handler reads as "refresh token rejected".
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, Self::UnexpectedStatusCode(code) if (400..500).contains(code))
    }
}

/// Secure-store failures, kept apart from [`AuthError`] so that set stays closed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Secure store unavailable: {0}")]
    Unavailable(String),

    #[error("Secure store backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, AuthError>;
