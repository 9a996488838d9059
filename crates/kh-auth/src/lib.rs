//! OAuth2 authorization code + PKCE token lifecycle
//!
//! This crate answers one question for its callers: "give me a currently
//! valid access token". [`AuthenticationHandler::fetch_token`] decides
//! whether that means returning the stored token, refreshing it, or running
//! the interactive login.
//!
//! # Token Flow
//!
//! 1. Read the stored token for the configured identifier
//! 2. Return it if the access token has more than a second to live
//! 3. Otherwise refresh it if the refresh token is still valid
//! 4. Otherwise (or if the server rejects the refresh with a 4xx) open an
//!    interactive session, exchange the returned code, and store the result
//!
//! Every successful exchange is persisted delete-then-write as a tab
//! separated string holding absolute expiry instants.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kh_auth::{
//!     AuthenticationHandler, Configuration, HttpSettings, HttpTokenExchange, LoginType,
//!     LoopbackAuthorizationSession, MemorySecureStore, S256PkceGenerator, SystemClock,
//! };
//!
//! # async fn example() -> kh_auth::Result<()> {
//! let configuration = Configuration {
//!     base_url: "https://sso.example.com".to_string(),
//!     client_id: "desktop".to_string(),
//!     authorize_path: "/realms/main/protocol/openid-connect/auth".to_string(),
//!     token_path: "/realms/main/protocol/openid-connect/token".to_string(),
//!     userinfo_path: "/realms/main/protocol/openid-connect/userinfo".to_string(),
//!     redirect_url: "http://127.0.0.1:8765/callback".to_string(),
//!     redirect_scheme: "http".to_string(),
//!     scopes: vec!["openid".to_string()],
//! };
//! let session = LoopbackAuthorizationSession::new(
//!     &configuration.redirect_url,
//!     Arc::new(|url: &url::Url| println!("Open {url} to sign in")),
//! )?;
//!
//! let handler = AuthenticationHandler::new(
//!     LoginType::Live {
//!         configuration,
//!         token_identifier: "desktop".to_string(),
//!     },
//!     Arc::new(MemorySecureStore::new()),
//!     Arc::new(HttpTokenExchange::new(&HttpSettings::default())?),
//!     Arc::new(session),
//!     Arc::new(SystemClock),
//!     &S256PkceGenerator,
//! );
//!
//! let (token, source) = handler.fetch_token().await?;
//! println!("{source}: expires in {}s", token.expires_in);
//! # Ok(())
//! # }
//! ```
//!
//! # Token Storage
//!
//! The handler persists through the [`SecureStore`] trait. The in-memory
//! store is meant for tests; `kh-vault` provides keyring and encrypted file
//! backends.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use kh_auth::{MemorySecureStore, SecureStore, TokenModel};
//!
//! # async fn example() -> Result<(), kh_auth::StoreError> {
//! let store = MemorySecureStore::new();
//! let issued_at = Utc.timestamp_opt(1_000, 0).unwrap();
//! let token = TokenModel::new("access", "refresh", "Bearer", 60, 300);
//!
//! store.save(&token.wrap(issued_at), "desktop").await?;
//!
//! let wrapped = store.get_string("desktop").await.unwrap();
//! let later = Utc.timestamp_opt(1_030, 0).unwrap();
//! let restored = TokenModel::unwrap(&wrapped, later).unwrap();
//! assert_eq!(restored.expires_in, 30);
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```
//!
//! # Important Notes
//!
//! - Tokens, codes and verifiers are never logged
//! - [`AuthenticationHandler::get_payload`] does not verify signatures

pub mod clock;
pub mod config;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod jwt;
pub mod login;
pub mod loopback;
pub mod models;
pub mod pkce;
pub mod store;
pub mod token;

// Re-export main types
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Configuration, HttpSettings};
pub use errors::{AuthError, Result, StoreError};
pub use exchange::{HttpTokenExchange, TokenExchange};
pub use handler::AuthenticationHandler;
pub use login::{AuthorizationSession, LoginOrchestrator};
pub use loopback::{LoopbackAuthorizationSession, UrlOpener};
pub use models::{AutomatedCredentials, AutomatedLoginCatalog, LoginType, UserModel};
pub use pkce::{PkceGenerator, PkceVariables, S256PkceGenerator};
pub use store::{MemorySecureStore, SecureStore};
pub use token::{TokenModel, TokenSource};
