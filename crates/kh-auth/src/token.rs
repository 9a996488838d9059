use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Field delimiter of the persisted token string
pub const STORE_VALUE_SEPARATOR: char = '\t';

const STORED_FIELD_COUNT: usize = 5;

/// Token as returned by the token endpoint
///
/// `expires_in` and `refresh_expires_in` are seconds relative to the instant
/// the model was decoded or unwrapped at. They are never persisted as-is:
/// [`TokenModel::wrap`] turns them into absolute epoch seconds.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenModel {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    pub refresh_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_state: Option<String>,
    #[serde(default)]
    pub scope: String,
}

impl TokenModel {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_in: i64,
        refresh_expires_in: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in,
            refresh_expires_in: Some(refresh_expires_in),
            refresh_token: refresh_token.into(),
            token_type: token_type.into(),
            id_token: None,
            session_state: None,
            scope: String::new(),
        }
    }

    /// Lifetimes beyond chrono's range saturate at its bounds.
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        offset_by_seconds(now, self.expires_in)
    }

    /// A missing `refresh_expires_in` counts as already expired.
    pub fn refresh_expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        offset_by_seconds(now, self.refresh_expires_in.unwrap_or(0))
    }

    /// More than one whole second of access token lifetime left
    pub fn access_token_is_valid(&self, now: DateTime<Utc>) -> bool {
        seconds_between(now, self.expires_at(now)) > 1
    }

    pub fn refresh_token_is_valid(&self, now: DateTime<Utc>) -> bool {
        seconds_between(now, self.refresh_expires_at(now)) > 1
    }

    /// Serialize for the secure store:
    /// `access \t refresh \t type \t expiresAt \t refreshExpiresAt`
    pub fn wrap(&self, now: DateTime<Utc>) -> String {
        [
            self.access_token.clone(),
            self.refresh_token.clone(),
            self.token_type.clone(),
            format_epoch_seconds(self.expires_at(now)),
            format_epoch_seconds(self.refresh_expires_at(now)),
        ]
        .join(&STORE_VALUE_SEPARATOR.to_string())
    }

    /// Parse a stored value back, recomputing lifetimes against `now`.
    ///
    /// Returns `None` for anything that is not exactly five fields with
    /// numeric expiry instants. The id token, session state and scope are
    /// not persisted and come back empty.
    pub fn unwrap(wrapped: &str, now: DateTime<Utc>) -> Option<Self> {
        let fields: Vec<&str> = wrapped.split(STORE_VALUE_SEPARATOR).collect();
        if fields.len() != STORED_FIELD_COUNT {
            return None;
        }

        let expires_at = parse_epoch_seconds(fields[3])?;
        let refresh_expires_at = parse_epoch_seconds(fields[4])?;

        Some(Self::new(
            fields[0],
            fields[1],
            fields[2],
            seconds_between(now, expires_at),
            seconds_between(now, refresh_expires_at),
        ))
    }
}

// Equality covers the persisted fields only.
impl PartialEq for TokenModel {
    fn eq(&self, other: &Self) -> bool {
        self.access_token == other.access_token
            && self.refresh_token == other.refresh_token
            && self.token_type == other.token_type
            && self.expires_in == other.expires_in
            && self.refresh_expires_in == other.refresh_expires_in
    }
}

impl Eq for TokenModel {}

impl std::fmt::Debug for TokenModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenModel")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// How the token handed back by `fetch_token` was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    LoginSheet,
    Keychain,
    Refresh,
    AutomatedLogin,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSheet => "login_sheet",
            Self::Keychain => "keychain",
            Self::Refresh => "refresh",
            Self::AutomatedLogin => "automated_login",
        }
    }
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole seconds from `from` to `to`, truncated toward zero
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds()
}

// Server supplied lifetimes can be arbitrarily large.
fn offset_by_seconds(now: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(if seconds < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

// Whole seconds keep a trailing ".0" so stored values read like "130.0".
fn format_epoch_seconds(instant: DateTime<Utc>) -> String {
    let seconds = instant.timestamp_millis() as f64 / 1000.0;
    if seconds.fract() == 0.0 {
        format!("{seconds:.1}")
    } else {
        seconds.to_string()
    }
}

fn parse_epoch_seconds(field: &str) -> Option<DateTime<Utc>> {
    let seconds: f64 = field.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let millis = ((seconds * 1000.0).round() as i64).clamp(
        DateTime::<Utc>::MIN_UTC.timestamp_millis(),
        DateTime::<Utc>::MAX_UTC.timestamp_millis(),
    );
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn token() -> TokenModel {
        TokenModel::new("accesstoken", "refreshtoken", "tokentype", 60, 299)
    }

    #[test]
    fn test_wrap_format() {
        assert_eq!(
            token().wrap(at(0)),
            "accesstoken\trefreshtoken\ttokentype\t60.0\t299.0"
        );
        assert_eq!(
            token().wrap(at(70)),
            "accesstoken\trefreshtoken\ttokentype\t130.0\t369.0"
        );
    }

    #[test]
    fn test_wrap_keeps_fractional_seconds() {
        let now = Utc.timestamp_millis_opt(1_500).unwrap();
        let wrapped = token().wrap(now);
        assert!(wrapped.ends_with("\t61.5\t300.5"));
    }

    #[test]
    fn test_unwrap_recomputes_relative_lifetimes() {
        let wrapped = token().wrap(at(1_000));

        let same = TokenModel::unwrap(&wrapped, at(1_000)).unwrap();
        assert_eq!(same, token());

        let later = TokenModel::unwrap(&wrapped, at(1_025)).unwrap();
        assert_eq!(later.access_token, "accesstoken");
        assert_eq!(later.refresh_token, "refreshtoken");
        assert_eq!(later.token_type, "tokentype");
        assert_eq!(later.expires_in, 35);
        assert_eq!(later.refresh_expires_in, Some(274));
    }

    #[test]
    fn test_unwrap_stored_value() {
        let token =
            TokenModel::unwrap("accesstoken\trefreshtoken\ttokentype\t60.0\t299.0", at(10))
                .unwrap();
        assert_eq!(token.expires_in, 50);
        assert_eq!(token.refresh_expires_in, Some(289));
    }

    #[test]
    fn test_unwrap_rejects_malformed_values() {
        let now = at(0);
        assert!(TokenModel::unwrap("", now).is_none());
        assert!(TokenModel::unwrap("a\tb\tc\t60.0", now).is_none());
        assert!(TokenModel::unwrap("a\tb\tc\t60.0\t299.0\textra", now).is_none());
        assert!(TokenModel::unwrap("a\tb\tc\tsoon\t299.0", now).is_none());
        assert!(TokenModel::unwrap("a\tb\tc\t60.0\tNaN", now).is_none());
    }

    #[test]
    fn test_huge_lifetimes_saturate() {
        let now = at(1_000);
        let forever: TokenModel = serde_json::from_str(
            r#"{"access_token":"a","expires_in":9223372036854775807,
                "refresh_expires_in":9223372036854775807,
                "refresh_token":"r","token_type":"Bearer"}"#,
        )
        .unwrap();

        assert_eq!(forever.expires_at(now), DateTime::<Utc>::MAX_UTC);
        assert!(forever.access_token_is_valid(now));
        assert!(forever.refresh_token_is_valid(now));

        let restored = TokenModel::unwrap(&forever.wrap(now), now).unwrap();
        assert!(restored.access_token_is_valid(now));
        assert!(restored.refresh_token_is_valid(now));
    }

    #[test]
    fn test_huge_negative_lifetimes_are_expired() {
        let now = at(1_000);
        let expired = TokenModel::new("a", "r", "Bearer", i64::MIN, -9_000_000_000_000_000);

        assert_eq!(expired.expires_at(now), DateTime::<Utc>::MIN_UTC);
        assert!(!expired.access_token_is_valid(now));
        assert!(!expired.refresh_token_is_valid(now));

        let restored = TokenModel::unwrap(&expired.wrap(now), now).unwrap();
        assert!(!restored.access_token_is_valid(now));
        assert!(!restored.refresh_token_is_valid(now));
    }

    #[test]
    fn test_access_validity_boundary() {
        let wrapped = token().wrap(at(0));

        let at_58 = TokenModel::unwrap(&wrapped, at(58)).unwrap();
        assert!(at_58.access_token_is_valid(at(58)));

        let at_59 = TokenModel::unwrap(&wrapped, at(59)).unwrap();
        assert!(!at_59.access_token_is_valid(at(59)));
    }

    #[test]
    fn test_refresh_validity() {
        let wrapped = token().wrap(at(0));

        let at_70 = TokenModel::unwrap(&wrapped, at(70)).unwrap();
        assert!(!at_70.access_token_is_valid(at(70)));
        assert!(at_70.refresh_token_is_valid(at(70)));

        let at_400 = TokenModel::unwrap(&wrapped, at(400)).unwrap();
        assert!(!at_400.refresh_token_is_valid(at(400)));
    }

    #[test]
    fn test_missing_refresh_lifetime_is_expired() {
        let mut token = token();
        token.refresh_expires_in = None;
        assert!(!token.refresh_token_is_valid(at(0)));
        assert!(token.wrap(at(5)).ends_with("\t65.0\t5.0"));
    }

    #[test]
    fn test_decode_endpoint_response() {
        let body = r#"{
            "access_token": "at",
            "expires_in": 300,
            "refresh_expires_in": 1800,
            "refresh_token": "rt",
            "token_type": "Bearer",
            "id_token": "id",
            "not-before-policy": 0,
            "session_state": "state",
            "scope": "openid profile"
        }"#;
        let token: TokenModel = serde_json::from_str(body).unwrap();
        assert_eq!(token.expires_in, 300);
        assert_eq!(token.refresh_expires_in, Some(1800));
        assert_eq!(token.session_state.as_deref(), Some("state"));
        assert_eq!(token.scope, "openid profile");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!("{:?}", token());
        assert!(!debug.contains("accesstoken"));
        assert!(!debug.contains("refreshtoken"));
    }
}
