//! JWT payload inspection.
//!
//! Nothing here verifies a signature. A decoded payload says what the token
//! claims, not that the claim is true, so it must never drive an
//! authorization decision.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::de::DeserializeOwned;

/// Decode the base64url payload segment of a three-segment token into raw JSON bytes
pub fn payload_bytes(token: &str) -> Option<Vec<u8>> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    let mut payload = segments[1].to_string();
    match payload.len() % 4 {
        2 => payload.push_str("=="),
        3 => payload.push('='),
        _ => {}
    }
    URL_SAFE.decode(payload).ok()
}

/// Decode the payload into `T`; `None` on any structural or schema mismatch
pub fn decode_payload<T: DeserializeOwned>(token: &str) -> Option<T> {
    let bytes = payload_bytes(token)?;
    serde_json::from_slice(&bytes).ok()
}
