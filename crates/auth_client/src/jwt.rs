use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Reads the `exp` claim (epoch seconds) from an unverified JWT access token.
///
/// Only used as an expiry estimate when a token response omits explicit expiry
/// fields; the server remains the authority through 401/403 responses.
pub fn expiry_from_jwt(token: &str) -> Option<i64> {
    let mut parts = token.trim().split('.');
    let _header = parts.next()?;
    let payload_segment = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let decoded = decode_jwt_segment(payload_segment)?;
    serde_json::from_slice::<ExpiryClaims>(&decoded).ok()?.exp
}

fn decode_jwt_segment(segment: &str) -> Option<Vec<u8>> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| general_purpose::URL_SAFE.decode(segment))
        .ok()
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(claims: &serde_json::Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_exp_claim() {
        let token = encode_test_jwt(&json!({ "sub": "user-1", "exp": 1_700_000_600 }));
        assert_eq!(expiry_from_jwt(&token), Some(1_700_000_600));
    }

    #[test]
    fn rejects_tokens_without_three_segments_or_exp() {
        assert_eq!(expiry_from_jwt("opaque-token"), None);
        assert_eq!(expiry_from_jwt("a.b.c.d"), None);

        let token = encode_test_jwt(&json!({ "sub": "user-1" }));
        assert_eq!(expiry_from_jwt(&token), None);
    }
}
