// Best-effort, unverified token decoding
//
// Nothing here checks signatures: the client only needs to know what a token
// claims about itself, the server remains the authority.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};

use super::types::Claims;

/// Decode the payload segment of a token into [`Claims`].
///
/// Returns `None` on any malformed input: wrong segment count, invalid
/// base64url, non-UTF-8 or non-JSON payload, or a payload without a subject.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    // Some issuers keep the padding, the URL-safe alphabet does not need it
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let json = std::str::from_utf8(&bytes).ok()?;
    serde_json::from_str(json).ok()
}

/// Check if a token is expired right now
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now().timestamp())
}

/// Check if a token is expired at `now` (seconds since the epoch)
///
/// Undecodable tokens and tokens without `exp` count as expired. A token
/// whose expiry equals `now` is expired.
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode(token).and_then(|claims| claims.exp) {
        None => true,
        Some(exp) => exp <= now as f64,
    }
}

/// Expiry of a token as a timestamp, if it carries one
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    decode(token)
        .and_then(|claims| claims.exp)
        .and_then(|exp| DateTime::from_timestamp_millis((exp * 1000.0) as i64))
}

#[cfg(test)]
pub(crate) fn encode_for_test(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_decode_valid_token() {
        let token = encode_for_test(&json!({
            "sub": "12",
            "email": "jane@example.com",
            "is_premium": false,
            "exp": 1_700_000_000
        }));

        let claims = decode(&token).unwrap();
        assert_eq!(claims.sub, "12");
        assert_eq!(claims.email.as_deref(), Some("jane@example.com"));
        assert_eq!(claims.is_premium, Some(false));
        assert_eq!(claims.exp, Some(1_700_000_000.0));
    }

    #[test]
    fn test_decode_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"1"}"#);
        let token = format!("h.{}.s", payload);
        assert_eq!(decode(&token).unwrap().sub, "1");
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode("").is_none());
        assert!(decode("only-one-segment").is_none());
        assert!(decode("a.b").is_none());
        assert!(decode("a.b.c.d").is_none());
        assert!(decode("a.!!!.c").is_none());

        // Valid base64, not JSON
        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert!(decode(&format!("a.{}.c", not_json)).is_none());

        // JSON, but not an object with a subject
        let array = URL_SAFE_NO_PAD.encode("[1,2,3]");
        assert!(decode(&format!("a.{}.c", array)).is_none());

        // Invalid UTF-8
        let bytes = URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0xfd]);
        assert!(decode(&format!("a.{}.c", bytes)).is_none());
    }

    #[test]
    fn test_is_expired_at_boundaries() {
        let token = encode_for_test(&json!({"sub": "1", "exp": 1000}));

        assert!(!is_expired_at(&token, 999));
        assert!(is_expired_at(&token, 1000));
        assert!(is_expired_at(&token, 1001));
    }

    #[test]
    fn test_fractional_expiry() {
        let token = encode_for_test(&json!({"sub": "1", "exp": 4_102_444_800.5}));

        let claims = decode(&token).unwrap();
        assert_eq!(claims.exp, Some(4_102_444_800.5));
        assert!(!is_expired(&token));
        assert!(!is_expired_at(&token, 4_102_444_800));
        assert!(is_expired_at(&token, 4_102_444_801));
        assert_eq!(
            expires_at(&token).unwrap().to_rfc3339(),
            "2100-01-01T00:00:00.500+00:00"
        );
    }

    #[test]
    fn test_missing_expiry_is_expired() {
        let token = encode_for_test(&json!({"sub": "1"}));
        assert!(is_expired_at(&token, 0));
        assert!(is_expired("garbage"));
    }

    #[test]
    fn test_is_expired_against_clock() {
        let future = encode_for_test(&json!({"sub": "1", "exp": Utc::now().timestamp() + 600}));
        let past = encode_for_test(&json!({"sub": "1", "exp": Utc::now().timestamp() - 60}));

        assert!(!is_expired(&future));
        assert!(is_expired(&past));
    }

    #[test]
    fn test_expires_at() {
        let token = encode_for_test(&json!({"sub": "1", "exp": 1_736_677_800}));
        assert_eq!(
            expires_at(&token).unwrap().to_rfc3339(),
            "2025-01-12T10:30:00+00:00"
        );
        assert!(expires_at("nope").is_none());
    }

    proptest! {
        #[test]
        fn decode_never_panics(input in ".*") {
            let _ = decode(&input);
        }

        #[test]
        fn decode_rejects_wrong_segment_count(parts in prop::collection::vec("[A-Za-z0-9_-]{0,12}", 0..6)) {
            prop_assume!(parts.len() != 3);
            prop_assert!(decode(&parts.join(".")).is_none());
        }

        #[test]
        fn undecodable_tokens_are_expired(input in "[^.]*") {
            prop_assert!(is_expired_at(&input, 0));
        }
    }
}
