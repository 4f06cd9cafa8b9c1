//! Webhook envelope signatures.
//!
//! HMAC-SHA256 over `{id}.{timestamp}.{body}`, base64-encoded and sent as a
//! space-separated list of `v1,<signature>` entries. Any matching entry
//! accepts the envelope, which lets the provider rotate secrets.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";
const VERSION: &str = "v1";

/// Signed envelope headers as received.
#[derive(Debug, Clone, Copy)]
pub struct SignedEnvelope<'a> {
    pub id: &'a str,
    pub timestamp: &'a str,
    pub signature: &'a str,
}

fn secret_bytes(secret: &str) -> Result<Vec<u8>, AuthError> {
    if secret.is_empty() {
        return Err(AuthError::Crypto("webhook secret is not configured".into()));
    }
    match secret.strip_prefix(SECRET_PREFIX) {
        Some(encoded) => STANDARD
            .decode(encoded)
            .map_err(|e| AuthError::Crypto(format!("webhook secret is not base64: {e}"))),
        None => Ok(secret.as_bytes().to_vec()),
    }
}

fn compute(key: &[u8], id: &str, timestamp: &str, body: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| AuthError::Crypto(format!("HMAC key: {e}")))?;
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Produce a signature header value (`v1,<base64>`) for an envelope.
pub fn sign(secret: &str, id: &str, timestamp: &str, body: &[u8]) -> Result<String, AuthError> {
    let key = secret_bytes(secret)?;
    let mac = compute(&key, id, timestamp, body)?;
    Ok(format!("{VERSION},{}", STANDARD.encode(mac)))
}

/// Verify an envelope against `secret`.
///
/// `now` is the current Unix time in seconds; timestamps further than
/// `tolerance_secs` from it are rejected in either direction.
pub fn verify(
    secret: &str,
    envelope: &SignedEnvelope<'_>,
    body: &[u8],
    tolerance_secs: u64,
    now: i64,
) -> Result<(), AuthError> {
    if envelope.id.is_empty() || envelope.timestamp.is_empty() || envelope.signature.is_empty() {
        return Err(AuthError::InvalidSignature("missing signature headers".into()));
    }

    let timestamp: i64 = envelope
        .timestamp
        .trim()
        .parse()
        .map_err(|_| AuthError::InvalidSignature("timestamp is not an integer".into()))?;
    if now.abs_diff(timestamp) > tolerance_secs {
        return Err(AuthError::InvalidSignature(
            "timestamp outside tolerance".into(),
        ));
    }

    let key = secret_bytes(secret)?;
    let expected = compute(&key, envelope.id, envelope.timestamp.trim(), body)?;

    let matched = envelope
        .signature
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == VERSION)
        .filter_map(|(_, encoded)| STANDARD.decode(encoded).ok())
        .any(|candidate| bool::from(candidate.ct_eq(&expected)));

    if matched {
        Ok(())
    } else {
        Err(AuthError::InvalidSignature("no matching signature".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
    const BODY: &[u8] = br#"{"type":"user.created","data":{"id":"user_1"}}"#;
    const NOW: i64 = 1_706_400_000;

    fn envelope<'a>(signature: &'a str, timestamp: &'a str) -> SignedEnvelope<'a> {
        SignedEnvelope {
            id: "msg_1",
            timestamp,
            signature,
        }
    }

    #[test]
    fn valid_signature_is_accepted() {
        let sig = sign(SECRET, "msg_1", "1706400000", BODY).unwrap();
        assert!(sig.starts_with("v1,"));
        verify(SECRET, &envelope(&sig, "1706400000"), BODY, 300, NOW).unwrap();
    }

    #[test]
    fn any_listed_signature_may_match() {
        let sig = sign(SECRET, "msg_1", "1706400000", BODY).unwrap();
        let header = format!("v1,AAAA {sig}");
        verify(SECRET, &envelope(&header, "1706400000"), BODY, 300, NOW).unwrap();
    }

    #[test]
    fn tampered_body_is_rejected() {
        let sig = sign(SECRET, "msg_1", "1706400000", BODY).unwrap();
        let err = verify(SECRET, &envelope(&sig, "1706400000"), b"{}", 300, NOW).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature(_)));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let sig = sign(SECRET, "msg_1", "1706400000", BODY).unwrap();
        let err = verify(SECRET, &envelope(&sig, "1706400000"), BODY, 300, NOW + 301).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature(_)));
    }

    #[test]
    fn missing_headers_are_rejected() {
        let err = verify(SECRET, &envelope("", "1706400000"), BODY, 300, NOW).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature(_)));
    }

    #[test]
    fn unknown_version_is_ignored() {
        let sig = sign(SECRET, "msg_1", "1706400000", BODY).unwrap();
        let v2 = sig.replacen("v1,", "v2,", 1);
        assert!(verify(SECRET, &envelope(&v2, "1706400000"), BODY, 300, NOW).is_err());
    }

    #[test]
    fn raw_secrets_are_used_verbatim() {
        let sig = sign("plain-secret", "msg_1", "1706400000", BODY).unwrap();
        verify("plain-secret", &envelope(&sig, "1706400000"), BODY, 300, NOW).unwrap();
        assert!(verify(SECRET, &envelope(&sig, "1706400000"), BODY, 300, NOW).is_err());
    }
}
