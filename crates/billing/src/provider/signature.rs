//! Webhook signature verification.
//!
//! The provider signs each delivery with an HMAC-SHA256 over
//! `"{timestamp}.{raw body}"` and sends the result in a header of the form
//! `t=1492774577,v1=5257a8...`. Several `v1` entries may be present during
//! secret rotation; any matching one passes.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::ProviderError;

/// Maximum accepted age of a signed delivery (replay window).
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Verify a signature header against the raw payload.
///
/// `now` is injected so the tolerance window is testable.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidSignature`] when the header is malformed,
/// the timestamp is outside the tolerance window, or no signature matches.
pub fn verify(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<(), ProviderError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ProviderError::InvalidSignature("missing timestamp".to_owned()))?;

    if signatures.is_empty() {
        return Err(ProviderError::InvalidSignature(
            "no v1 signatures present".to_owned(),
        ));
    }

    if (now.timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ProviderError::InvalidSignature(
            "timestamp outside tolerance window".to_owned(),
        ));
    }

    let expected = compute(payload, secret, timestamp)?;

    if signatures.iter().any(|sig| constant_time_eq(sig, &expected)) {
        Ok(())
    } else {
        Err(ProviderError::InvalidSignature(
            "no signature matched".to_owned(),
        ))
    }
}

/// Hex-encoded HMAC-SHA256 of `"{timestamp}.{payload}"`.
fn compute(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, ProviderError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ProviderError::InvalidSignature(format!("bad signing secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_4fb2a9c318d65e07";
    const PAYLOAD: &[u8] = br#"{"type":"invoice.payment_succeeded"}"#;

    fn signed_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let sig = compute(payload, secret, timestamp).expect("hmac accepts any key length");
        format!("t={timestamp},v1={sig}")
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_valid_signature_passes() {
        let ts = now().timestamp();
        let header = signed_header(PAYLOAD, SECRET, ts);
        assert!(verify(PAYLOAD, &header, SECRET, now()).is_ok());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let ts = now().timestamp();
        let header = signed_header(PAYLOAD, "whsec_other_b71c0de2", ts);
        let err = verify(PAYLOAD, &header, SECRET, now()).expect_err("must fail");
        assert!(matches!(err, ProviderError::InvalidSignature(_)));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let ts = now().timestamp();
        let header = signed_header(PAYLOAD, SECRET, ts);
        let tampered = br#"{"type":"invoice.payment_failed"}"#;
        assert!(verify(tampered, &header, SECRET, now()).is_err());
    }

    #[test]
    fn test_stale_timestamp_fails() {
        let ts = now().timestamp() - SIGNATURE_TOLERANCE_SECS - 10;
        let header = signed_header(PAYLOAD, SECRET, ts);
        let err = verify(PAYLOAD, &header, SECRET, now()).expect_err("must fail");
        assert!(matches!(err, ProviderError::InvalidSignature(_)));
    }

    #[test]
    fn test_missing_timestamp_fails() {
        let ts = now().timestamp();
        let sig = compute(PAYLOAD, SECRET, ts).expect("hmac accepts any key length");
        let header = format!("v1={sig}");
        assert!(verify(PAYLOAD, &header, SECRET, now()).is_err());
    }

    #[test]
    fn test_rotated_secret_second_signature_passes() {
        let ts = now().timestamp();
        let old = compute(PAYLOAD, "whsec_old_91ce2d4a", ts).expect("hmac accepts any key length");
        let current = compute(PAYLOAD, SECRET, ts).expect("hmac accepts any key length");
        let header = format!("t={ts},v1={old},v1={current}");
        assert!(verify(PAYLOAD, &header, SECRET, now()).is_ok());
    }
}
