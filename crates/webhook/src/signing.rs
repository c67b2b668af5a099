//! HMAC signing and verification (C6, signature half; §4.6). Grounded on
//! `internal/webhook/signature.go`: the signed string is `<timestamp>.<body>`,
//! HMAC-SHA256'd and hex-encoded, carried in a header of the form
//! `t=<unix-seconds>,v1=<hex>`. Verification is constant-time and rejects
//! signatures older than a configurable tolerance.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const HEADER_NAME: &str = "X-Mailgress-Signature";

/// Produces the `t=...,v1=...` header value for `body` signed with
/// `secret` at `timestamp`.
pub fn sign(body: &str, secret: &str, timestamp: i64) -> String {
    format!("t={timestamp},v1={}", compute_mac(body, secret, timestamp))
}

fn compute_mac(body: &str, secret: &str, timestamp: i64) -> String {
    let signed_payload = format!("{timestamp}.{body}");
    // HMAC accepts a key of any length; construction cannot fail here.
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 key of any length");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a `header` produced by [`sign`] against `body` and `secret`,
/// rejecting timestamps more than `tolerance` seconds older than `now`.
pub fn verify(body: &str, header: &str, secret: &str, tolerance_secs: i64, now: DateTime<Utc>) -> bool {
    let Some((timestamp, received_mac)) = parse_header(header) else {
        return false;
    };

    let age = now.timestamp() - timestamp;
    if age > tolerance_secs {
        return false;
    }

    let expected_mac = compute_mac(body, secret, timestamp);
    constant_time_hex_eq(&expected_mac, received_mac)
}

fn parse_header(header: &str) -> Option<(i64, &str)> {
    let mut timestamp = None;
    let mut v1 = None;
    for part in header.split(',') {
        let (key, value) = part.split_once('=')?;
        match key.trim() {
            "t" => timestamp = value.trim().parse::<i64>().ok(),
            "v1" => v1 = Some(value.trim()),
            _ => {}
        }
    }
    Some((timestamp?, v1?))
}

fn constant_time_hex_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let now = Utc::now();
        let header = sign("the body", "s3cr3t", now.timestamp());
        assert!(verify("the body", &header, "s3cr3t", 300, now));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let now = Utc::now();
        let header = sign("the body", "s3cr3t", now.timestamp());
        assert!(!verify("the body", &header, "other", 300, now));
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let now = Utc::now();
        let header = sign("the body", "s3cr3t", now.timestamp());
        assert!(!verify("a different body", &header, "s3cr3t", 300, now));
    }

    #[test]
    fn verify_rejects_signatures_older_than_tolerance() {
        let now = Utc::now();
        let old_timestamp = now.timestamp() - 600;
        let header = sign("body", "secret", old_timestamp);
        assert!(!verify("body", &header, "secret", 300, now));
    }

    #[test]
    fn verify_rejects_malformed_header() {
        let now = Utc::now();
        assert!(!verify("body", "garbage", "secret", 300, now));
        assert!(!verify("body", "t=notanumber,v1=abc", "secret", 300, now));
    }

    #[test]
    fn header_format_matches_stripe_style_scheme() {
        let header = sign("body", "secret", 1_700_000_000);
        assert!(header.starts_with("t=1700000000,v1="));
    }
}
