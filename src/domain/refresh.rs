//! Refresh token generation.
//!
//! A refresh token is an opaque, high-entropy secret: 40 bytes drawn
//! from the OS cryptographic random source, hex-encoded to 80
//! characters. 320 bits of entropy makes collisions negligible, so the
//! protocol treats every generated value as unique.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{REFRESH_TOKEN_BYTES, REFRESH_TOKEN_TTL_DAYS};

/// Long-lived opaque credential tied to the issuing network address.
///
/// Persisted at issuance; the exchange flow lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    /// 80 hex characters of CSPRNG output; never logged.
    pub token: String,
    pub created: DateTime<Utc>,
    /// Always exactly `created + 7 days`.
    pub expires: DateTime<Utc>,
    pub created_by_ip: String,
    /// Set by the (external) revocation flow; always false at issuance.
    pub revoked: bool,
}

impl RefreshToken {
    /// Generate a fresh refresh token bound to the caller's address.
    pub fn generate(ip_address: &str) -> Self {
        let created = Utc::now();
        Self {
            id: Uuid::new_v4(),
            token: random_token_string(),
            created,
            expires: created + Duration::days(REFRESH_TOKEN_TTL_DAYS),
            created_by_ip: ip_address.to_string(),
            revoked: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

/// Hex-encode fresh bytes from the OS CSPRNG.
///
/// `OsRng` is process- and thread-safe; each call is independent.
fn random_token_string() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_is_80_hex_chars() {
        let token = RefreshToken::generate("10.0.0.1");
        assert_eq!(token.token.len(), 80);
        assert!(token.token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ttl_is_exactly_seven_days() {
        let token = RefreshToken::generate("10.0.0.1");
        assert_eq!(token.expires - token.created, Duration::days(7));
        assert!(!token.is_expired(token.created));
        assert!(token.is_expired(token.expires));
    }

    #[test]
    fn test_tokens_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(RefreshToken::generate("10.0.0.1").token));
        }
    }

    #[test]
    fn test_token_records_issuing_ip() {
        let token = RefreshToken::generate("192.168.1.7");
        assert_eq!(token.created_by_ip, "192.168.1.7");
        assert!(!token.revoked);
    }
}
