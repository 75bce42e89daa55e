//! Single-use verification codes.
//!
//! Verification tokens prove control of an email address (account
//! activation) or authorize a password reset. A code is redeemable at
//! most once; the consuming delete in the store is the arbiter when two
//! redemptions race.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{
    EMAIL_CONFIRMATION_TTL_HOURS, PASSWORD_RESET_TTL_HOURS, VERIFICATION_CODE_BYTES,
};
use crate::errors::{AppError, AppResult};

/// What a verification code may be redeemed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationPurpose {
    EmailConfirmation,
    PasswordReset,
}

impl VerificationPurpose {
    /// Stable name used in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationPurpose::EmailConfirmation => "email-confirmation",
            VerificationPurpose::PasswordReset => "password-reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email-confirmation" => Some(VerificationPurpose::EmailConfirmation),
            "password-reset" => Some(VerificationPurpose::PasswordReset),
            _ => None,
        }
    }

    fn ttl(&self) -> Duration {
        match self {
            VerificationPurpose::EmailConfirmation => Duration::hours(EMAIL_CONFIRMATION_TTL_HOURS),
            VerificationPurpose::PasswordReset => Duration::hours(PASSWORD_RESET_TTL_HOURS),
        }
    }
}

/// Opaque single-use code owned by one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationToken {
    /// Hex-encoded CSPRNG output; doubles as the wire code (hex is
    /// URL-safe, so the value embeds directly into links).
    pub code: String,
    pub user_id: Uuid,
    pub purpose: VerificationPurpose,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationToken {
    /// Issue a fresh code for the given identity and purpose.
    pub fn issue(user_id: Uuid, purpose: VerificationPurpose) -> Self {
        let mut bytes = [0u8; VERIFICATION_CODE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let created_at = Utc::now();
        Self {
            code: hex::encode(bytes),
            user_id,
            purpose,
            created_at,
            expires_at: created_at + purpose.ttl(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Defensively decode a code received from the outside world.
///
/// Malformed input (wrong length, non-hex characters) yields
/// `InvalidToken`; it must never surface as a decoding fault. Returns
/// the canonical lowercase form used as the store key.
pub fn decode_code(code: &str) -> AppResult<String> {
    let decoded = hex::decode(code).map_err(|_| AppError::InvalidToken)?;
    if decoded.len() != VERIFICATION_CODE_BYTES {
        return Err(AppError::InvalidToken);
    }
    Ok(hex::encode(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_code_decodes() {
        let token = VerificationToken::issue(Uuid::new_v4(), VerificationPurpose::EmailConfirmation);
        assert_eq!(decode_code(&token.code).unwrap(), token.code);
    }

    #[test]
    fn test_malformed_codes_are_invalid_not_fatal() {
        for bad in ["", "zz", "not-hex!", "abcd", &"ab".repeat(33)] {
            assert!(matches!(decode_code(bad), Err(AppError::InvalidToken)));
        }
    }

    #[test]
    fn test_uppercase_code_normalizes() {
        let token = VerificationToken::issue(Uuid::new_v4(), VerificationPurpose::PasswordReset);
        let upper = token.code.to_uppercase();
        assert_eq!(decode_code(&upper).unwrap(), token.code);
    }

    #[test]
    fn test_purpose_ttls() {
        let confirm = VerificationToken::issue(Uuid::new_v4(), VerificationPurpose::EmailConfirmation);
        let reset = VerificationToken::issue(Uuid::new_v4(), VerificationPurpose::PasswordReset);
        assert!(confirm.expires_at - confirm.created_at > reset.expires_at - reset.created_at);
        assert!(!confirm.is_expired(confirm.created_at));
        assert!(confirm.is_expired(confirm.expires_at));
    }

    #[test]
    fn test_purpose_round_trip() {
        for purpose in [
            VerificationPurpose::EmailConfirmation,
            VerificationPurpose::PasswordReset,
        ] {
            assert_eq!(VerificationPurpose::parse(purpose.as_str()), Some(purpose));
        }
        assert_eq!(VerificationPurpose::parse("unknown"), None);
    }
}
