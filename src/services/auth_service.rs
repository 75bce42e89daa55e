//! Credential validation and session token issuance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{Identity, Password, RefreshToken};
use crate::errors::{AppError, AppResult};
use crate::infra::UnitOfWork;

/// Claims embedded in a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Login name (the account email)
    pub sub: String,
    /// Unique token id
    pub jti: String,
    pub email: String,
    /// Account id
    pub uid: Uuid,
    /// Network address the session was issued to
    pub ip: String,
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Custom per-account claims travel alongside the registered set
    #[serde(flatten)]
    pub custom: HashMap<String, String>,
}

/// Successful login payload.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub id: Uuid,
    pub token: String,
    /// Handed to the cookie layer; never serialized into the body.
    #[serde(skip_serializing)]
    pub refresh_token: String,
}

/// Authentication operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Validate credentials and issue a session plus refresh token.
    async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        ip_address: &str,
    ) -> AppResult<LoginResponse>;

    /// Decode and verify a session token's signature, issuer, audience
    /// and expiry.
    fn verify_token(&self, token: &str) -> AppResult<Claims>;
}

// Hashing a fixed dummy password keeps the cost of a failed lookup
// indistinguishable from a failed password check.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| {
    Password::new("dummy-password-for-timing")
        .map(Password::into_string)
        .unwrap_or_default()
});

/// Production implementation over the persistent store.
pub struct Authenticator<U: UnitOfWork> {
    uow: Arc<U>,
    config: Config,
}

impl<U: UnitOfWork> Authenticator<U> {
    pub fn new(uow: Arc<U>, config: Config) -> Self {
        Self { uow, config }
    }

    async fn validate_credentials(&self, email: &str, password: &str) -> AppResult<Identity> {
        let candidate = self.uow.users().find_by_email(email).await?;

        // Always run the full verification, against a dummy hash when
        // no account matches.
        let stored = candidate
            .as_ref()
            .map(|identity| identity.password_hash.clone())
            .unwrap_or_else(|| DUMMY_HASH.clone());
        let valid = Password::from_hash(stored).verify(password);

        match candidate {
            Some(identity) if valid => {
                if !identity.activated {
                    // Distinct from bad credentials: the account exists
                    // but has not confirmed its email.
                    return Err(AppError::AccountNotActivated);
                }
                Ok(identity)
            }
            _ => Err(AppError::InvalidCredentials),
        }
    }

    fn issue_session_token(&self, identity: &Identity, ip_address: &str) -> AppResult<String> {
        let iat = Utc::now();
        // Expiry must land strictly after issuance even when misconfigured
        let minutes = self.config.jwt_duration_minutes.max(1);
        let exp = iat + Duration::minutes(minutes);

        let claims = Claims {
            sub: identity.username.clone(),
            jti: Uuid::new_v4().to_string(),
            email: identity.email.clone(),
            uid: identity.id,
            ip: ip_address.to_string(),
            roles: identity.roles.iter().map(|r| r.to_string()).collect(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
            custom: identity.claims.clone(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret_bytes()),
        )?)
    }
}

#[async_trait]
impl<U: UnitOfWork> AuthService for Authenticator<U> {
    // rememberMe is accepted for wire compatibility but does not
    // change the 7-day refresh TTL.
    async fn login(
        &self,
        email: &str,
        password: &str,
        _remember_me: bool,
        ip_address: &str,
    ) -> AppResult<LoginResponse> {
        let identity = self.validate_credentials(email, password).await?;

        let token = self.issue_session_token(&identity, ip_address)?;

        // Every login gets a fresh refresh token
        let refresh = RefreshToken::generate(ip_address);
        self.uow
            .refresh_tokens()
            .insert(identity.id, &refresh)
            .await?;

        tracing::info!(user_id = %identity.id, "login succeeded");

        Ok(LoginResponse {
            id: identity.id,
            token,
            refresh_token: refresh.token,
        })
    }

    fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}
