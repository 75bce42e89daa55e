//! Persistence for refresh tokens and verification codes.

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use super::entities::{refresh_token, verification_token};
use crate::domain::{RefreshToken, VerificationPurpose, VerificationToken};
use crate::errors::{AppError, AppResult};

/// Write-side store for issued refresh tokens.
///
/// Login only ever appends; the exchange and revocation flows are owned
/// by a different surface.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, user_id: Uuid, token: &RefreshToken) -> AppResult<()>;
}

/// Store for single-use verification codes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationTokenRepository: Send + Sync {
    async fn insert(&self, token: &VerificationToken) -> AppResult<()>;

    async fn find(&self, code: &str) -> AppResult<Option<VerificationToken>>;

    /// Delete the code, returning whether this caller removed it.
    /// Under racing redemptions exactly one caller sees `true`.
    async fn consume(&self, code: &str) -> AppResult<bool>;
}

/// SeaORM-backed implementation
pub struct RefreshTokenStore {
    db: DatabaseConnection,
}

impl RefreshTokenStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RefreshTokenRepository for RefreshTokenStore {
    async fn insert(&self, user_id: Uuid, token: &RefreshToken) -> AppResult<()> {
        refresh_token::ActiveModel {
            id: Set(token.id),
            token: Set(token.token.clone()),
            user_id: Set(user_id),
            created_at: Set(token.created),
            expires_at: Set(token.expires),
            created_by_ip: Set(token.created_by_ip.clone()),
            revoked: Set(token.revoked),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

/// SeaORM-backed implementation
pub struct VerificationTokenStore {
    db: DatabaseConnection,
}

impl VerificationTokenStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VerificationTokenRepository for VerificationTokenStore {
    async fn insert(&self, token: &VerificationToken) -> AppResult<()> {
        verification_token::ActiveModel {
            code: Set(token.code.clone()),
            user_id: Set(token.user_id),
            purpose: Set(token.purpose.as_str().to_string()),
            created_at: Set(token.created_at),
            expires_at: Set(token.expires_at),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }

    async fn find(&self, code: &str) -> AppResult<Option<VerificationToken>> {
        let model = verification_token::Entity::find_by_id(code.to_string())
            .one(&self.db)
            .await?;

        model
            .map(|m| {
                let purpose = VerificationPurpose::parse(&m.purpose).ok_or_else(|| {
                    AppError::internal(format!("unknown verification purpose '{}'", m.purpose))
                })?;
                Ok(VerificationToken {
                    code: m.code,
                    user_id: m.user_id,
                    purpose,
                    created_at: m.created_at,
                    expires_at: m.expires_at,
                })
            })
            .transpose()
    }

    async fn consume(&self, code: &str) -> AppResult<bool> {
        let result = verification_token::Entity::delete_by_id(code.to_string())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}
