//! Unit of Work over the identity store.
//!
//! Registration must create an identity, assign its default role, and
//! stage a verification code as one atomic step. The `UnitOfWork` trait
//! exposes that step as a closure over a `TransactionContext`; the
//! closure's error rolls the whole step back, including errors raised
//! after the writes (a failed mail dispatch undoes the registration).
//!
//! The context wraps a `TxStore` capability object rather than a raw
//! database transaction, so the same service code runs against SQL in
//! production and against `MemoryStore` in tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, SqlErr, TransactionTrait,
};
use uuid::Uuid;

use super::repositories::entities::{user, user_role, verification_token};
use super::repositories::user_repository::to_identity;
use super::repositories::{
    RefreshTokenRepository, RefreshTokenStore, UserRepository, UserStore,
    VerificationTokenRepository, VerificationTokenStore,
};
use crate::domain::{Identity, NewIdentity, Role, VerificationToken};
use crate::errors::{AppError, AppResult};

/// Write operations available inside a transaction.
#[async_trait]
pub trait TxStore: Send + Sync {
    /// Insert a new, unactivated identity with no roles.
    /// A duplicate email is a validation error.
    async fn create_identity(&self, profile: &NewIdentity, password_hash: &str)
        -> AppResult<Identity>;

    async fn assign_role(&self, user_id: Uuid, role: Role) -> AppResult<()>;

    async fn insert_verification(&self, token: &VerificationToken) -> AppResult<()>;
}

/// Handle passed to a transaction closure.
pub struct TransactionContext<'a> {
    store: &'a (dyn TxStore + 'a),
}

impl<'a> TransactionContext<'a> {
    pub fn new(store: &'a (dyn TxStore + 'a)) -> Self {
        Self { store }
    }

    pub async fn create_identity(
        &self,
        profile: &NewIdentity,
        password_hash: &str,
    ) -> AppResult<Identity> {
        self.store.create_identity(profile, password_hash).await
    }

    pub async fn assign_role(&self, user_id: Uuid, role: Role) -> AppResult<()> {
        self.store.assign_role(user_id, role).await
    }

    pub async fn insert_verification(&self, token: &VerificationToken) -> AppResult<()> {
        self.store.insert_verification(token).await
    }
}

/// Access point for repositories and atomic multi-write steps.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn users(&self) -> Arc<dyn UserRepository>;

    fn refresh_tokens(&self) -> Arc<dyn RefreshTokenRepository>;

    fn verification_tokens(&self) -> Arc<dyn VerificationTokenRepository>;

    /// Run `f` atomically: commit on `Ok`, roll back on `Err`.
    async fn transaction<F, T>(&self, f: F) -> AppResult<T>
    where
        F: for<'a> FnOnce(
                TransactionContext<'a>,
            ) -> Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>
            + Send,
        T: Send;
}

/// Production unit of work over a SeaORM connection pool.
#[derive(Clone)]
pub struct Persistence {
    db: DatabaseConnection,
    users: Arc<UserStore>,
    refresh_tokens: Arc<RefreshTokenStore>,
    verification_tokens: Arc<VerificationTokenStore>,
}

impl Persistence {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            users: Arc::new(UserStore::new(db.clone())),
            refresh_tokens: Arc::new(RefreshTokenStore::new(db.clone())),
            verification_tokens: Arc::new(VerificationTokenStore::new(db.clone())),
            db,
        }
    }
}

#[async_trait]
impl UnitOfWork for Persistence {
    fn users(&self) -> Arc<dyn UserRepository> {
        self.users.clone()
    }

    fn refresh_tokens(&self) -> Arc<dyn RefreshTokenRepository> {
        self.refresh_tokens.clone()
    }

    fn verification_tokens(&self) -> Arc<dyn VerificationTokenRepository> {
        self.verification_tokens.clone()
    }

    async fn transaction<F, T>(&self, f: F) -> AppResult<T>
    where
        F: for<'a> FnOnce(
                TransactionContext<'a>,
            ) -> Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>
            + Send,
        T: Send,
    {
        let txn = self.db.begin().await?;
        let store = SqlTxStore { txn: &txn };
        let outcome = f(TransactionContext::new(&store)).await;

        match outcome {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::error!(error = ?rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Transactional writes bound to one open database transaction.
struct SqlTxStore<'a> {
    txn: &'a DatabaseTransaction,
}

fn duplicate_email(email: &str) -> AppError {
    AppError::validation(format!("Email '{}' is already registered.", email))
}

#[async_trait]
impl TxStore for SqlTxStore<'_> {
    async fn create_identity(
        &self,
        profile: &NewIdentity,
        password_hash: &str,
    ) -> AppResult<Identity> {
        // Fast path; the unique index on email is the real arbiter
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(profile.email.clone()))
            .one(self.txn)
            .await?;
        if existing.is_some() {
            return Err(duplicate_email(&profile.email));
        }

        let now = Utc::now();
        let inserted = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(profile.email.clone()),
            // The login name is the email address
            username: Set(profile.email.clone()),
            password_hash: Set(password_hash.to_string()),
            first_name: Set(profile.first_name.clone()),
            last_name: Set(profile.last_name.clone()),
            activated: Set(false),
            claims: Set(serde_json::json!({})),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.txn)
        .await;

        match inserted {
            Ok(model) => Ok(to_identity(model, Vec::new())),
            // Two registrations can race past the fast path; the loser
            // hits the unique index and gets the same validation error
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(duplicate_email(&profile.email))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn assign_role(&self, user_id: Uuid, role: Role) -> AppResult<()> {
        user_role::ActiveModel {
            user_id: Set(user_id),
            role: Set(role.to_string()),
        }
        .insert(self.txn)
        .await?;
        Ok(())
    }

    async fn insert_verification(&self, token: &VerificationToken) -> AppResult<()> {
        verification_token::ActiveModel {
            code: Set(token.code.clone()),
            user_id: Set(token.user_id),
            purpose: Set(token.purpose.as_str().to_string()),
            created_at: Set(token.created_at),
            expires_at: Set(token.expires_at),
        }
        .insert(self.txn)
        .await?;
        Ok(())
    }
}
