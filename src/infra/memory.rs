//! In-memory identity store.
//!
//! Implements the same repository and unit-of-work surface as the SQL
//! store, backed by process memory. Used by the integration tests and
//! usable for local demos without a database. Transactions roll back by
//! restoring a snapshot, which assumes one writer at a time; that is
//! enough to exercise the registration rollback semantics.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repositories::{RefreshTokenRepository, UserRepository, VerificationTokenRepository};
use super::unit_of_work::{TransactionContext, TxStore, UnitOfWork};
use crate::domain::{
    normalize_email, Identity, NewIdentity, RefreshToken, Role, VerificationToken,
};
use crate::errors::{AppError, AppResult};
use crate::types::PaginationParams;

#[derive(Default, Clone)]
struct MemState {
    /// Insertion order doubles as the pagination order.
    users: Vec<Identity>,
    refresh_tokens: Vec<(Uuid, RefreshToken)>,
    verification_tokens: HashMap<String, VerificationToken>,
}

/// Shared in-memory store; clones see the same state.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh tokens issued to one identity, oldest first.
    pub async fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshToken> {
        self.state
            .lock()
            .await
            .refresh_tokens
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, token)| token.clone())
            .collect()
    }

    /// Outstanding (unredeemed) verification codes for one identity.
    pub async fn verification_tokens_for(&self, user_id: Uuid) -> Vec<VerificationToken> {
        self.state
            .lock()
            .await
            .verification_tokens
            .values()
            .filter(|token| token.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Identity>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>> {
        let email = normalize_email(email);
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list(&self, params: &PaginationParams) -> AppResult<(Vec<Identity>, u64)> {
        let state = self.state.lock().await;
        let total = state.users.len() as u64;
        let page = state
            .users
            .iter()
            .skip(params.offset() as usize)
            .take(params.per_page() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn set_activated(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        user.activated = true;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        user.password_hash = password_hash;
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn insert(&self, user_id: Uuid, token: &RefreshToken) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.refresh_tokens.push((user_id, token.clone()));
        Ok(())
    }
}

#[async_trait]
impl VerificationTokenRepository for MemoryStore {
    async fn insert(&self, token: &VerificationToken) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state
            .verification_tokens
            .insert(token.code.clone(), token.clone());
        Ok(())
    }

    async fn find(&self, code: &str) -> AppResult<Option<VerificationToken>> {
        let state = self.state.lock().await;
        Ok(state.verification_tokens.get(code).cloned())
    }

    async fn consume(&self, code: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state.verification_tokens.remove(code).is_some())
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    fn users(&self) -> Arc<dyn UserRepository> {
        Arc::new(self.clone())
    }

    fn refresh_tokens(&self) -> Arc<dyn RefreshTokenRepository> {
        Arc::new(self.clone())
    }

    fn verification_tokens(&self) -> Arc<dyn VerificationTokenRepository> {
        Arc::new(self.clone())
    }

    async fn transaction<F, T>(&self, f: F) -> AppResult<T>
    where
        F: for<'a> FnOnce(
                TransactionContext<'a>,
            ) -> Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>
            + Send,
        T: Send,
    {
        let snapshot = self.state.lock().await.clone();
        let store = MemoryTxStore {
            store: self.clone(),
        };
        let outcome = f(TransactionContext::new(&store)).await;
        if outcome.is_err() {
            *self.state.lock().await = snapshot;
        }
        outcome
    }
}

/// Transactional writes applied directly; rollback restores a snapshot.
struct MemoryTxStore {
    store: MemoryStore,
}

#[async_trait]
impl TxStore for MemoryTxStore {
    async fn create_identity(
        &self,
        profile: &NewIdentity,
        password_hash: &str,
    ) -> AppResult<Identity> {
        let mut state = self.store.state.lock().await;
        if state.users.iter().any(|u| u.email == profile.email) {
            return Err(AppError::validation(format!(
                "Email '{}' is already registered.",
                profile.email
            )));
        }

        let now = Utc::now();
        let identity = Identity {
            id: Uuid::new_v4(),
            email: profile.email.clone(),
            username: profile.email.clone(),
            password_hash: password_hash.to_string(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            activated: false,
            roles: Vec::new(),
            claims: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        state.users.push(identity.clone());
        Ok(identity)
    }

    async fn assign_role(&self, user_id: Uuid, role: Role) -> AppResult<()> {
        let mut state = self.store.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AppError::NotFound)?;
        if !user.roles.contains(&role) {
            user.roles.push(role);
        }
        Ok(())
    }

    async fn insert_verification(&self, token: &VerificationToken) -> AppResult<()> {
        let mut state = self.store.state.lock().await;
        state
            .verification_tokens
            .insert(token.code.clone(), token.clone());
        Ok(())
    }
}
