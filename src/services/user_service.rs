//! Identity queries.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::IdentityResponse;
use crate::errors::{AppResult, OptionExt};
use crate::infra::UnitOfWork;
use crate::types::{PaginatedResponse, PaginationParams};

/// Read-only identity lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserService: Send + Sync {
    async fn get_user(&self, id: Uuid) -> AppResult<IdentityResponse>;

    async fn get_user_by_email(&self, email: &str) -> AppResult<IdentityResponse>;

    async fn list_users(
        &self,
        params: PaginationParams,
    ) -> AppResult<PaginatedResponse<IdentityResponse>>;
}

/// Production implementation over the persistent store.
pub struct UserManager<U: UnitOfWork> {
    uow: Arc<U>,
}

impl<U: UnitOfWork> UserManager<U> {
    pub fn new(uow: Arc<U>) -> Self {
        Self { uow }
    }
}

#[async_trait]
impl<U: UnitOfWork> UserService for UserManager<U> {
    async fn get_user(&self, id: Uuid) -> AppResult<IdentityResponse> {
        let identity = self.uow.users().find_by_id(id).await?.ok_or_not_found()?;
        Ok(identity.into())
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<IdentityResponse> {
        let identity = self
            .uow
            .users()
            .find_by_email(email)
            .await?
            .ok_or_not_found()?;
        Ok(identity.into())
    }

    async fn list_users(
        &self,
        params: PaginationParams,
    ) -> AppResult<PaginatedResponse<IdentityResponse>> {
        let (identities, total) = self.uow.users().list(&params).await?;
        let items = identities.into_iter().map(Into::into).collect();
        Ok(PaginatedResponse::new(items, total, &params))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;

    use chrono::Utc;
    use mockall::predicate::eq;

    use super::*;
    use crate::domain::{Identity, Role};
    use crate::errors::AppError;
    use crate::infra::repositories::{
        MockUserRepository, RefreshTokenRepository, UserRepository, VerificationTokenRepository,
    };
    use crate::infra::TransactionContext;

    /// Unit-of-work double exposing only the mocked user repository.
    struct TestUnitOfWork {
        users: Arc<MockUserRepository>,
    }

    #[async_trait]
    impl UnitOfWork for TestUnitOfWork {
        fn users(&self) -> Arc<dyn UserRepository> {
            self.users.clone()
        }

        fn refresh_tokens(&self) -> Arc<dyn RefreshTokenRepository> {
            panic!("not used by the user service")
        }

        fn verification_tokens(&self) -> Arc<dyn VerificationTokenRepository> {
            panic!("not used by the user service")
        }

        async fn transaction<F, T>(&self, _f: F) -> AppResult<T>
        where
            F: for<'a> FnOnce(
                    TransactionContext<'a>,
                ) -> Pin<Box<dyn Future<Output = AppResult<T>> + Send + 'a>>
                + Send,
            T: Send,
        {
            panic!("not used by the user service")
        }
    }

    fn identity(id: Uuid) -> Identity {
        Identity {
            id,
            email: "test@example.com".to_string(),
            username: "test@example.com".to_string(),
            password_hash: "hashed".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            activated: true,
            roles: vec![Role::Regular],
            claims: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_get_user_maps_to_response() {
        let id = Uuid::new_v4();
        let found = identity(id);

        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .with(eq(id))
            .times(1)
            .returning(move |_| Ok(Some(found.clone())));

        let service = UserManager::new(Arc::new(TestUnitOfWork {
            users: Arc::new(repo),
        }));
        let response = service.get_user(id).await.unwrap();

        assert_eq!(response.id, id);
        assert_eq!(response.full_name, "Test User");
        assert_eq!(response.roles, vec![Role::Regular]);
    }

    #[tokio::test]
    async fn test_missing_user_maps_to_not_found() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));

        let service = UserManager::new(Arc::new(TestUnitOfWork {
            users: Arc::new(repo),
        }));
        let result = service.get_user(Uuid::new_v4()).await;

        assert!(matches!(result, Err(AppError::NotFound)));
    }
}
