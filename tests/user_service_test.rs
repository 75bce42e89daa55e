//! User service tests over the in-memory store.

use std::sync::Arc;

use uuid::Uuid;

use expense_desk::domain::{NewIdentity, Role};
use expense_desk::errors::AppError;
use expense_desk::infra::{MemoryStore, UnitOfWork};
use expense_desk::services::{UserManager, UserService};
use expense_desk::types::PaginationParams;

/// Seed one identity directly through the transactional store.
async fn seed(store: &MemoryStore, email: &str) -> Uuid {
    let profile = NewIdentity::new(email, "Test", "User");
    store
        .transaction(move |ctx| {
            Box::pin(async move {
                let identity = ctx.create_identity(&profile, "not-a-real-hash").await?;
                ctx.assign_role(identity.id, Role::Regular).await?;
                Ok(identity.id)
            })
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_get_user_by_id_and_email() {
    let store = MemoryStore::new();
    let id = seed(&store, "ada@example.com").await;
    let users = UserManager::new(Arc::new(store));

    let by_id = users.get_user(id).await.unwrap();
    assert_eq!(by_id.email, "ada@example.com");
    assert_eq!(by_id.roles, vec![Role::Regular]);

    // Email lookup normalizes case and whitespace
    let by_email = users.get_user_by_email("  Ada@Example.COM ").await.unwrap();
    assert_eq!(by_email.id, id);
}

#[tokio::test]
async fn test_get_unknown_user_is_not_found() {
    let store = MemoryStore::new();
    let users = UserManager::new(Arc::new(store));

    let by_id = users.get_user(Uuid::new_v4()).await;
    assert!(matches!(by_id, Err(AppError::NotFound)));

    let by_email = users.get_user_by_email("nobody@example.com").await;
    assert!(matches!(by_email, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_list_users_pages_through_all_records() {
    let store = MemoryStore::new();
    for i in 0..25 {
        seed(&store, &format!("user{}@example.com", i)).await;
    }
    let users = UserManager::new(Arc::new(store));

    let params = PaginationParams {
        page: Some(1),
        per_page: Some(10),
    };
    let first = users.list_users(params).await.unwrap();
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total, 25);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.items[0].email, "user0@example.com");

    let last = users
        .list_users(PaginationParams {
            page: Some(3),
            per_page: Some(10),
        })
        .await
        .unwrap();
    assert_eq!(last.items.len(), 5);

    let past_the_end = users
        .list_users(PaginationParams {
            page: Some(4),
            per_page: Some(10),
        })
        .await
        .unwrap();
    assert!(past_the_end.items.is_empty());
    assert_eq!(past_the_end.total, 25);
}
