//! Identity lookup and mutation against the relational store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use super::entities::{user, user_role};
use crate::domain::{normalize_email, Identity, Role};
use crate::errors::{AppError, AppResult};
use crate::types::PaginationParams;

/// Read/write access to persisted identities.
///
/// Creation is deliberately absent: new identities only come into being
/// inside a registration transaction, via the transactional store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Identity>>;

    /// Look up by email. Callers pass the address as received; the
    /// store normalizes before matching.
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>>;

    /// Page through identities, returning the page and the total count.
    async fn list(&self, params: &PaginationParams) -> AppResult<(Vec<Identity>, u64)>;

    /// Mark an identity's email as confirmed. Idempotent at this layer;
    /// single-use enforcement lives with the verification code.
    async fn set_activated(&self, id: Uuid) -> AppResult<()>;

    async fn update_password(&self, id: Uuid, password_hash: String) -> AppResult<()>;
}

/// Assemble a domain identity from its row and role rows.
pub(crate) fn to_identity(model: user::Model, roles: Vec<user_role::Model>) -> Identity {
    let claims: HashMap<String, String> = serde_json::from_value(model.claims).unwrap_or_default();
    Identity {
        id: model.id,
        email: model.email,
        username: model.username,
        password_hash: model.password_hash,
        first_name: model.first_name,
        last_name: model.last_name,
        activated: model.activated,
        roles: roles.iter().map(|r| Role::parse(&r.role)).collect(),
        claims,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// SeaORM-backed implementation
pub struct UserStore {
    db: DatabaseConnection,
}

impl UserStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn hydrate(&self, model: user::Model) -> AppResult<Identity> {
        let roles = user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(model.id))
            .all(&self.db)
            .await?;
        Ok(to_identity(model, roles))
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Identity>> {
        match user::Entity::find_by_id(id).one(&self.db).await? {
            Some(model) => Ok(Some(self.hydrate(model).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>> {
        let model = user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&self.db)
            .await?;
        match model {
            Some(model) => Ok(Some(self.hydrate(model).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, params: &PaginationParams) -> AppResult<(Vec<Identity>, u64)> {
        let total = user::Entity::find().count(&self.db).await?;

        let page = user::Entity::find()
            .order_by_asc(user::Column::CreatedAt)
            .offset(params.offset())
            .limit(params.per_page())
            .all(&self.db)
            .await?;

        // Load roles for the whole page in one query
        let ids: Vec<Uuid> = page.iter().map(|u| u.id).collect();
        let mut roles_by_user: HashMap<Uuid, Vec<user_role::Model>> = HashMap::new();
        for role in user_role::Entity::find()
            .filter(user_role::Column::UserId.is_in(ids))
            .all(&self.db)
            .await?
        {
            roles_by_user.entry(role.user_id).or_default().push(role);
        }

        let identities = page
            .into_iter()
            .map(|model| {
                let roles = roles_by_user.remove(&model.id).unwrap_or_default();
                to_identity(model, roles)
            })
            .collect();

        Ok((identities, total))
    }

    async fn set_activated(&self, id: Uuid) -> AppResult<()> {
        let model = user::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let mut active: user::ActiveModel = model.into();
        active.activated = Set(true);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> AppResult<()> {
        let model = user::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        let mut active: user::ActiveModel = model.into();
        active.password_hash = Set(password_hash);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }
}
