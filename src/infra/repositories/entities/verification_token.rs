//! SeaORM entity for the `verification_tokens` table.
//!
//! Rows are deleted on redemption; the delete is the arbiter that makes
//! a code single-use under concurrent redemptions.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "verification_tokens")]
pub struct Model {
    /// Opaque single-use code (hex), also the wire format.
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub user_id: Uuid,
    /// "email-confirmation" or "password-reset".
    pub purpose: String,
    pub created_at: DateTimeUtc,
    pub expires_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
