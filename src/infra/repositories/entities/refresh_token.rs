//! SeaORM entity for the `refresh_tokens` table.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "refresh_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// 80 hex characters of CSPRNG output.
    #[sea_orm(unique)]
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTimeUtc,
    /// Always exactly created_at + 7 days.
    pub expires_at: DateTimeUtc,
    pub created_by_ip: String,
    pub revoked: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
