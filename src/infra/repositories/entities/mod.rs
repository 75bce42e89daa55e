//! SeaORM entity definitions
//!
//! These are database-specific entities separate from domain models.

pub mod refresh_token;
pub mod user;
pub mod user_role;
pub mod verification_token;
