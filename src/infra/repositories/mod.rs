//! Repository layer over the relational store.

pub mod entities;
pub mod token_repository;
pub mod user_repository;

pub use token_repository::{
    RefreshTokenRepository, RefreshTokenStore, VerificationTokenRepository, VerificationTokenStore,
};
pub use user_repository::{UserRepository, UserStore};

#[cfg(test)]
pub use token_repository::{MockRefreshTokenRepository, MockVerificationTokenRepository};
#[cfg(test)]
pub use user_repository::MockUserRepository;
