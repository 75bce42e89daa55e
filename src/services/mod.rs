//! Application services.

pub mod account_service;
pub mod auth_service;
pub mod container;
pub mod user_service;

pub use account_service::{AccountManager, AccountService, RegisterOutcome};
pub use auth_service::{AuthService, Authenticator, Claims, LoginResponse};
pub use container::Services;
pub use user_service::{UserManager, UserService};

#[cfg(test)]
pub use account_service::MockAccountService;
#[cfg(test)]
pub use auth_service::MockAuthService;
#[cfg(test)]
pub use user_service::MockUserService;
