//! Domain layer - Core business entities and logic
//!
//! Contains the entities and value objects of the credential protocol,
//! independent of infrastructure concerns.

pub mod identity;
pub mod password;
pub mod refresh;
pub mod verification;

pub use identity::{normalize_email, Identity, IdentityResponse, NewIdentity, Role};
pub use password::Password;
pub use refresh::RefreshToken;
pub use verification::{decode_code, VerificationPurpose, VerificationToken};
