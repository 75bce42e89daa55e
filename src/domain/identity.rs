//! Identity domain entity and related types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{ROLE_ADMIN, ROLE_REGULAR};

/// Closed set of roles an identity can hold.
///
/// Role membership is modelled as enum variants rather than free-form
/// strings; only the token claims serialize roles as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    Regular,
    Admin,
}

impl Role {
    /// Check if this role has admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Parse a stored role name; unknown values fall back to Regular.
    pub fn parse(s: &str) -> Self {
        match s {
            ROLE_ADMIN => Role::Admin,
            _ => Role::Regular,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Regular => write!(f, "{}", ROLE_REGULAR),
            Role::Admin => write!(f, "{}", ROLE_ADMIN),
        }
    }
}

/// Normalize an email address for storage and lookup.
///
/// Emails are unique case-insensitively; every boundary passes through
/// this before touching the store.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Identity domain entity: a registered account record.
///
/// Created at registration, mutated by role assignment and activation,
/// never hard-deleted (the only undo is a registration rollback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    /// Login name; set to the email at registration.
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// Accounts start unconfirmed; `ConfirmEmail` flips this exactly once.
    pub activated: bool,
    pub roles: Vec<Role>,
    /// Open mapping of custom claim key/value pairs embedded in tokens.
    pub claims: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

/// Profile fields supplied at registration.
///
/// The username is derived from the email; the password travels
/// separately and is hashed before it reaches the store.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewIdentity {
    /// Build a pending identity profile with a normalized email.
    pub fn new(email: &str, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            email: normalize_email(email),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Identity response (safe to return to clients)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IdentityResponse {
    /// Unique identity identifier
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    /// Account email address
    #[schema(example = "user@example.com")]
    pub email: String,
    #[schema(example = "Ada")]
    pub first_name: String,
    #[schema(example = "Lovelace")]
    pub last_name: String,
    #[schema(example = "Ada Lovelace")]
    pub full_name: String,
    /// Whether the account has confirmed its email address
    pub activated: bool,
    /// Assigned roles
    pub roles: Vec<Role>,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        let full_name = identity.full_name();
        Self {
            id: identity.id,
            email: identity.email,
            first_name: identity.first_name,
            last_name: identity.last_name,
            full_name,
            activated: identity.activated,
            roles: identity.roles,
            created_at: identity.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
        assert_eq!(normalize_email("user@x.com"), "user@x.com");
    }

    #[test]
    fn test_role_parse_round_trip() {
        assert_eq!(Role::parse(&Role::Admin.to_string()), Role::Admin);
        assert_eq!(Role::parse(&Role::Regular.to_string()), Role::Regular);
        // Unknown values fall back to Regular
        assert_eq!(Role::parse("Superuser"), Role::Regular);
    }

    #[test]
    fn test_full_name() {
        let profile = NewIdentity::new("Ada@X.com", "Ada", "Lovelace");
        assert_eq!(profile.email, "ada@x.com");
    }
}
