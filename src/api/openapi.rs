//! OpenAPI documentation configuration.
//!
//! Provides Swagger UI for API exploration and testing.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::handlers::{account_handler, user_handler};
use crate::domain::{IdentityResponse, Role};

/// OpenAPI documentation for the ExpenseDesk identity API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "ExpenseDesk Identity API",
        version = "0.1.0",
        description = "Credential validation, session issuance and account lifecycle for ExpenseDesk"
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        // Account endpoints
        account_handler::authenticate,
        account_handler::register,
        account_handler::confirm_email,
        account_handler::forgot_password,
        account_handler::reset_password,
        // User endpoints
        user_handler::get_current_user,
        user_handler::get_user,
        user_handler::list_users,
    ),
    components(
        schemas(
            // Domain types
            Role,
            IdentityResponse,
            // Account request types
            account_handler::AuthenticateRequest,
            account_handler::RegisterRequest,
            account_handler::ForgotPasswordRequest,
            account_handler::ResetPasswordRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Account", description = "Authentication, registration and verification"),
        (name = "Users", description = "Identity lookups")
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for JWT Bearer authentication
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Session token obtained from /api/account/authenticate"))
                        .build(),
                ),
            );
        }
    }
}
