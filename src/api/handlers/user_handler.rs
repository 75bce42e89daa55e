//! User query handlers. All routes require authentication.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Extension, Router,
};
use uuid::Uuid;

use crate::api::middleware::{require_admin, CurrentUser};
use crate::api::AppState;
use crate::domain::IdentityResponse;
use crate::errors::{AppError, AppResult};
use crate::types::{ApiResponse, PaginatedResponse, PaginationParams};

/// Create user routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(get_current_user))
        .route("/:id", get(get_user))
}

/// Get the authenticated user's own record
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = IdentityResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<IdentityResponse>>> {
    let user = state.services.users.get_user(current.id).await?;
    Ok(Json(ApiResponse::ok(user)))
}

/// Get a user by id (self or admin)
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = IdentityResponse),
        (status = 403, description = "Not allowed to view this user"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<IdentityResponse>>> {
    if current.id != id && !current.is_admin() {
        return Err(AppError::Forbidden);
    }
    let user = state.services.users.get_user(id).await?;
    Ok(Json(ApiResponse::ok(user)))
}

/// List users (admin only)
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated user list"),
        (status = 403, description = "Admin role required")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<IdentityResponse>>>> {
    require_admin(&current)?;
    let page = state.services.users.list_users(params).await?;
    Ok(Json(ApiResponse::ok(page)))
}
