//! Account handlers: authentication, registration and verification.

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::api::extractors::{ClientIp, ValidatedJson};
use crate::api::AppState;
use crate::config::REFRESH_TOKEN_TTL_DAYS;
use crate::domain::NewIdentity;
use crate::errors::{AppError, AppResult};
use crate::types::ApiResponse;

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    /// Account email address
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
    /// Account password
    #[schema(example = "SecurePass123!")]
    pub password: String,
    /// Accepted for wire compatibility; does not change token lifetime
    #[serde(default)]
    pub remember_me: bool,
}

/// Registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "First name is required"))]
    #[schema(example = "Ada")]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    #[schema(example = "Lovelace")]
    pub last_name: String,
    /// Account email address
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
    /// Account password (minimum 8 characters)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "SecurePass123!", min_length = 8)]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    #[schema(example = "SecurePass123!")]
    pub confirm_password: String,
}

/// Email confirmation query parameters
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmEmailParams {
    pub user_id: Uuid,
    pub code: String,
}

/// Forgot password request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
}

/// Reset password request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
    pub code: String,
    /// New password (minimum 8 characters)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(min_length = 8)]
    pub password: String,
}

/// Create account routes
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/authenticate", post(authenticate))
        .route("/register", post(register))
        .route("/confirm-email", get(confirm_email))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

/// The origin the verification links should point back at: the caller's
/// Origin header when present, this server otherwise.
fn request_origin(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("http://{}", state.config.server_addr()))
}

/// Authenticate and receive a session token
#[utoipa::path(
    post,
    path = "/api/account/authenticate",
    tag = "Account",
    request_body = AuthenticateRequest,
    responses(
        (status = 200, description = "Login successful; refresh token set as HttpOnly cookie"),
        (status = 400, description = "Invalid credentials"),
        (status = 403, description = "Account not activated")
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidatedJson(payload): ValidatedJson<AuthenticateRequest>,
) -> AppResult<Response> {
    let login = state
        .services
        .auth
        .login(&payload.email, &payload.password, payload.remember_me, &ip)
        .await?;

    // The refresh token travels only in an HttpOnly cookie; the body
    // serialization skips it.
    let cookie = format!(
        "refreshToken={}; HttpOnly; Path=/; Max-Age={}",
        login.refresh_token,
        REFRESH_TOKEN_TTL_DAYS * 24 * 60 * 60
    );
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|_| AppError::internal("refresh token cookie construction failed"))?;

    let mut response = Json(ApiResponse::ok(login)).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    Ok(response)
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/account/register",
    tag = "Account",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered; confirmation mail sent"),
        (status = 400, description = "Validation error or email already registered"),
        (status = 500, description = "Confirmation mail could not be sent")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Uuid>>)> {
    let origin = request_origin(&headers, &state);
    let profile = NewIdentity::new(&payload.email, payload.first_name, payload.last_name);

    let outcome = state
        .services
        .accounts
        .register(profile, &payload.password, &origin)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(outcome.id, outcome.message)),
    ))
}

/// Confirm an account's email address
#[utoipa::path(
    get,
    path = "/api/account/confirm-email",
    tag = "Account",
    params(ConfirmEmailParams),
    responses(
        (status = 200, description = "Email confirmed"),
        (status = 400, description = "Invalid or expired code")
    )
)]
pub async fn confirm_email(
    State(state): State<AppState>,
    Query(params): Query<ConfirmEmailParams>,
) -> AppResult<Json<ApiResponse<()>>> {
    let message = state
        .services
        .accounts
        .confirm_email(params.user_id, &params.code)
        .await?;
    Ok(Json(ApiResponse::message(message)))
}

/// Request a password reset link
#[utoipa::path(
    post,
    path = "/api/account/forgot-password",
    tag = "Account",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Uniform response whether or not the address is registered")
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<ForgotPasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let origin = request_origin(&headers, &state);
    let message = state
        .services
        .accounts
        .forgot_password(&payload.email, &origin)
        .await?;
    Ok(Json(ApiResponse::message(message)))
}

/// Reset a password with a mailed code
#[utoipa::path(
    post,
    path = "/api/account/reset-password",
    tag = "Account",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Invalid or expired code"),
        (status = 404, description = "No account matches the supplied email")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let message = state
        .services
        .accounts
        .reset_password(&payload.email, &payload.code, &payload.password)
        .await?;
    Ok(Json(ApiResponse::message(message)))
}
