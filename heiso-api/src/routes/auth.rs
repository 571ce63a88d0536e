/// Authentication endpoints
///
/// Public (tenant named by `X-Tenant-Id`):
///
/// - `POST /v1/auth/register` - Sign up in a tenant
/// - `POST /v1/auth/login` - Password login
/// - `POST /v1/auth/login-method` - Which login methods apply to an email
/// - `POST /v1/auth/refresh` - Exchange a refresh token
/// - `POST /v1/auth/otp/request` - Email a one-time code
/// - `POST /v1/auth/otp/verify` - Sign in with a one-time code
/// - `POST /v1/auth/otp/status` - Whether a usable code exists
/// - `POST /v1/auth/password/forgot` - Email a reset link
/// - `POST /v1/auth/password/reset` - Set a password with a reset token
///
/// Authenticated:
///
/// - `GET /v1/auth/me` - Current account
/// - `POST /v1/auth/password/change` - Change own password
/// - `GET /v1/me/permissions` - Permissions in the current tenant

use crate::{app::AppState, error::ApiResult, middleware::tenant::TenantId};
use axum::{extract::State, http::StatusCode, Extension, Json};
use heiso_shared::{
    auth::{authorization::UserPermission, jwt, middleware::AuthContext},
    models::user::{LoginMethod, User},
    services::{
        accounts::{self, LoginOutcome, Signup, SignupOutcome},
        otp::{self, OtpIssued, OtpStatus},
        recovery,
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginMethodResponse {
    pub login_method: LoginMethod,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Register in the tenant of `X-Tenant-Id`
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// X-Tenant-Id: t_8Hq2LxP0aZ
/// Content-Type: application/json
///
/// {
///   "name": "Ada",
///   "email": "ada@example.com",
///   "password": "Correct1Horse"
/// }
/// ```
///
/// # Response
///
/// `201 Created` with the account, the resulting membership status and,
/// when the member may sign in right away, a token pair. The first member
/// of a tenant becomes its owner and also receives a default API key.
///
/// # Errors
///
/// - `400 Bad Request`: Missing `X-Tenant-Id`
/// - `409 Conflict`: The email belongs to an account that has signed in before
/// - `422 Unprocessable Entity`: Validation failed
pub async fn register(
    State(state): State<AppState>,
    tenant: TenantId,
    Json(req): Json<Signup>,
) -> ApiResult<(StatusCode, Json<SignupOutcome>)> {
    req.validate()?;

    let outcome = accounts::signup(&state.db, state.jwt_secret(), tenant.as_str(), req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Password login
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/login
/// X-Tenant-Id: t_8Hq2LxP0aZ
///
/// { "email": "ada@example.com", "password": "Correct1Horse" }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "status": "authenticated",
///   "user": { "id": "u_...", "email": "ada@example.com", ... },
///   "access_token": "eyJ...",
///   "refresh_token": "eyJ...",
///   "expires_in": 86400,
///   "must_change_password": false
/// }
/// ```
///
/// Accounts with two-factor enabled get `{"status": "two_factor_required",
/// "email": ..., "expires_at": ...}` instead and finish through
/// `/v1/auth/otp/verify`.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
/// - `403 Forbidden`: Inactive account, not a member, or password login disabled
pub async fn login(
    State(state): State<AppState>,
    tenant: TenantId,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginOutcome>> {
    req.validate()?;

    let outcome = accounts::login(
        &state.db,
        &state.notifier,
        state.jwt_secret(),
        tenant.as_str(),
        &req.email,
        &req.password,
    )
    .await?;

    Ok(Json(outcome))
}

/// Login methods available to `email`. Unknown emails report `both`.
pub async fn login_method(
    State(state): State<AppState>,
    tenant: TenantId,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<LoginMethodResponse>> {
    req.validate()?;

    let login_method = accounts::login_method(&state.db, tenant.as_str(), &req.email).await?;
    Ok(Json(LoginMethodResponse { login_method }))
}

/// Exchanges a refresh token for a new access token.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid or expired refresh token, an access token, or
///   an account that has since been deactivated or left the tenant
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token =
        accounts::refresh_session(&state.db, state.jwt_secret(), &req.refresh_token).await?;
    Ok(Json(RefreshResponse { access_token }))
}

pub async fn request_otp(
    State(state): State<AppState>,
    tenant: TenantId,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<OtpIssued>> {
    req.validate()?;

    let issued = otp::generate(&state.db, &state.notifier, tenant.as_str(), &req.email).await?;
    Ok(Json(issued))
}

/// Signs in with a one-time code and returns the same body as a password login.
pub async fn verify_otp(
    State(state): State<AppState>,
    tenant: TenantId,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<Json<LoginOutcome>> {
    req.validate()?;

    let user = otp::verify(&state.db, tenant.as_str(), &req.email, &req.code).await?;
    let tokens = jwt::issue_token_pair(&user.id, tenant.as_str(), state.jwt_secret())?;

    info!(user_id = %user.id, tenant_id = %tenant.as_str(), "Signed in with one-time code");
    Ok(Json(LoginOutcome::Authenticated {
        must_change_password: user.must_change_password,
        user,
        tokens,
    }))
}

pub async fn otp_status(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<OtpStatus>> {
    req.validate()?;
    Ok(Json(otp::status(&state.db, &req.email).await?))
}

/// Always answers the same way so callers cannot tell which accounts exist.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    recovery::request_reset(&state.db, &state.notifier, &req.email).await?;
    Ok(MessageResponse::new(
        "If an account exists for this email, a reset link has been sent",
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    recovery::reset_password(&state.db, &req.token, &req.password).await?;
    Ok(MessageResponse::new("Password has been reset"))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    Ok(Json(accounts::me(&state.db, &auth.user_id).await?))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    recovery::change_password(&state.db, &auth.user_id, &req.current_password, &req.new_password)
        .await?;
    Ok(MessageResponse::new("Password changed"))
}

pub async fn my_permissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UserPermission>> {
    let permission = accounts::permissions(&state.db, &auth.tenant_id, &auth.user_id).await?;
    Ok(Json(permission))
}
