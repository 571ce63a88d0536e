/// Invitation endpoints (public, tenant named by `X-Tenant-Id`)
///
/// - `GET /v1/join/validate?token=...` - Check a token before showing the join page
/// - `GET /v1/join/:token` - Invitation details
/// - `POST /v1/join/:token/accept`
/// - `POST /v1/join/:token/decline`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::tenant::TenantId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use heiso_shared::{
    models::member::Member,
    services::invites::{self, PendingInvite},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub invite: PendingInvite,
}

/// # Errors
///
/// - `400 missing_token`: No token in the query
/// - `404 invalid_token`: Unknown, answered or revoked token
/// - `410 expired_token`: The invitation expired
pub async fn validate(
    State(state): State<AppState>,
    tenant: TenantId,
    Query(query): Query<ValidateQuery>,
) -> ApiResult<Json<ValidateResponse>> {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::coded(StatusCode::BAD_REQUEST, "missing_token", "Invitation token is required")
        })?;

    let invite = invites::find_valid(&state.db, tenant.as_str(), token).await?;
    Ok(Json(ValidateResponse { valid: true, invite }))
}

pub async fn show(
    State(state): State<AppState>,
    tenant: TenantId,
    Path(token): Path<String>,
) -> ApiResult<Json<PendingInvite>> {
    Ok(Json(invites::find_valid(&state.db, tenant.as_str(), &token).await?))
}

pub async fn accept(
    State(state): State<AppState>,
    tenant: TenantId,
    Path(token): Path<String>,
) -> ApiResult<Json<Member>> {
    Ok(Json(invites::accept(&state.db, tenant.as_str(), &token).await?))
}

pub async fn decline(
    State(state): State<AppState>,
    tenant: TenantId,
    Path(token): Path<String>,
) -> ApiResult<Json<Member>> {
    Ok(Json(invites::decline(&state.db, tenant.as_str(), &token).await?))
}
