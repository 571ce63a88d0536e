/// Team management endpoints
///
/// - `GET /v1/team` - Members with account and role details
/// - `POST /v1/team/invite` - Invite by email
/// - `POST /v1/team/members` - Add an account directly with an initial password
/// - `POST /v1/team/leave` - Leave the current tenant
/// - `POST /v1/team/transfer-ownership` - Hand the tenant to another member
/// - `PATCH /v1/team/:id` - Change role or status (approving a review mails the member)
/// - `DELETE /v1/team/:id` - Revoke an invitation or drop a member row
/// - `POST /v1/team/:id/resend` - New token, new email
/// - `DELETE /v1/team/:id/membership` - Remove a member (and an orphaned account)
/// - `POST /v1/team/:id/password` - Owner sets a member's password

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{caller_member, ensure_permission, Deleted},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use heiso_shared::{
    auth::middleware::AuthContext,
    models::{
        member::{Member, MemberStatus, TeamMember},
        tenant::Tenant,
        user::User,
    },
    services::team::{self, Invitation},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_members))
        .route("/invite", post(invite))
        .route("/members", post(add_member))
        .route("/leave", post(leave))
        .route("/transfer-ownership", post(transfer_ownership))
        .route("/:id", patch(update_member).delete(revoke_invite))
        .route("/:id/resend", post(resend_invite))
        .route("/:id/membership", delete(remove_member))
        .route("/:id/password", post(reset_member_password))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role_id: Option<String>,
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Role is required"))]
    pub role_id: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub initial_password: String,
}

#[derive(Debug, Serialize)]
pub struct AddMemberResponse {
    pub user: User,
    pub member: Member,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransferOwnershipRequest {
    #[validate(length(min = 1, message = "New owner is required"))]
    pub new_owner_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MemberPasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub left: bool,
    pub account_deleted: bool,
}

async fn current_tenant(state: &AppState, auth: &AuthContext) -> ApiResult<Tenant> {
    Tenant::find_by_id(&state.db, &auth.tenant_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tenant not found".to_string()))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<TeamMember>>> {
    ensure_permission(&state, &auth, "team", "read").await?;
    Ok(Json(team::list_members(&state.db, &auth.tenant_id).await?))
}

/// Invite by email
///
/// ```text
/// POST /v1/team/invite
///
/// { "email": "new@acme.io", "role_id": "ro_...", "name": "New Person" }
/// ```
///
/// Mails a link valid for 7 days. Inviting an email already on the team
/// answers `409 email_repeat`.
pub async fn invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<Invitation>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    req.validate()?;
    ensure_permission(&state, &auth, "team", "create").await?;

    let tenant = current_tenant(&state, &auth).await?;
    let member = team::invite(&state.db, &state.notifier, &tenant, req).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<AddMemberResponse>)> {
    req.validate()?;
    ensure_permission(&state, &auth, "team", "create").await?;

    let (user, member) = team::add_member(
        &state.db,
        &auth.tenant_id,
        &req.email,
        &req.role_id,
        &req.initial_password,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(AddMemberResponse { user, member })))
}

pub async fn update_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<Json<Member>> {
    ensure_permission(&state, &auth, "team", "update").await?;

    let tenant = current_tenant(&state, &auth).await?;
    let member = team::update_member(
        &state.db,
        &state.notifier,
        &tenant,
        &id,
        req.role_id.as_deref(),
        req.status,
    )
    .await?;
    Ok(Json(member))
}

pub async fn resend_invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Member>> {
    ensure_permission(&state, &auth, "team", "update").await?;

    let tenant = current_tenant(&state, &auth).await?;
    Ok(Json(team::resend_invite(&state.db, &state.notifier, &tenant, &id).await?))
}

pub async fn revoke_invite(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    ensure_permission(&state, &auth, "team", "delete").await?;

    team::revoke_invite(&state.db, &auth.tenant_id, &id).await?;
    Ok(Json(Deleted { deleted: true }))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<LeaveResponse>> {
    ensure_permission(&state, &auth, "team", "delete").await?;

    let account_deleted = team::leave_team(&state.db, &auth.tenant_id, &id).await?;
    Ok(Json(LeaveResponse {
        left: true,
        account_deleted,
    }))
}

/// The caller leaves. Owners must transfer ownership first.
pub async fn leave(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<LeaveResponse>> {
    let member = caller_member(&state, &auth).await?;

    let account_deleted = team::leave_team(&state.db, &auth.tenant_id, &member.id).await?;
    Ok(Json(LeaveResponse {
        left: true,
        account_deleted,
    }))
}

/// Only the current owner may call this. The former owner keeps membership
/// with the tenant's default role.
pub async fn transfer_ownership(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<TransferOwnershipRequest>,
) -> ApiResult<Json<Member>> {
    req.validate()?;
    let owner = caller_member(&state, &auth).await?;

    team::transfer_ownership(
        &state.db,
        &auth.tenant_id,
        &auth.user_id,
        &req.new_owner_id,
        &owner.id,
    )
    .await?;

    let me = caller_member(&state, &auth).await?;
    Ok(Json(me))
}

pub async fn reset_member_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<MemberPasswordRequest>,
) -> ApiResult<StatusCode> {
    req.validate()?;
    let actor = caller_member(&state, &auth).await?;

    team::reset_member_password(
        &state.db,
        &auth.tenant_id,
        &auth.user_id,
        &actor.id,
        &id,
        &req.password,
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
