/// Role and permission endpoints
///
/// Roles:
///
/// - `GET /v1/roles` - Roles with their menu ids and grants
/// - `POST /v1/roles`, `PUT /v1/roles/:id`, `DELETE /v1/roles/:id`
/// - `PUT /v1/roles/:id/menus` - Replace the role's menus
/// - `PUT /v1/roles/:id/permissions` - Replace the role's grants (`["post.read", ...]`)
///
/// Permissions:
///
/// - `GET /v1/permissions` - Catalog merged with stored rows; `?grouped=true` groups by menu
/// - `POST /v1/permissions`, `PUT /v1/permissions/:id`, `DELETE /v1/permissions/:id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{authorize, Deleted},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use heiso_shared::{
    auth::middleware::AuthContext,
    models::{
        permission::{self, Permission, PermissionEntry, PermissionInput, ACTIONS},
        role::{Grant, Role, RoleDetail, RoleInput},
        user::LoginMethod,
    },
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:id", put(update_role).delete(delete_role))
        .route("/:id/menus", put(assign_menus))
        .route("/:id/permissions", put(assign_permissions))
}

pub fn permission_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_permissions).post(create_permission))
        .route("/:id", put(update_permission).delete(delete_permission))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,

    pub description: Option<String>,

    #[serde(default)]
    pub full_access: bool,

    pub login_method: Option<LoginMethod>,

    /// Replaces the role's menus when present
    pub menu_ids: Option<Vec<String>>,

    /// Replaces the role's grants when present
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct MenuIdsRequest {
    pub menu_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantsRequest {
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PermissionRequest {
    pub menu_id: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Resource must be 1 to 50 characters"))]
    pub resource: String,

    #[validate(length(min = 1, max = 50, message = "Action must be 1 to 50 characters"))]
    pub action: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionQuery {
    #[serde(default)]
    pub grouped: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PermissionListing {
    Flat(Vec<PermissionEntry>),
    Grouped(BTreeMap<String, Vec<PermissionEntry>>),
}

/// Parses `resource.action` keys, rejecting the whole list on the first bad one.
fn parse_grants(keys: &[String]) -> ApiResult<Vec<Grant>> {
    keys.iter()
        .map(|key| {
            Grant::parse(key).ok_or_else(|| {
                ApiError::invalid_field("permissions", format!("Invalid permission key: {}", key))
            })
        })
        .collect()
}

fn role_input(req: &RoleRequest) -> RoleInput {
    RoleInput {
        name: req.name.trim().to_string(),
        description: req.description.clone(),
        full_access: req.full_access,
        login_method: req.login_method,
    }
}

pub async fn list_roles(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<RoleDetail>>> {
    let mut tx = authorize(&state, &auth, "role", "read").await?;
    let roles = Role::list(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(roles))
}

pub async fn create_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleDetail>)> {
    req.validate()?;
    let grants = req.permissions.as_deref().map(parse_grants).transpose()?;

    let mut tx = authorize(&state, &auth, "role", "create").await?;
    let role = Role::create(&mut tx, role_input(&req)).await?;

    let menu_ids = req.menu_ids.clone().unwrap_or_default();
    Role::assign_menus(&mut tx, &role.id, &menu_ids).await?;
    let grants = grants.unwrap_or_default();
    Role::assign_permissions(&mut tx, &role.id, &grants).await?;
    tx.commit().await?;

    info!(tenant_id = %auth.tenant_id, role_id = %role.id, "Role created");
    Ok((
        StatusCode::CREATED,
        Json(RoleDetail {
            role,
            menu_ids,
            permissions: grants.iter().map(|g| format!("{}.{}", g.resource, g.action)).collect(),
        }),
    ))
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<Json<Role>> {
    req.validate()?;
    let grants = req.permissions.as_deref().map(parse_grants).transpose()?;

    let mut tx = authorize(&state, &auth, "role", "update").await?;
    let role = Role::update(&mut tx, &id, role_input(&req))
        .await?
        .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;

    if let Some(menu_ids) = &req.menu_ids {
        Role::assign_menus(&mut tx, &role.id, menu_ids).await?;
    }
    if let Some(grants) = &grants {
        Role::assign_permissions(&mut tx, &role.id, grants).await?;
    }
    tx.commit().await?;

    Ok(Json(role))
}

pub async fn delete_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "role", "delete").await?;
    if !Role::delete(&mut tx, &id).await? {
        return Err(ApiError::NotFound("Role not found".to_string()));
    }
    tx.commit().await?;
    Ok(Json(Deleted { deleted: true }))
}

pub async fn assign_menus(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<MenuIdsRequest>,
) -> ApiResult<StatusCode> {
    let mut tx = authorize(&state, &auth, "role", "update").await?;
    Role::find_by_id(&mut tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;

    Role::assign_menus(&mut tx, &id, &req.menu_ids).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_permissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<GrantsRequest>,
) -> ApiResult<StatusCode> {
    let grants = parse_grants(&req.permissions)?;

    let mut tx = authorize(&state, &auth, "role", "update").await?;
    Role::find_by_id(&mut tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;

    Role::assign_permissions(&mut tx, &id, &grants).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_permissions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PermissionQuery>,
) -> ApiResult<Json<PermissionListing>> {
    let mut tx = authorize(&state, &auth, "permission", "read").await?;
    let entries = Permission::list_merged(&mut tx).await?;
    tx.commit().await?;

    Ok(Json(if query.grouped {
        PermissionListing::Grouped(permission::group_by_menu(&entries))
    } else {
        PermissionListing::Flat(entries)
    }))
}

fn permission_input(req: PermissionRequest) -> ApiResult<PermissionInput> {
    let action = req.action.trim().to_lowercase();
    if !ACTIONS.contains(&action.as_str()) {
        return Err(ApiError::invalid_field(
            "action",
            format!("Action must be one of {}", ACTIONS.join(", ")),
        ));
    }
    Ok(PermissionInput {
        menu_id: req.menu_id,
        resource: req.resource.trim().to_lowercase(),
        action,
    })
}

pub async fn create_permission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<PermissionRequest>,
) -> ApiResult<(StatusCode, Json<Permission>)> {
    req.validate()?;
    let input = permission_input(req)?;

    let mut tx = authorize(&state, &auth, "permission", "create").await?;
    let permission = Permission::create(&mut tx, input).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

pub async fn update_permission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<PermissionRequest>,
) -> ApiResult<Json<Permission>> {
    req.validate()?;
    let input = permission_input(req)?;

    let mut tx = authorize(&state, &auth, "permission", "update").await?;
    let permission = Permission::update(&mut tx, &id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Permission not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(permission))
}

pub async fn delete_permission(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "permission", "delete").await?;
    if !Permission::delete(&mut tx, &id).await? {
        return Err(ApiError::NotFound("Permission not found".to_string()));
    }
    tx.commit().await?;
    Ok(Json(Deleted { deleted: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grants() {
        let grants = parse_grants(&["post.read".to_string(), "team.update".to_string()]).unwrap();
        assert_eq!(grants.len(), 2);
        assert_eq!(grants[1].resource, "team");

        assert!(parse_grants(&["post".to_string()]).is_err());
    }

    #[test]
    fn test_permission_input_normalizes() {
        let input = permission_input(PermissionRequest {
            menu_id: None,
            resource: " Post ".to_string(),
            action: "READ".to_string(),
        })
        .unwrap();
        assert_eq!(input.resource, "post");
        assert_eq!(input.action, "read");

        let err = permission_input(PermissionRequest {
            menu_id: None,
            resource: "post".to_string(),
            action: "publish".to_string(),
        })
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
