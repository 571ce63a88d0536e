/// Tenant settings and public site settings
///
/// - `GET /v1/settings?include_keys=true` - Secret rows only on request
/// - `PUT /v1/settings/:name` - `{ "value": ..., "is_key": false }`
/// - `DELETE /v1/settings/:name`
/// - `GET /v1/site-settings`, `PUT /v1/site-settings/:name`

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
    models::setting::{Setting, SiteSetting},
};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_settings))
        .route("/:name", put(put_setting).delete(delete_setting))
}

pub fn site_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_site_settings))
        .route("/:name", put(put_site_setting))
}

#[derive(Debug, Default, Deserialize)]
pub struct SettingsQuery {
    #[serde(default)]
    pub include_keys: bool,
}

#[derive(Debug, Deserialize)]
pub struct SettingRequest {
    pub value: JsonValue,
    #[serde(default)]
    pub is_key: bool,
}

const MAX_NAME_LENGTH: usize = 100;

fn checked_name(name: &str) -> ApiResult<&str> {
    let name = name.trim();
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(ApiError::invalid_field(
            "name",
            format!("Name must be 1 to {} characters", MAX_NAME_LENGTH),
        ));
    }
    Ok(name)
}

pub async fn list_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<SettingsQuery>,
) -> ApiResult<Json<Map<String, JsonValue>>> {
    let mut tx = authorize(&state, &auth, "setting", "read").await?;
    let settings = Setting::all(&mut tx, query.include_keys).await?;
    tx.commit().await?;
    Ok(Json(settings))
}

pub async fn put_setting(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(req): Json<SettingRequest>,
) -> ApiResult<StatusCode> {
    let name = checked_name(&name)?;

    let mut tx = authorize(&state, &auth, "setting", "update").await?;
    Setting::put(&mut tx, name, &req.value, req.is_key).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_setting(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "setting", "delete").await?;
    if !Setting::delete(&mut tx, name.trim()).await? {
        return Err(ApiError::NotFound("Setting not found".to_string()));
    }
    tx.commit().await?;
    Ok(Json(Deleted { deleted: true }))
}

pub async fn list_site_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Map<String, JsonValue>>> {
    let mut tx = authorize(&state, &auth, "setting", "read").await?;
    let settings = SiteSetting::all(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(settings))
}

pub async fn put_site_setting(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(name): Path<String>,
    Json(req): Json<SettingRequest>,
) -> ApiResult<StatusCode> {
    let name = checked_name(&name)?;

    let mut tx = authorize(&state, &auth, "setting", "update").await?;
    SiteSetting::put(&mut tx, name, &req.value).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
