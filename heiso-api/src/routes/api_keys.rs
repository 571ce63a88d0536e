/// API key management endpoints
///
/// Keys belong to the calling user within the current tenant. Other users'
/// keys are invisible here even to owners.
///
/// # Endpoints
///
/// - `GET /v1/api-keys?start=&limit=` - List keys (masked)
/// - `POST /v1/api-keys` - Create a key, plaintext returned once
/// - `GET /v1/api-keys/:id` - Show one key
/// - `PUT /v1/api-keys/:id` - Rename, change expiry or rate limit
/// - `DELETE /v1/api-keys/:id` - Revoke

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{authorize, Deleted, Page, PageQuery},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use heiso_shared::{
    auth::middleware::AuthContext,
    models::api_key::{ApiKey, CreateApiKey, RateLimit, UpdateApiKey, DEFAULT_PAGE_SIZE},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_api_keys).post(create_api_key))
        .route(
            "/:id",
            get(get_api_key).put(update_api_key).delete(revoke_api_key),
        )
}

/// Create API key request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    /// Label shown in listings
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Optional expiration date (ISO 8601)
    pub expires_at: Option<DateTime<Utc>>,

    /// Optional `{ "requests": 100, "window_seconds": 60 }`
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    pub expires_at: Option<DateTime<Utc>>,

    pub rate_limit: Option<RateLimit>,
}

/// Create API key response
#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    #[serde(flatten)]
    pub api_key: ApiKey,

    /// The plaintext API key (ONLY returned on creation)
    ///
    /// This is the only time the plaintext key is shown. It cannot be
    /// retrieved later.
    pub plaintext_key: String,
}

fn check_rate_limit(rate_limit: Option<&RateLimit>) -> ApiResult<()> {
    match rate_limit {
        Some(limit) if limit.requests == 0 || limit.window_seconds == 0 => Err(
            ApiError::invalid_field("rate_limit", "Requests and window must be positive"),
        ),
        _ => Ok(()),
    }
}

fn check_expiry(expires_at: Option<&DateTime<Utc>>) -> ApiResult<()> {
    match expires_at {
        Some(at) if *at <= Utc::now() => Err(ApiError::invalid_field(
            "expires_at",
            "Expiration must be in the future",
        )),
        _ => Ok(()),
    }
}

/// List the caller's API keys
///
/// ```text
/// GET /v1/api-keys?start=0&limit=10
/// ```
///
/// ```json
/// { "items": [{ "id": "...", "name": "CI", "truncated_key": "sk_abcd...wxyz" }], "total": 1 }
/// ```
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<ApiKey>>> {
    let mut tx = authorize(&state, &auth, "api_key", "read").await?;
    let (items, total) = ApiKey::list(
        &mut tx,
        &auth.user_id,
        query.start(),
        query.limit(DEFAULT_PAGE_SIZE),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(Page { items, total }))
}

/// Create API key
///
/// ```text
/// POST /v1/api-keys
/// Authorization: Bearer <jwt_token>
/// X-Tenant-Id: <tenant_id>
///
/// { "name": "Production Server", "expires_at": "2027-01-01T00:00:00Z" }
/// ```
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreateApiKeyResponse>)> {
    req.validate()?;
    check_expiry(req.expires_at.as_ref())?;
    check_rate_limit(req.rate_limit.as_ref())?;

    let mut tx = authorize(&state, &auth, "api_key", "create").await?;
    let (api_key, plaintext_key) = ApiKey::create(
        &mut tx,
        &auth.user_id,
        CreateApiKey {
            name: req.name.trim().to_string(),
            expires_at: req.expires_at,
            rate_limit: req.rate_limit,
        },
    )
    .await?;
    tx.commit().await?;

    info!(
        api_key_id = %api_key.id,
        tenant_id = %auth.tenant_id,
        user_id = %auth.user_id,
        "API key created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            api_key,
            plaintext_key,
        }),
    ))
}

pub async fn get_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiKey>> {
    let mut tx = authorize(&state, &auth, "api_key", "read").await?;
    let api_key = ApiKey::find(&mut tx, &id, &auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("API key not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(api_key))
}

pub async fn update_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateApiKeyRequest>,
) -> ApiResult<Json<ApiKey>> {
    req.validate()?;
    check_expiry(req.expires_at.as_ref())?;
    check_rate_limit(req.rate_limit.as_ref())?;

    let mut tx = authorize(&state, &auth, "api_key", "update").await?;
    let api_key = ApiKey::update(
        &mut tx,
        &id,
        &auth.user_id,
        UpdateApiKey {
            name: req.name.map(|n| n.trim().to_string()),
            expires_at: req.expires_at,
            rate_limit: req.rate_limit,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("API key not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(api_key))
}

/// Revoke API key
///
/// The key stops authenticating immediately.
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "api_key", "delete").await?;
    if !ApiKey::delete(&mut tx, &id, &auth.user_id).await? {
        return Err(ApiError::NotFound("API key not found".to_string()));
    }
    tx.commit().await?;

    info!(api_key_id = %id, tenant_id = %auth.tenant_id, "API key revoked");
    Ok(Json(Deleted { deleted: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_create_request_validation() {
        let req = CreateApiKeyRequest {
            name: String::new(),
            expires_at: None,
            rate_limit: None,
        };
        assert!(req.validate().is_err());

        let req = CreateApiKeyRequest {
            name: "CI".to_string(),
            expires_at: None,
            rate_limit: None,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_expiry_must_be_future() {
        let past = Utc::now() - Duration::hours(1);
        assert!(check_expiry(Some(&past)).is_err());

        let future = Utc::now() + Duration::days(30);
        assert!(check_expiry(Some(&future)).is_ok());
        assert!(check_expiry(None).is_ok());
    }

    #[test]
    fn test_rate_limit_must_be_positive() {
        let zero = RateLimit {
            requests: 0,
            window_seconds: 60,
        };
        assert!(check_rate_limit(Some(&zero)).is_err());

        let ok = RateLimit {
            requests: 100,
            window_seconds: 60,
        };
        assert!(check_rate_limit(Some(&ok)).is_ok());
    }
}
