/// Tenant endpoints
///
/// - `POST /v1/tenants/initialize` - Create a tenant with its owner and defaults
/// - `GET /v1/tenants/owner` - Whether the tenant of `X-Tenant-Id` has an owner
///
/// Initialization is gated by `X-Provision-Token`, compared against
/// `PROVISION_TOKEN`. Without that variable the endpoint answers 403.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::tenant::TenantId,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use heiso_shared::{
    auth::api_key::constant_time_compare,
    services::{
        accounts::{self, InitializeTenant, TenantInitialized},
        team,
    },
};
use serde::Serialize;
use validator::Validate;

pub const PROVISION_HEADER: &str = "x-provision-token";

#[derive(Debug, Serialize)]
pub struct OwnerResponse {
    pub has_owner: bool,
}

fn check_provision_token(expected: Option<&str>, headers: &HeaderMap) -> ApiResult<()> {
    let expected = expected
        .ok_or_else(|| ApiError::Forbidden("Tenant initialization is disabled".to_string()))?;

    let supplied = headers
        .get(PROVISION_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing provision token".to_string()))?;

    if constant_time_compare(supplied.trim(), expected) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Invalid provision token".to_string()))
    }
}

/// Initialize a tenant
///
/// # Endpoint
///
/// ```text
/// POST /v1/tenants/initialize
/// X-Provision-Token: <PROVISION_TOKEN>
///
/// {
///   "name": "Acme Docs",
///   "slug": "acme",
///   "modules": ["menu", "role", "navigation", "post"],
///   "owner_email": "owner@acme.io",
///   "owner_name": "Owner",
///   "owner_password": "Correct1Horse"
/// }
/// ```
///
/// # Response
///
/// `201 Created` with the tenant, the owner, a token pair for the owner and
/// the tenant's default API key. The plaintext key is shown only here.
///
/// # Errors
///
/// - `403 Forbidden`: Initialization disabled or wrong provision token
/// - `409 Conflict`: Slug taken, or the owner email belongs to another password
/// - `422 Unprocessable Entity`: Validation failed
pub async fn initialize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InitializeTenant>,
) -> ApiResult<(StatusCode, Json<TenantInitialized>)> {
    check_provision_token(state.config.provision_token.as_deref(), &headers)?;
    req.validate()?;

    let initialized = accounts::initialize_tenant(&state.db, state.jwt_secret(), req).await?;
    Ok((StatusCode::CREATED, Json(initialized)))
}

pub async fn has_owner(
    State(state): State<AppState>,
    tenant: TenantId,
) -> ApiResult<Json<OwnerResponse>> {
    let has_owner = team::tenant_has_owner(&state.db, tenant.as_str()).await?;
    Ok(Json(OwnerResponse { has_owner }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(token: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(PROVISION_HEADER, HeaderValue::from_static(token));
        }
        headers
    }

    #[test]
    fn test_provision_disabled_without_token() {
        let err = check_provision_token(None, &headers(Some("anything"))).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_provision_requires_header() {
        let err = check_provision_token(Some("s3cret"), &headers(None)).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_provision_token_compared() {
        assert!(check_provision_token(Some("s3cret"), &headers(Some("s3cret"))).is_ok());
        let err = check_provision_token(Some("s3cret"), &headers(Some("guess"))).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
