/// Request authentication
///
/// A request authenticates with either:
///
/// - `Authorization: Bearer <access token>`: the token names user and tenant
/// - `X-Api-Key: sk_...` together with `X-Tenant-Id`: the key is looked up
///   inside that tenant and acts as its owning user
///
/// On success an [`AuthContext`] is placed in the request extensions.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Extension, Router};
/// use heiso_shared::auth::middleware::{auth_middleware, AuthContext, AuthSettings};
/// use sqlx::PgPool;
///
/// async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
///     format!("{} @ {}", auth.user_id, auth.tenant_id)
/// }
///
/// fn router(pool: PgPool) -> Router {
///     let settings = AuthSettings::new(pool, "a-secret-of-at-least-32-characters");
///     Router::new()
///         .route("/whoami", get(whoami))
///         .layer(middleware::from_fn_with_state(settings, auth_middleware))
/// }
/// ```

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;

use super::api_key::validate_api_key_format;
use super::jwt::{validate_access_token, JwtError};
use crate::db::rls;
use crate::models::api_key::ApiKey;

/// Header carrying the tenant id on public and API-key requests
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Header carrying an API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication method used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Jwt,
    ApiKey,
}

/// Authenticated caller, added to request extensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: String,
    pub tenant_id: String,
    pub method: AuthMethod,

    /// Set for API key auth
    pub api_key_id: Option<String>,
}

impl AuthContext {
    pub fn from_jwt(user_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            method: AuthMethod::Jwt,
            api_key_id: None,
        }
    }

    pub fn from_api_key(api_key: &ApiKey, tenant_id: impl Into<String>) -> Self {
        Self {
            user_id: api_key.user_id.clone(),
            tenant_id: tenant_id.into(),
            method: AuthMethod::ApiKey,
            api_key_id: Some(api_key.id.clone()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Missing X-Tenant-Id header")]
    MissingTenant,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    InvalidApiKey(String),

    #[error("Token does not belong to tenant")]
    TenantMismatch,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::InvalidToken(_)
            | AuthError::InvalidApiKey(_) => StatusCode::UNAUTHORIZED,
            AuthError::MissingTenant | AuthError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            AuthError::TenantMismatch => StatusCode::FORBIDDEN,
            AuthError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::MissingTenant => "missing_tenant",
            AuthError::InvalidFormat(_) => "bad_request",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::InvalidApiKey(_) => "invalid_api_key",
            AuthError::TenantMismatch => "forbidden",
            AuthError::DatabaseError(_) => "internal_error",
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::DatabaseError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = Json(serde_json::json!({
            "error": self.code(),
            "message": message,
        }));
        (self.status(), body).into_response()
    }
}

/// What the middleware needs: the pool (for API keys) and the JWT secret
#[derive(Clone)]
pub struct AuthSettings {
    pub pool: PgPool,
    pub jwt_secret: Arc<str>,
}

impl AuthSettings {
    pub fn new(pool: PgPool, jwt_secret: &str) -> Self {
        Self {
            pool,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolves the caller from request headers.
///
/// # Errors
///
/// - [`AuthError::MissingCredentials`]: neither a Bearer token nor an API key
/// - [`AuthError::MissingTenant`]: API key without `X-Tenant-Id`
/// - [`AuthError::TenantMismatch`]: `X-Tenant-Id` disagrees with the token
/// - [`AuthError::InvalidToken`] / [`AuthError::InvalidApiKey`]
pub async fn authenticate(
    pool: &PgPool,
    jwt_secret: &str,
    headers: &HeaderMap,
) -> Result<AuthContext, AuthError> {
    let tenant_header = header_str(headers, TENANT_HEADER);

    if let Some(auth_header) = header_str(headers, header::AUTHORIZATION.as_str()) {
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

        let claims = validate_access_token(token.trim(), jwt_secret)?;
        if tenant_header.map_or(false, |t| t != claims.tenant_id) {
            return Err(AuthError::TenantMismatch);
        }
        return Ok(AuthContext::from_jwt(claims.sub, claims.tenant_id));
    }

    if let Some(key) = header_str(headers, API_KEY_HEADER) {
        let tenant_id = tenant_header.ok_or(AuthError::MissingTenant)?;

        if !validate_api_key_format(key) {
            return Err(AuthError::InvalidFormat("Invalid API key format".to_string()));
        }

        let db_err = |e: sqlx::Error| AuthError::DatabaseError(e.to_string());
        let mut tx = rls::begin(pool, tenant_id).await.map_err(db_err)?;
        let api_key = ApiKey::verify(&mut tx, key).await.map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        let api_key = api_key
            .ok_or_else(|| AuthError::InvalidApiKey("Invalid or revoked API key".to_string()))?;
        debug!(api_key_id = %api_key.id, tenant_id, "Authenticated with API key");
        return Ok(AuthContext::from_api_key(&api_key, tenant_id));
    }

    Err(AuthError::MissingCredentials)
}

/// Axum middleware wrapping [`authenticate`]
pub async fn auth_middleware(
    State(settings): State<AuthSettings>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let context = authenticate(&settings.pool, &settings.jwt_secret, req.headers()).await?;
    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::issue_token_pair;
    use axum::http::HeaderValue;
    use sqlx::postgres::PgPoolOptions;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap()
    }

    #[test]
    fn test_auth_context_from_jwt() {
        let context = AuthContext::from_jwt("u_0123456789", "t_0123456789");
        assert_eq!(context.user_id, "u_0123456789");
        assert_eq!(context.tenant_id, "t_0123456789");
        assert_eq!(context.method, AuthMethod::Jwt);
        assert!(context.api_key_id.is_none());
    }

    #[test]
    fn test_auth_error_status() {
        assert_eq!(AuthError::MissingCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::MissingTenant.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::TenantMismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::DatabaseError("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_authenticate_with_bearer_token() {
        let tokens = issue_token_pair("u_0123456789", "t_0123456789", SECRET).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", tokens.access_token)).unwrap(),
        );

        let context = authenticate(&lazy_pool(), SECRET, &headers).await.unwrap();
        assert_eq!(context.user_id, "u_0123456789");
        assert_eq!(context.tenant_id, "t_0123456789");
    }

    #[tokio::test]
    async fn test_authenticate_rejects_tenant_mismatch() {
        let tokens = issue_token_pair("u_0123456789", "t_0123456789", SECRET).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", tokens.access_token)).unwrap(),
        );
        headers.insert(TENANT_HEADER, HeaderValue::from_static("t_other00000"));

        let err = authenticate(&lazy_pool(), SECRET, &headers).await.unwrap_err();
        assert!(matches!(err, AuthError::TenantMismatch));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_refresh_token() {
        let tokens = issue_token_pair("u_0123456789", "t_0123456789", SECRET).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", tokens.refresh_token)).unwrap(),
        );

        let err = authenticate(&lazy_pool(), SECRET, &headers).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_authenticate_api_key_requires_tenant() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("sk_abc"));

        let err = authenticate(&lazy_pool(), SECRET, &headers).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingTenant));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_malformed_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("sk_abc"));
        headers.insert(TENANT_HEADER, HeaderValue::from_static("t_0123456789"));

        let err = authenticate(&lazy_pool(), SECRET, &headers).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_authenticate_without_credentials() {
        let err = authenticate(&lazy_pool(), SECRET, &HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
    }
}
