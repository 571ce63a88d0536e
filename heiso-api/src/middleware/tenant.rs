/// Tenant of an unauthenticated request
///
/// Public routes (login, signup, OTP, invitations) name their tenant with the
/// `X-Tenant-Id` header. Authenticated routes take the tenant from the
/// [`AuthContext`](heiso_shared::auth::middleware::AuthContext) instead.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use heiso_shared::auth::middleware::{AuthError, TENANT_HEADER};

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for TenantId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| TenantId(v.to_string()))
            .ok_or_else(|| AuthError::MissingTenant.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(request: Request<()>) -> Result<TenantId, ApiError> {
        let (mut parts, _) = request.into_parts();
        TenantId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_reads_header() {
        let request = Request::builder()
            .header("X-Tenant-Id", " t_8Hq2LxP0aZ ")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().as_str(), "t_8Hq2LxP0aZ");
    }

    #[tokio::test]
    async fn test_missing_header_is_bad_request() {
        let err = extract(Request::builder().body(()).unwrap()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
