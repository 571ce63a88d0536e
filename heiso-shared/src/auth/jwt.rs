/// JSON Web Tokens for dashboard sessions
///
/// Tokens are HS256-signed and bind a user to the tenant they signed in to.
/// Access tokens live 24 hours and refresh tokens 30 days.
///
/// # Example
///
/// ```
/// use heiso_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
///
/// let claims = Claims::new("u_4kT9bQ2mLx", "t_Zp81nRc0Qe", TokenType::Access);
/// let token = create_token(&claims, "a-secret-that-is-at-least-32-bytes!").unwrap();
///
/// let decoded = validate_access_token(&token, "a-secret-that-is-at-least-32-bytes!").unwrap();
/// assert_eq!(decoded.sub, "u_4kT9bQ2mLx");
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Value of the `iss` claim
pub const ISSUER: &str = "heiso";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid issuer")]
    InvalidIssuer,

    #[error("Expected {expected} token")]
    WrongTokenType { expected: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Token payload
///
/// `sub` is the user id and `tenant_id` the tenant the session belongs to.
/// Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub tenant_id: String,
    pub token_type: TokenType,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, tenant_id: impl Into<String>, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, tenant_id, token_type, token_type.default_expiration())
    }

    pub fn with_expiration(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        token_type: TokenType,
        lifetime: Duration,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id.into(),
            iss: ISSUER.to_string(),
            iat: now,
            exp: now + lifetime.num_seconds(),
            nbf: now,
            tenant_id: tenant_id.into(),
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Access and refresh token issued together at sign-in
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::CreateError(e.to_string()))
}

/// Issues an access/refresh pair for `user_id` in `tenant_id`.
pub fn issue_token_pair(user_id: &str, tenant_id: &str, secret: &str) -> Result<TokenPair, JwtError> {
    let access = Claims::new(user_id, tenant_id, TokenType::Access);
    let refresh = Claims::new(user_id, tenant_id, TokenType::Refresh);

    Ok(TokenPair {
        access_token: create_token(&access, secret)?,
        refresh_token: create_token(&refresh, secret)?,
        expires_in: TokenType::Access.default_expiration().num_seconds(),
    })
}

/// Verifies signature, issuer, `exp` and `nbf`.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            _ => JwtError::ValidationError(e.to_string()),
        })
}

pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;
    if claims.token_type != TokenType::Access {
        return Err(JwtError::WrongTokenType { expected: "access" });
    }
    Ok(claims)
}

pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;
    if claims.token_type != TokenType::Refresh {
        return Err(JwtError::WrongTokenType { expected: "refresh" });
    }
    Ok(claims)
}

/// Exchanges a refresh token for a new access token for the same user and tenant.
pub fn refresh_access_token(refresh_token: &str, secret: &str) -> Result<String, JwtError> {
    let refresh = validate_refresh_token(refresh_token, secret)?;
    let access = Claims::new(refresh.sub, refresh.tenant_id, TokenType::Access);
    create_token(&access, secret)
}
