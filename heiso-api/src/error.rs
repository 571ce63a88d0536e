/// Error handling for the API server
///
/// Every handler returns [`ApiResult`]. Errors from the shared flows convert
/// into [`ApiError`] with `?`, and each variant maps to one HTTP status and
/// a JSON body:
///
/// ```json
/// { "error": "not_found", "message": "Member not found" }
/// ```
///
/// Validation failures add a `details` array of `{field, message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use heiso_shared::auth::authorization::AuthzError;
use heiso_shared::auth::jwt::JwtError;
use heiso_shared::auth::middleware::AuthError;
use heiso_shared::auth::password::PasswordError;
use heiso_shared::mail::MailError;
use heiso_shared::models::ReorderError;
use heiso_shared::services::accounts::AccountError;
use heiso_shared::services::invites::InviteError;
use heiso_shared::services::otp::OtpError;
use heiso_shared::services::provisioning::ProvisionError;
use heiso_shared::services::recovery::RecoveryError;
use heiso_shared::services::team::TeamError;
use heiso_shared::tree::TreeError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),

    /// 401
    Unauthorized(String),

    /// 403
    Forbidden(String),

    /// 404
    NotFound(String),

    /// 409
    Conflict(String),

    /// 422
    ValidationError(Vec<ValidationErrorDetail>),

    /// 500, details are logged and never returned
    InternalError(String),

    /// 503
    ServiceUnavailable(String),

    /// Any status with a specific machine-readable code
    Coded {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    pub fn coded(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Coded {
            status,
            code,
            message: message.into(),
        }
    }

    /// A single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Coded { status, .. } => *status,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::Coded { code, message, .. } => write!(f, "{}: {}", code, message),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::ValidationError(errors) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("internal_error", "An internal error occurred".to_string(), None)
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg, None),
            ApiError::Coded { code, message, .. } => (code, message, None),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return match db_err.constraint() {
                        Some(c) if c.contains("email") => {
                            ApiError::Conflict("Email already exists".to_string())
                        }
                        Some(c) if c.contains("slug") => {
                            ApiError::Conflict("Slug already exists".to_string())
                        }
                        _ => ApiError::Conflict("Resource already exists".to_string()),
                    };
                }
                if db_err.is_foreign_key_violation() {
                    return ApiError::BadRequest("Referenced resource does not exist".to_string());
                }
                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::DatabaseError(msg) => ApiError::InternalError(msg),
            other => ApiError::coded(other.status(), other.code(), other.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotMember => ApiError::Forbidden("Not a member of this tenant".to_string()),
            AuthzError::Forbidden { .. } | AuthzError::NotOwner => ApiError::Forbidden(err.to_string()),
            AuthzError::DatabaseError(e) => e.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            other => ApiError::Unauthorized(format!("Invalid token: {}", other)),
        }
    }
}

impl From<MailError> for ApiError {
    fn from(err: MailError) -> Self {
        tracing::warn!(error = %err, "Mail delivery failed");
        ApiError::coded(StatusCode::BAD_GATEWAY, "mail_failed", "Failed to send email")
    }
}

impl From<TreeError> for ApiError {
    fn from(err: TreeError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<ReorderError> for ApiError {
    fn from(err: ReorderError) -> Self {
        match err {
            ReorderError::Tree(e) => e.into(),
            ReorderError::Database(e) => e.into(),
        }
    }
}

impl From<OtpError> for ApiError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::UserNotFound => ApiError::NotFound(err.to_string()),
            OtpError::NotActive | OtpError::LoginMethodNotAllowed => ApiError::Forbidden(err.to_string()),
            OtpError::InvalidCode => {
                ApiError::coded(StatusCode::UNAUTHORIZED, "invalid_code", err.to_string())
            }
            OtpError::Mail(e) => e.into(),
            OtpError::Database(e) => e.into(),
        }
    }
}

impl From<RecoveryError> for ApiError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::InvalidToken => {
                ApiError::coded(StatusCode::BAD_REQUEST, "invalid_token", err.to_string())
            }
            RecoveryError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            RecoveryError::UserNotFound => ApiError::NotFound(err.to_string()),
            RecoveryError::WeakPassword(msg) => ApiError::invalid_field("password", msg),
            RecoveryError::Password(e) => e.into(),
            RecoveryError::Database(e) => e.into(),
        }
    }
}

impl From<TeamError> for ApiError {
    fn from(err: TeamError) -> Self {
        match err {
            TeamError::EmailRepeat => {
                ApiError::coded(StatusCode::CONFLICT, "email_repeat", err.to_string())
            }
            TeamError::MemberNotFound | TeamError::RoleNotFound => ApiError::NotFound(err.to_string()),
            TeamError::ActorMemberNotFound | TeamError::PermissionDenied => {
                ApiError::Forbidden(err.to_string())
            }
            TeamError::UserNotActivated => {
                ApiError::coded(StatusCode::CONFLICT, "user_not_activated", err.to_string())
            }
            TeamError::NotJoined => {
                ApiError::coded(StatusCode::CONFLICT, "not_joined", err.to_string())
            }
            TeamError::NoDefaultRole => {
                ApiError::coded(StatusCode::CONFLICT, "no_default_role", err.to_string())
            }
            TeamError::OwnerCannotLeave => {
                ApiError::coded(StatusCode::CONFLICT, "owner_cannot_leave", err.to_string())
            }
            TeamError::WeakPassword(msg) => ApiError::invalid_field("password", msg),
            TeamError::Password(e) => e.into(),
            TeamError::Database(e) => e.into(),
        }
    }
}

impl From<InviteError> for ApiError {
    fn from(err: InviteError) -> Self {
        match err {
            InviteError::InvalidToken => {
                ApiError::coded(StatusCode::NOT_FOUND, "invalid_token", err.to_string())
            }
            InviteError::Expired => ApiError::coded(StatusCode::GONE, "expired_token", err.to_string()),
            InviteError::Database(e) => e.into(),
        }
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::SlugTaken(_) => {
                ApiError::coded(StatusCode::CONFLICT, "slug_taken", err.to_string())
            }
            ProvisionError::Database(e) => e.into(),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidCredentials | AccountError::SessionEnded => {
                ApiError::Unauthorized(err.to_string())
            }
            AccountError::NotActive | AccountError::NotMember | AccountError::LoginMethodNotAllowed => {
                ApiError::Forbidden(err.to_string())
            }
            AccountError::EmailTaken => ApiError::Conflict(err.to_string()),
            AccountError::UserNotFound => ApiError::NotFound(err.to_string()),
            AccountError::WeakPassword(msg) => ApiError::invalid_field("password", msg),
            AccountError::Otp(e) => e.into(),
            AccountError::Team(e) => e.into(),
            AccountError::Provision(e) => e.into(),
            AccountError::Authz(e) => e.into(),
            AccountError::Password(e) => e.into(),
            AccountError::Jwt(e) => e.into(),
            AccountError::Database(e) => e.into(),
        }
    }
}
