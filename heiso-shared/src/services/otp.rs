/// Emailed one-time login codes
///
/// A code is 6 digits, valid for [`OTP_TTL_MINUTES`], stored only as a
/// SHA-256 hash and consumed on first successful verification. Codes are
/// per account, not per tenant; eligibility (membership, status, login
/// method) is checked against the tenant of the request.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration as StdDuration;
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::accounts::login_method_for;
use super::team::member_for_user;
use crate::auth::sha256_hex;
use crate::db::rls;
use crate::ids::generate_otp_code;
use crate::mail::{MailError, Notifier};
use crate::models::otp_code::OtpCode;
use crate::models::user::{Developer, LoginMethod, User};

/// Minutes a code stays valid
pub const OTP_TTL_MINUTES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("User not found")]
    UserNotFound,

    #[error("Account is not active")]
    NotActive,

    #[error("One-time codes are not enabled for this account")]
    LoginMethodNotAllowed,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Failed to send code: {0}")]
    Mail(#[from] MailError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpIssued {
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OtpStatus {
    pub has_valid_code: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Checks that `user` may sign in to `tenant_id` and returns the login
/// method that applies there.
async fn eligible(pool: &PgPool, tenant_id: &str, user: &User) -> Result<LoginMethod, OtpError> {
    if !user.active {
        return Err(OtpError::NotActive);
    }

    let mut tx = rls::begin(pool, tenant_id).await?;

    let developer = Developer::is_developer(&mut *tx, &user.id).await?;
    let member = member_for_user(&mut tx, user).await?;

    if !developer {
        match &member {
            None => return Err(OtpError::UserNotFound),
            Some(m) if !m.is_joined() => return Err(OtpError::NotActive),
            Some(_) => {}
        }
    }

    let method = login_method_for(&mut tx, user, developer, member.as_ref()).await?;
    tx.commit().await?;
    Ok(method)
}

/// Stores a fresh code for `user` and mails it.
pub(crate) async fn issue(
    pool: &PgPool,
    notifier: &Notifier,
    user: &User,
) -> Result<OtpIssued, OtpError> {
    let removed = OtpCode::delete_expired(pool, Some(&user.id)).await?;
    if removed > 0 {
        debug!(user_id = %user.id, removed, "Removed expired codes");
    }

    let code = generate_otp_code();
    let expires_at = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);
    OtpCode::create(pool, &user.id, &sha256_hex(&code), expires_at).await?;

    notifier
        .login_code(&user.email, &user.name, &code, OTP_TTL_MINUTES)
        .await?;

    info!(user_id = %user.id, %expires_at, "Login code issued");
    Ok(OtpIssued { expires_at })
}

/// Sends a login code to `email`.
///
/// # Errors
///
/// - [`OtpError::UserNotFound`]: no such account, or not a member of the tenant
/// - [`OtpError::NotActive`]: the account or membership is not active
/// - [`OtpError::LoginMethodNotAllowed`]: the account signs in with passwords only
pub async fn generate(
    pool: &PgPool,
    notifier: &Notifier,
    tenant_id: &str,
    email: &str,
) -> Result<OtpIssued, OtpError> {
    let user = User::find_by_email(pool, email)
        .await?
        .ok_or(OtpError::UserNotFound)?;

    if !eligible(pool, tenant_id, &user).await?.allows_otp() {
        return Err(OtpError::LoginMethodNotAllowed);
    }

    issue(pool, notifier, &user).await
}

/// Consumes `code` and records the sign-in.
///
/// Not restricted by login method: it also completes the second step of a
/// password login with two-factor enabled.
pub async fn verify(
    pool: &PgPool,
    tenant_id: &str,
    email: &str,
    code: &str,
) -> Result<User, OtpError> {
    let user = User::find_by_email(pool, email)
        .await?
        .ok_or(OtpError::InvalidCode)?;

    eligible(pool, tenant_id, &user).await?;

    OtpCode::consume(pool, &user.id, &sha256_hex(code.trim()))
        .await?
        .ok_or(OtpError::InvalidCode)?;

    User::touch_last_login(pool, &user.id).await?;

    info!(user_id = %user.id, tenant_id, "Login code verified");
    Ok(user)
}

pub async fn has_valid(pool: &PgPool, email: &str) -> Result<bool, OtpError> {
    Ok(status(pool, email).await?.has_valid_code)
}

/// Whether `email` has a usable code, and until when. Unknown emails report
/// no code.
pub async fn status(pool: &PgPool, email: &str) -> Result<OtpStatus, OtpError> {
    let Some(user) = User::find_by_email(pool, email).await? else {
        return Ok(OtpStatus::default());
    };

    let latest = OtpCode::latest_valid(pool, &user.id).await?;
    Ok(OtpStatus {
        has_valid_code: latest.is_some(),
        expires_at: latest.map(|c| c.expires_at),
    })
}

/// Deletes expired codes of one account, or of all with `None`.
pub async fn cleanup_expired(pool: &PgPool, user_id: Option<&str>) -> Result<u64, OtpError> {
    let removed = OtpCode::delete_expired(pool, user_id).await?;
    debug!(removed, "Expired login codes cleaned up");
    Ok(removed)
}

/// How often [`run_cleanup`] sweeps expired codes
pub const CLEANUP_INTERVAL: StdDuration = StdDuration::from_secs(60 * 60);

/// Deletes expired codes of every account each `every`, until the task is
/// aborted. Failures are logged and retried on the next tick.
pub async fn run_cleanup(pool: PgPool, every: StdDuration) {
    loop {
        match cleanup_expired(&pool, None).await {
            Ok(removed) if removed > 0 => info!(removed, "Expired login codes swept"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Failed to sweep expired login codes"),
        }
        sleep(every).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(OtpStatus::default()).unwrap();
        assert_eq!(json["has_valid_code"], false);
        assert!(json["expires_at"].is_null());
    }

    #[test]
    fn test_code_hash_is_stable() {
        let code = "042137";
        assert_eq!(sha256_hex(code), sha256_hex(code));
        assert_ne!(sha256_hex(code), code);
        assert_eq!(sha256_hex(code).len(), 64);
    }
}
