/// Password recovery and change
///
/// `request_reset` answers the same way whether or not the email exists, so
/// it cannot be used to discover accounts.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::auth::password::{hash_password, validate_password_strength, verify_password, PasswordError};
use crate::ids::generate_reset_token;
use crate::mail::Notifier;
use crate::models::password_reset::PasswordReset;
use crate::models::user::User;

/// Hours a reset link stays valid
pub const RESET_TTL_HOURS: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Invalid or expired reset token")]
    InvalidToken,

    #[error("Current password is incorrect")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    WeakPassword(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Mails a reset link when `email` belongs to an account.
pub async fn request_reset(
    pool: &PgPool,
    notifier: &Notifier,
    email: &str,
) -> Result<(), RecoveryError> {
    let Some(user) = User::find_by_email(pool, email).await? else {
        debug!("Password reset requested for unknown email");
        return Ok(());
    };

    let token = generate_reset_token();
    let expires_at = Utc::now() + Duration::hours(RESET_TTL_HOURS);
    PasswordReset::create(pool, &user.id, &token, expires_at).await?;

    if let Err(e) = notifier.password_reset(&user.email, &token).await {
        warn!(user_id = %user.id, error = %e, "Failed to send password reset");
    } else {
        info!(user_id = %user.id, "Password reset link sent");
    }

    Ok(())
}

/// Sets a new password with a reset token. The token is spent even if
/// nothing else changes.
pub async fn reset_password(
    pool: &PgPool,
    token: &str,
    new_password: &str,
) -> Result<(), RecoveryError> {
    validate_password_strength(new_password).map_err(RecoveryError::WeakPassword)?;
    let hash = hash_password(new_password)?;

    let mut tx = pool.begin().await?;

    let reset = PasswordReset::consume(&mut *tx, token)
        .await?
        .ok_or(RecoveryError::InvalidToken)?;

    User::set_password(&mut *tx, &reset.user_id, &hash, false).await?;

    tx.commit().await?;

    info!(user_id = %reset.user_id, "Password reset");
    Ok(())
}

/// Changes the password of a signed-in user after checking the current one.
pub async fn change_password(
    pool: &PgPool,
    user_id: &str,
    current_password: &str,
    new_password: &str,
) -> Result<(), RecoveryError> {
    let user = User::find_by_id(pool, user_id)
        .await?
        .ok_or(RecoveryError::UserNotFound)?;

    if !verify_password(current_password, &user.password)? {
        return Err(RecoveryError::InvalidCredentials);
    }

    validate_password_strength(new_password).map_err(RecoveryError::WeakPassword)?;
    User::set_password(pool, user_id, &hash_password(new_password)?, false).await?;

    info!(user_id, "Password changed");
    Ok(())
}
