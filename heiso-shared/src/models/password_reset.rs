/// Password reset tokens
///
/// Tokens are random 32-character strings, valid for one hour and usable
/// once.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::ids::generate_id;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PasswordReset {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, user_id, token, used, expires_at, created_at";

impl PasswordReset {
    pub async fn create<'e, E>(
        executor: E,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PasswordReset>(&format!(
            r#"
            INSERT INTO user_password_resets (id, user_id, token, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .fetch_one(executor)
        .await
    }

    /// Marks the token used if it is still valid and returns it.
    pub async fn consume<'e, E>(executor: E, token: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, PasswordReset>(&format!(
            r#"
            UPDATE user_password_resets
            SET used = TRUE
            WHERE token = $1 AND NOT used AND expires_at > NOW()
            RETURNING {COLUMNS}
            "#
        ))
        .bind(token)
        .fetch_optional(executor)
        .await
    }
}
