/// One-time login codes
///
/// Codes are stored as SHA-256 hashes. A code is consumed by flipping `used`
/// in the same statement that finds it, so two concurrent verifications of
/// the same code cannot both succeed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgExecutor;

use crate::ids::generate_id;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OtpCode {
    pub id: String,
    pub user_id: String,

    #[serde(skip_serializing)]
    pub code_hash: String,

    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, user_id, code_hash, used, expires_at, created_at";

impl OtpCode {
    pub async fn create<'e, E>(
        executor: E,
        user_id: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OtpCode>(&format!(
            r#"
            INSERT INTO user_2fa_codes (id, user_id, code_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(user_id)
        .bind(code_hash)
        .bind(expires_at)
        .fetch_one(executor)
        .await
    }

    /// Marks the newest unused, unexpired code matching `code_hash` as used.
    pub async fn consume<'e, E>(
        executor: E,
        user_id: &str,
        code_hash: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OtpCode>(&format!(
            r#"
            UPDATE user_2fa_codes
            SET used = TRUE
            WHERE id = (
                SELECT id FROM user_2fa_codes
                WHERE user_id = $1 AND code_hash = $2 AND NOT used AND expires_at > NOW()
                ORDER BY created_at DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(code_hash)
        .fetch_optional(executor)
        .await
    }

    /// Newest code that can still be used
    pub async fn latest_valid<'e, E>(executor: E, user_id: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, OtpCode>(&format!(
            r#"
            SELECT {COLUMNS} FROM user_2fa_codes
            WHERE user_id = $1 AND NOT used AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Deletes expired codes of one user, or of everyone with `None`.
    pub async fn delete_expired<'e, E>(executor: E, user_id: Option<&str>) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            DELETE FROM user_2fa_codes
            WHERE expires_at <= NOW() AND ($1::TEXT IS NULL OR user_id = $1)
            "#,
        )
        .bind(user_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }
}
