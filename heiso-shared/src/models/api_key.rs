/// API key model and database operations
///
/// Keys belong to a user within a tenant and act on that user's behalf.
///
/// # Security
///
/// - Keys are stored as SHA-256 hashes (never plaintext)
/// - Keys are prefixed with `sk_`
/// - The full key is only returned on creation
/// - Listings show a truncated form such as `sk_9f2a...c41e`
/// - Keys can be soft-deleted or set to expire
///
/// # Schema
///
/// ```sql
/// CREATE TABLE api_keys (
///     id VARCHAR(20) PRIMARY KEY,
///     tenant_id VARCHAR(20) NOT NULL DEFAULT current_setting('app.current_tenant_id', true),
///     user_id VARCHAR(20) NOT NULL REFERENCES users(id),
///     name VARCHAR(100) NOT NULL,
///     key VARCHAR(64) NOT NULL UNIQUE,        -- SHA-256 hex
///     truncated_key VARCHAR(20) NOT NULL,
///     rate_limit JSONB,
///     last_used_at TIMESTAMPTZ,
///     expires_at TIMESTAMPTZ,
///     created_at, updated_at, deleted_at
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use heiso_shared::db::rls;
/// use heiso_shared::models::api_key::{ApiKey, CreateApiKey};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let mut tx = rls::begin(&pool, "t_8Hq2LxP0aZ").await?;
/// let (key, plaintext) = ApiKey::create(&mut tx, "u_Zk3Lm9Qa1B", CreateApiKey {
///     name: "CI".to_string(),
///     expires_at: None,
///     rate_limit: None,
/// }).await?;
/// tx.commit().await?;
///
/// // Shown once
/// println!("{} -> {}", key.truncated_key, plaintext);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgConnection;

use crate::auth::api_key::{generate_api_key, hash_api_key, truncate_api_key};
use crate::ids::generate_id;

/// Name of the key issued automatically to tenant owners
pub const DEFAULT_KEY_NAME: &str = "Default API Key";

/// Page size of key listings when none is given
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Requests allowed per window, stored with the key for the gateway in front
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u32,
    pub window_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: String,
    pub user_id: String,
    pub name: String,

    /// SHA-256 hex of the key. Never serialized.
    #[serde(skip_serializing, default)]
    pub key: String,

    pub truncated_key: String,
    pub rate_limit: Option<Json<RateLimit>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiKey {
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub rate_limit: Option<RateLimit>,
}

/// `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateApiKey {
    pub name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rate_limit: Option<RateLimit>,
}

const COLUMNS: &str = "id, user_id, name, key, truncated_key, rate_limit, last_used_at, \
                       expires_at, created_at, updated_at";

impl ApiKey {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| exp <= Utc::now())
    }

    /// Creates a key for `user_id` and returns it with the plaintext.
    pub async fn create(
        conn: &mut PgConnection,
        user_id: &str,
        data: CreateApiKey,
    ) -> Result<(Self, String), sqlx::Error> {
        let (plaintext, hash) = generate_api_key();

        let api_key = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            INSERT INTO api_keys (id, user_id, name, key, truncated_key, rate_limit, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(user_id)
        .bind(data.name)
        .bind(hash)
        .bind(truncate_api_key(&plaintext))
        .bind(data.rate_limit.map(Json))
        .bind(data.expires_at)
        .fetch_one(conn)
        .await?;

        Ok((api_key, plaintext))
    }

    /// One page of the user's keys, newest first, with the total count.
    pub async fn list(
        conn: &mut PgConnection,
        user_id: &str,
        start: i64,
        limit: i64,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM api_keys WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        let keys = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            SELECT {COLUMNS} FROM api_keys
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            OFFSET $2 LIMIT $3
            "#
        ))
        .bind(user_id)
        .bind(start)
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok((keys, total))
    }

    pub async fn find(
        conn: &mut PgConnection,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {COLUMNS} FROM api_keys WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn exists_for_user(conn: &mut PgConnection, user_id: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM api_keys WHERE user_id = $1 AND deleted_at IS NULL)",
        )
        .bind(user_id)
        .fetch_one(conn)
        .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: &str,
        user_id: &str,
        data: UpdateApiKey,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            UPDATE api_keys
            SET name = COALESCE($3, name),
                expires_at = COALESCE($4, expires_at),
                rate_limit = COALESCE($5, rate_limit),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(data.name)
        .bind(data.expires_at)
        .bind(data.rate_limit.map(Json))
        .fetch_optional(conn)
        .await
    }

    pub async fn delete(conn: &mut PgConnection, id: &str, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys SET deleted_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Looks up a live, unexpired key by plaintext and touches `last_used_at`.
    pub async fn verify(conn: &mut PgConnection, plaintext: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            UPDATE api_keys
            SET last_used_at = NOW()
            WHERE key = $1
              AND deleted_at IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            RETURNING {COLUMNS}
            "#
        ))
        .bind(hash_api_key(plaintext))
        .fetch_optional(conn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(expires_at: Option<DateTime<Utc>>) -> ApiKey {
        ApiKey {
            id: "0123456789".to_string(),
            user_id: "u_0123456789".to_string(),
            name: "CI".to_string(),
            key: "f".repeat(64),
            truncated_key: "sk_abcd...wxyz".to_string(),
            rate_limit: Some(Json(RateLimit {
                requests: 100,
                window_seconds: 60,
            })),
            last_used_at: None,
            expires_at,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_expired() {
        assert!(!key(None).is_expired());
        assert!(!key(Some(Utc::now() + Duration::hours(1))).is_expired());
        assert!(key(Some(Utc::now() - Duration::seconds(1))).is_expired());
    }

    #[test]
    fn test_hash_never_serialized() {
        let json = serde_json::to_value(key(None)).unwrap();
        assert!(json.get("key").is_none());
        assert_eq!(json["truncated_key"], "sk_abcd...wxyz");
        assert_eq!(json["rate_limit"]["requests"], 100);
    }
}
