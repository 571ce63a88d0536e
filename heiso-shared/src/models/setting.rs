/// Tenant settings and public site settings
///
/// Both tables are name -> JSON value maps. `settings` rows flagged `is_key`
/// hold secrets (third-party keys) and are left out of listings unless the
/// caller asks for them.

use serde_json::{Map, Value as JsonValue};
use sqlx::PgConnection;

pub struct Setting;

pub struct SiteSetting;

impl Setting {
    /// All settings as a map; secret rows only when `include_keys`.
    pub async fn all(
        conn: &mut PgConnection,
        include_keys: bool,
    ) -> Result<Map<String, JsonValue>, sqlx::Error> {
        let rows: Vec<(String, JsonValue)> = sqlx::query_as(
            r#"
            SELECT name, value FROM settings
            WHERE deleted_at IS NULL AND ($1 OR NOT is_key)
            ORDER BY name
            "#,
        )
        .bind(include_keys)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().collect())
    }

    pub async fn get(conn: &mut PgConnection, name: &str) -> Result<Option<JsonValue>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM settings WHERE name = $1 AND deleted_at IS NULL")
            .bind(name)
            .fetch_optional(conn)
            .await
    }

    /// Inserts or replaces a setting, reviving a soft-deleted one.
    pub async fn put(
        conn: &mut PgConnection,
        name: &str,
        value: &JsonValue,
        is_key: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (name, value, is_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (tenant_id, name) DO UPDATE
            SET value = EXCLUDED.value, is_key = EXCLUDED.is_key,
                deleted_at = NULL, updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(value)
        .bind(is_key)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn delete(conn: &mut PgConnection, name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE settings SET deleted_at = NOW() WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl SiteSetting {
    pub async fn all(conn: &mut PgConnection) -> Result<Map<String, JsonValue>, sqlx::Error> {
        let rows: Vec<(String, JsonValue)> = sqlx::query_as(
            "SELECT name, value FROM site_settings WHERE deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().collect())
    }

    pub async fn put(conn: &mut PgConnection, name: &str, value: &JsonValue) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO site_settings (name, value)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id, name) DO UPDATE
            SET value = EXCLUDED.value, deleted_at = NULL, updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(conn)
        .await?;

        Ok(())
    }
}
