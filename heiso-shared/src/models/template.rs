/// Saved page templates
///
/// Templates are private to the user who saved them; every lookup is keyed
/// by `(id, user_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgConnection;

use crate::ids::generate_id;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PageTemplate {
    pub id: String,
    pub user_id: String,
    pub page_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub html_content: JsonValue,
    pub mobile_content: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInput {
    pub page_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub html_content: JsonValue,
    pub mobile_content: Option<JsonValue>,
}

const COLUMNS: &str = "id, user_id, page_id, name, description, thumbnail, html_content, \
                       mobile_content, created_at, updated_at";

impl PageTemplate {
    pub async fn save(
        conn: &mut PgConnection,
        user_id: &str,
        data: TemplateInput,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PageTemplate>(&format!(
            r#"
            INSERT INTO page_templates (id, user_id, page_id, name, description, thumbnail,
                html_content, mobile_content)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(user_id)
        .bind(data.page_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.thumbnail)
        .bind(data.html_content)
        .bind(data.mobile_content)
        .fetch_one(conn)
        .await
    }

    pub async fn get(
        conn: &mut PgConnection,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PageTemplate>(&format!(
            r#"
            SELECT {COLUMNS} FROM page_templates
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(conn)
        .await
    }

    pub async fn list(conn: &mut PgConnection, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PageTemplate>(&format!(
            r#"
            SELECT {COLUMNS} FROM page_templates
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY updated_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(conn)
        .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: &str,
        user_id: &str,
        data: TemplateInput,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, PageTemplate>(&format!(
            r#"
            UPDATE page_templates
            SET page_id = $3, name = $4, description = $5, thumbnail = $6,
                html_content = $7, mobile_content = $8, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(data.page_id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.thumbnail)
        .bind(data.html_content)
        .bind(data.mobile_content)
        .fetch_optional(conn)
        .await
    }

    pub async fn delete(conn: &mut PgConnection, id: &str, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE page_templates SET deleted_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
