/// Uploaded file records and per-type storage counters
///
/// Uploads themselves happen elsewhere (object storage); this module records
/// the result. Each file is filed under a storage category derived from its
/// MIME type, and the category keeps a running count and byte total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgConnection;

use crate::ids::generate_id;

/// Coarse file type, derived from the MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Other,
}

impl FileKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            FileKind::Image
        } else if mime.starts_with("video/") {
            FileKind::Video
        } else if mime.starts_with("audio/") {
            FileKind::Audio
        } else if mime == "application/pdf" {
            FileKind::Document
        } else if ["zip", "rar", "7z"].iter().any(|a| mime.contains(a)) {
            FileKind::Archive
        } else {
            FileKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Document => "document",
            FileKind::Archive => "archive",
            FileKind::Other => "other",
        }
    }

    /// `(name, icon, color)` of the storage category created on first use
    pub fn category_defaults(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            FileKind::Image => ("Images", "image", "blue"),
            FileKind::Video => ("Videos", "video", "purple"),
            FileKind::Audio => ("Audio", "music", "yellow"),
            FileKind::Document => ("Documents", "file-text", "green"),
            FileKind::Archive => ("Archives", "archive", "orange"),
            FileKind::Other => ("Others", "file", "gray"),
        }
    }
}

/// Lowercase extension of `name` without the dot, or `""`
pub fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub size: i64,

    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,

    pub extension: String,
    pub url: Option<String>,
    pub path: String,
    pub mime_type: String,
    pub metadata: JsonValue,
    pub storage_category_id: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFile {
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub url: Option<String>,
    pub path: Option<String>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StorageCategory {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub file_count: i32,
    pub size: i64,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, name, size, type, extension, url, path, mime_type, metadata, \
                       storage_category_id, owner_id, created_at, updated_at";

impl FileRecord {
    /// Records an uploaded file and bumps its category counters.
    /// Call inside a transaction so both writes land together.
    pub async fn record(
        conn: &mut PgConnection,
        owner_id: &str,
        data: NewFile,
    ) -> Result<Self, sqlx::Error> {
        let kind = FileKind::from_mime(&data.mime_type);
        let (name, icon, color) = kind.category_defaults();

        sqlx::query(
            r#"
            INSERT INTO file_storage_categories AS c (id, name, icon, color, file_count, size)
            VALUES ($1, $2, $3, $4, 1, $5)
            ON CONFLICT (tenant_id, id) DO UPDATE
            SET file_count = c.file_count + 1,
                size = c.size + EXCLUDED.size,
                updated_at = NOW()
            "#,
        )
        .bind(kind.as_str())
        .bind(name)
        .bind(icon)
        .bind(color)
        .bind(data.size)
        .execute(&mut *conn)
        .await?;

        let extension = extension_of(&data.name);
        sqlx::query_as::<_, FileRecord>(&format!(
            r#"
            INSERT INTO files (id, name, size, type, extension, url, path, mime_type, metadata,
                storage_category_id, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, ''), $8, COALESCE($9, '{{}}'::JSONB), $4, $10)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(generate_id(None))
        .bind(data.name)
        .bind(data.size)
        .bind(kind.as_str())
        .bind(extension)
        .bind(data.url)
        .bind(data.path)
        .bind(data.mime_type)
        .bind(data.metadata)
        .bind(owner_id)
        .fetch_one(conn)
        .await
    }

    /// Newest first, optionally filtered by type
    pub async fn list(conn: &mut PgConnection, kind: Option<&str>) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FileRecord>(&format!(
            r#"
            SELECT {COLUMNS} FROM files
            WHERE deleted_at IS NULL AND ($1::TEXT IS NULL OR type = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(kind)
        .fetch_all(conn)
        .await
    }

    /// Soft-deletes the file and takes it off its category's counters.
    pub async fn delete(conn: &mut PgConnection, id: &str) -> Result<bool, sqlx::Error> {
        let removed: Option<(Option<String>, i64)> = sqlx::query_as(
            r#"
            UPDATE files SET deleted_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING storage_category_id, size
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some((category, size)) = removed else {
            return Ok(false);
        };

        if let Some(category) = category {
            sqlx::query(
                r#"
                UPDATE file_storage_categories
                SET file_count = GREATEST(file_count - 1, 0),
                    size = GREATEST(size - $2, 0),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(category)
            .bind(size)
            .execute(conn)
            .await?;
        }

        Ok(true)
    }
}

impl StorageCategory {
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, StorageCategory>(
            r#"
            SELECT id, name, icon, color, file_count, size, updated_at
            FROM file_storage_categories
            ORDER BY name
            "#,
        )
        .fetch_all(conn)
        .await
    }
}
