/// File records
///
/// The bytes live in object storage; these endpoints record and list what
/// was uploaded and keep per-type storage counters.
///
/// - `GET /v1/files?type=image` - Newest first, optionally by type
/// - `POST /v1/files` - Record an upload
/// - `DELETE /v1/files/:id`
/// - `GET /v1/files/categories` - Storage usage per type

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{authorize, Deleted},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use heiso_shared::{
    auth::middleware::AuthContext,
    models::file::{FileKind, FileRecord, NewFile, StorageCategory},
};
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_files).post(record_file))
        .route("/categories", get(list_categories))
        .route("/:id", delete(delete_file))
}

#[derive(Debug, Default, Deserialize)]
pub struct FileQuery {
    #[serde(rename = "type")]
    pub kind: Option<FileKind>,
}

fn checked(file: NewFile) -> ApiResult<NewFile> {
    if file.name.trim().is_empty() {
        return Err(ApiError::invalid_field("name", "Name is required"));
    }
    if file.size < 0 {
        return Err(ApiError::invalid_field("size", "Size cannot be negative"));
    }
    if file.mime_type.trim().is_empty() {
        return Err(ApiError::invalid_field("mime_type", "MIME type is required"));
    }
    Ok(file)
}

pub async fn list_files(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Json<Vec<FileRecord>>> {
    let mut tx = authorize(&state, &auth, "file", "read").await?;
    let files = FileRecord::list(&mut tx, query.kind.as_ref().map(FileKind::as_str)).await?;
    tx.commit().await?;
    Ok(Json(files))
}

pub async fn record_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(file): Json<NewFile>,
) -> ApiResult<(StatusCode, Json<FileRecord>)> {
    let file = checked(file)?;

    let mut tx = authorize(&state, &auth, "file", "create").await?;
    let record = FileRecord::record(&mut tx, &auth.user_id, file).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "file", "delete").await?;
    if !FileRecord::delete(&mut tx, &id).await? {
        return Err(ApiError::NotFound("File not found".to_string()));
    }
    tx.commit().await?;
    Ok(Json(Deleted { deleted: true }))
}

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<StorageCategory>>> {
    let mut tx = authorize(&state, &auth, "file", "read").await?;
    let categories = StorageCategory::list(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(categories))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, size: i64, mime: &str) -> NewFile {
        NewFile {
            name: name.to_string(),
            size,
            mime_type: mime.to_string(),
            url: None,
            path: None,
            metadata: None,
        }
    }

    #[test]
    fn test_checked_upload() {
        assert!(checked(upload("logo.png", 1024, "image/png")).is_ok());
        assert!(checked(upload("", 1024, "image/png")).is_err());
        assert!(checked(upload("logo.png", -1, "image/png")).is_err());
        assert!(checked(upload("logo.png", 1, " ")).is_err());
    }

    #[test]
    fn test_file_query_type() {
        let query: FileQuery = serde_json::from_str(r#"{"type":"video"}"#).unwrap();
        assert_eq!(query.kind, Some(FileKind::Video));
    }
}
