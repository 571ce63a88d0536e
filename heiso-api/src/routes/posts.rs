/// Page (post) and category endpoints
///
/// Pages:
///
/// - `GET /v1/posts?category_id=&start=&limit=` - Newest first with total
/// - `POST /v1/posts` - Create a draft, or publish with `"publish": true`
/// - `GET /v1/posts/:id` - Post with its categories
/// - `PUT /v1/posts/:id` - Save; a published post becomes `editing`
/// - `DELETE /v1/posts/:id`
///
/// Categories:
///
/// - `GET /v1/categories`, `POST /v1/categories`, `DELETE /v1/categories/:id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{authorize, Deleted, Page, PageQuery},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Extension, Json, Router,
};
use heiso_shared::{
    auth::middleware::AuthContext,
    models::post::{Category, CategoryInput, Post, PostDetail, PostSummary, SavePost},
};
use serde::Deserialize;
use tracing::info;

/// Page size of post listings when none is given
pub const DEFAULT_PAGE_SIZE: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post))
        .route("/:id", get(get_post).put(update_post).delete(delete_post))
}

pub fn category_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", delete(delete_category))
}

#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    pub category_id: Option<String>,
    pub start: Option<i64>,
    pub limit: Option<i64>,
}

impl PostQuery {
    fn page(&self) -> PageQuery {
        PageQuery {
            start: self.start,
            limit: self.limit,
        }
    }
}

pub async fn list_posts(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PostQuery>,
) -> ApiResult<Json<Page<PostSummary>>> {
    let category_id = query.category_id.as_deref().filter(|c| !c.is_empty());
    let page = query.page();

    let mut tx = authorize(&state, &auth, "post", "read").await?;
    let (items, total) = Post::list(
        &mut tx,
        category_id,
        page.start(),
        page.limit(DEFAULT_PAGE_SIZE),
    )
    .await?;
    tx.commit().await?;

    Ok(Json(Page { items, total }))
}

pub async fn get_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<PostDetail>> {
    let mut tx = authorize(&state, &auth, "post", "read").await?;
    let post = Post::get(&mut tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(post))
}

/// Create a post
///
/// ```text
/// POST /v1/posts
///
/// { "title": "About us", "content": {...}, "category_ids": ["ca_..."], "publish": false }
/// ```
///
/// The slug defaults to the slugified title.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<SavePost>,
) -> ApiResult<(StatusCode, Json<PostDetail>)> {
    let mut tx = authorize(&state, &auth, "post", "create").await?;
    let post = Post::save(&mut tx, &auth.user_id, None, req)
        .await?
        .ok_or_else(|| ApiError::InternalError("Post was not saved".to_string()))?;
    let detail = Post::get(&mut tx, &post.id)
        .await?
        .ok_or_else(|| ApiError::InternalError("Post was not saved".to_string()))?;
    tx.commit().await?;

    info!(tenant_id = %auth.tenant_id, post_id = %post.id, status = ?post.status, "Post created");
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Save a post
///
/// Saving without `publish` moves a published post to `editing`. Publishing
/// stamps `published_at` and relinks navigation items that point at the page.
pub async fn update_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<SavePost>,
) -> ApiResult<Json<PostDetail>> {
    let mut tx = authorize(&state, &auth, "post", "update").await?;
    Post::save(&mut tx, &auth.user_id, Some(&id), req)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    let detail = Post::get(&mut tx, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(detail))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "post", "delete").await?;
    if !Post::delete(&mut tx, &id).await? {
        return Err(ApiError::NotFound("Post not found".to_string()));
    }
    tx.commit().await?;
    Ok(Json(Deleted { deleted: true }))
}

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Category>>> {
    let mut tx = authorize(&state, &auth, "post", "read").await?;
    let categories = Category::list(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CategoryInput>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    if input.name.trim().is_empty() {
        return Err(ApiError::invalid_field("name", "Name is required"));
    }

    let mut tx = authorize(&state, &auth, "post", "create").await?;
    let category = Category::create(&mut tx, input).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "post", "delete").await?;
    if !Category::delete(&mut tx, &id).await? {
        return Err(ApiError::NotFound("Category not found".to_string()));
    }
    tx.commit().await?;
    Ok(Json(Deleted { deleted: true }))
}
