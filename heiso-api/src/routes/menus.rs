/// Dashboard menu endpoints
///
/// - `GET /v1/menus?view=flat|tree|grouped`
/// - `POST /v1/menus`, `PUT /v1/menus/:id`
/// - `DELETE /v1/menus/:id` - Also removes every menu below it
/// - `POST /v1/menus/reorder` - Batch parent/order update

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{authorize, DeletedCount, Listing, ReorderRequest, ViewQuery},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use heiso_shared::{
    auth::middleware::AuthContext,
    models::menu::{Menu, MenuInput},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_menus).post(create_menu))
        .route("/reorder", post(reorder_menus))
        .route("/:id", put(update_menu).delete(delete_menu))
}

fn checked(input: MenuInput) -> ApiResult<MenuInput> {
    if input.title.trim().is_empty() {
        return Err(ApiError::invalid_field("title", "Title is required"));
    }
    Ok(input)
}

pub async fn list_menus(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<Json<Listing<Menu>>> {
    let mut tx = authorize(&state, &auth, "menu", "read").await?;
    let menus = Menu::list(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(Listing::new(menus, query.view)))
}

pub async fn create_menu(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<MenuInput>,
) -> ApiResult<(StatusCode, Json<Menu>)> {
    let input = checked(input)?;

    let mut tx = authorize(&state, &auth, "menu", "create").await?;
    let menu = Menu::create(&mut tx, input).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

pub async fn update_menu(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<MenuInput>,
) -> ApiResult<Json<Menu>> {
    let input = checked(input)?;

    let mut tx = authorize(&state, &auth, "menu", "update").await?;
    let menu = Menu::update(&mut tx, &id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Menu not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(menu))
}

pub async fn delete_menu(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletedCount>> {
    let mut tx = authorize(&state, &auth, "menu", "delete").await?;
    let deleted = Menu::delete_with_descendants(&mut tx, &id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Menu not found".to_string()));
    }
    tx.commit().await?;
    Ok(Json(DeletedCount { deleted }))
}

/// Rejected as a whole when an item or parent is unknown or the result has a cycle.
pub async fn reorder_menus(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<StatusCode> {
    let mut tx = authorize(&state, &auth, "menu", "update").await?;
    Menu::reorder(&mut tx, &req.items).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
