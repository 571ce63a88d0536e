/// Site navigation endpoints
///
/// Navigations:
///
/// - `GET /v1/navigations`, `POST /v1/navigations`
/// - `GET|PUT|DELETE /v1/navigations/:id` - Delete also removes its items
///
/// Items of a navigation:
///
/// - `GET /v1/navigations/:id/items?view=flat|tree|grouped`
/// - `POST /v1/navigations/:id/items`
/// - `PUT|DELETE /v1/navigations/:id/items/:item_id` - Delete cascades to children
/// - `POST /v1/navigations/:id/items/reorder`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{authorize, Deleted, DeletedCount, Listing, ReorderRequest, ViewQuery},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use heiso_shared::{
    auth::middleware::AuthContext,
    db::rls::TenantTx,
    models::navigation::{Navigation, NavigationInput, NavigationMenu, NavigationMenuInput},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_navigations).post(create_navigation))
        .route(
            "/:id",
            get(get_navigation).put(update_navigation).delete(delete_navigation),
        )
        .route("/:id/items", get(list_items).post(create_item))
        .route("/:id/items/reorder", post(reorder_items))
        .route("/:id/items/:item_id", put(update_item).delete(delete_item))
}

fn checked_navigation(input: NavigationInput) -> ApiResult<NavigationInput> {
    if input.name.trim().is_empty() {
        return Err(ApiError::invalid_field("name", "Name is required"));
    }
    Ok(input)
}

fn checked_item(input: NavigationMenuInput) -> ApiResult<NavigationMenuInput> {
    if input.title.trim().is_empty() {
        return Err(ApiError::invalid_field("title", "Title is required"));
    }
    Ok(input)
}

async fn navigation_in(tx: &mut TenantTx, id: &str) -> ApiResult<Navigation> {
    Navigation::find_by_id(tx, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Navigation not found".to_string()))
}

/// Loads an item and checks it belongs to `navigation_id`.
async fn item_in(tx: &mut TenantTx, navigation_id: &str, item_id: &str) -> ApiResult<NavigationMenu> {
    NavigationMenu::find_by_id(tx, item_id)
        .await?
        .filter(|item| item.navigation_id == navigation_id)
        .ok_or_else(|| ApiError::NotFound("Navigation item not found".to_string()))
}

pub async fn list_navigations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Navigation>>> {
    let mut tx = authorize(&state, &auth, "navigation", "read").await?;
    let navigations = Navigation::list(&mut tx).await?;
    tx.commit().await?;
    Ok(Json(navigations))
}

pub async fn get_navigation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Navigation>> {
    let mut tx = authorize(&state, &auth, "navigation", "read").await?;
    let navigation = navigation_in(&mut tx, &id).await?;
    tx.commit().await?;
    Ok(Json(navigation))
}

/// The slug defaults to the slugified name.
pub async fn create_navigation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<NavigationInput>,
) -> ApiResult<(StatusCode, Json<Navigation>)> {
    let input = checked_navigation(input)?;

    let mut tx = authorize(&state, &auth, "navigation", "create").await?;
    let navigation = Navigation::create(&mut tx, &auth.user_id, input).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(navigation)))
}

pub async fn update_navigation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<NavigationInput>,
) -> ApiResult<Json<Navigation>> {
    let input = checked_navigation(input)?;

    let mut tx = authorize(&state, &auth, "navigation", "update").await?;
    let navigation = Navigation::update(&mut tx, &id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Navigation not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(navigation))
}

pub async fn delete_navigation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "navigation", "delete").await?;
    if !Navigation::delete(&mut tx, &id).await? {
        return Err(ApiError::NotFound("Navigation not found".to_string()));
    }
    tx.commit().await?;
    Ok(Json(Deleted { deleted: true }))
}

pub async fn list_items(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(query): Query<ViewQuery>,
) -> ApiResult<Json<Listing<NavigationMenu>>> {
    let mut tx = authorize(&state, &auth, "navigation", "read").await?;
    navigation_in(&mut tx, &id).await?;
    let items = NavigationMenu::list(&mut tx, &id).await?;
    tx.commit().await?;
    Ok(Json(Listing::new(items, query.view)))
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<NavigationMenuInput>,
) -> ApiResult<(StatusCode, Json<NavigationMenu>)> {
    let input = checked_item(input)?;

    let mut tx = authorize(&state, &auth, "navigation", "create").await?;
    navigation_in(&mut tx, &id).await?;
    if let Some(parent_id) = input.parent_id.as_deref() {
        item_in(&mut tx, &id, parent_id).await?;
    }
    let item = NavigationMenu::create(&mut tx, &id, input).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, item_id)): Path<(String, String)>,
    Json(input): Json<NavigationMenuInput>,
) -> ApiResult<Json<NavigationMenu>> {
    let input = checked_item(input)?;

    let mut tx = authorize(&state, &auth, "navigation", "update").await?;
    item_in(&mut tx, &id, &item_id).await?;
    let item = NavigationMenu::update(&mut tx, &item_id, input)
        .await?
        .ok_or_else(|| ApiError::NotFound("Navigation item not found".to_string()))?;
    tx.commit().await?;
    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult<Json<DeletedCount>> {
    let mut tx = authorize(&state, &auth, "navigation", "delete").await?;
    item_in(&mut tx, &id, &item_id).await?;
    let deleted = NavigationMenu::delete_with_descendants(&mut tx, &item_id).await?;
    tx.commit().await?;
    Ok(Json(DeletedCount { deleted }))
}

pub async fn reorder_items(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<StatusCode> {
    let mut tx = authorize(&state, &auth, "navigation", "update").await?;
    navigation_in(&mut tx, &id).await?;
    NavigationMenu::reorder(&mut tx, &id, &req.items).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
