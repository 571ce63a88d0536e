/// Saved page templates
///
/// Templates are private to the user who saved them.
///
/// - `GET /v1/templates`, `POST /v1/templates`
/// - `GET|PUT|DELETE /v1/templates/:id`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{authorize, Deleted},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use heiso_shared::{
    auth::middleware::AuthContext,
    models::template::{PageTemplate, TemplateInput},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_templates).post(save_template))
        .route(
            "/:id",
            get(get_template).put(update_template).delete(delete_template),
        )
}

fn checked(input: TemplateInput) -> ApiResult<TemplateInput> {
    if input.name.trim().is_empty() {
        return Err(ApiError::invalid_field("name", "Name is required"));
    }
    Ok(input)
}

fn not_found() -> ApiError {
    ApiError::NotFound("Template not found".to_string())
}

pub async fn list_templates(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<PageTemplate>>> {
    let mut tx = authorize(&state, &auth, "template", "read").await?;
    let templates = PageTemplate::list(&mut tx, &auth.user_id).await?;
    tx.commit().await?;
    Ok(Json(templates))
}

pub async fn save_template(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<TemplateInput>,
) -> ApiResult<(StatusCode, Json<PageTemplate>)> {
    let input = checked(input)?;

    let mut tx = authorize(&state, &auth, "template", "create").await?;
    let template = PageTemplate::save(&mut tx, &auth.user_id, input).await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<PageTemplate>> {
    let mut tx = authorize(&state, &auth, "template", "read").await?;
    let template = PageTemplate::get(&mut tx, &id, &auth.user_id)
        .await?
        .ok_or_else(not_found)?;
    tx.commit().await?;
    Ok(Json(template))
}

pub async fn update_template(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<TemplateInput>,
) -> ApiResult<Json<PageTemplate>> {
    let input = checked(input)?;

    let mut tx = authorize(&state, &auth, "template", "update").await?;
    let template = PageTemplate::update(&mut tx, &id, &auth.user_id, input)
        .await?
        .ok_or_else(not_found)?;
    tx.commit().await?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Deleted>> {
    let mut tx = authorize(&state, &auth, "template", "delete").await?;
    if !PageTemplate::delete(&mut tx, &id, &auth.user_id).await? {
        return Err(not_found());
    }
    tx.commit().await?;
    Ok(Json(Deleted { deleted: true }))
}
