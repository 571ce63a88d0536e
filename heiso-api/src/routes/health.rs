/// Health check endpoints
///
/// - `GET /health`: liveness, always 200 while the process serves requests
/// - `GET /health/ready`: readiness, 503 when the database is unreachable or
///   migrations are pending

use crate::{app::AppState, error::{ApiError, ApiResult}};
use axum::{extract::State, Json};
use heiso_shared::db::migrations::{get_migration_status, MigrationStatus};
use heiso_shared::db::pool::{self, PoolStats};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub migrations: MigrationStatus,
    pub pool: PoolStats,
}

/// Reports `degraded` instead of failing when the database is down.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let database_status = match pool::health_check(&state.db).await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Ok(Json(HealthResponse {
        status: if database_status == "connected" {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database_status.to_string(),
    }))
}

pub async fn readiness(State(state): State<AppState>) -> ApiResult<Json<ReadinessResponse>> {
    pool::health_check(&state.db)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("Database unavailable: {}", e)))?;

    let status = get_migration_status(&state.db)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("Migration status unavailable: {}", e)))?;

    if !status.is_up_to_date {
        return Err(ApiError::ServiceUnavailable("Migrations pending".to_string()));
    }

    Ok(Json(ReadinessResponse {
        status: "ready".to_string(),
        migrations: status,
        pool: pool::pool_stats(&state.db),
    }))
}
