//! GET /api/v1/health - Liveness plus database and schema state

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::api::middleware::AppState;
use crate::db::migrations;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_migrations: Option<usize>,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.pool.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Database ping failed: {:#}", e);
            false
        }
    };
    let pending_migrations = if database {
        migrations::pending_count(&state.pool).await.ok()
    } else {
        None
    };

    let healthy = database && pending_migrations == Some(0);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if healthy { "ok" } else { "degraded" },
            database,
            pending_migrations,
        }),
    )
}
