//! Health check endpoint, also the target of client connectivity probes.
//!
//! The check pings the database: a ledger that cannot reach its store is
//! as unusable as one that is unreachable, and offline clients should
//! keep queueing in that case.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::Result;
use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler: verifies the database answers.
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Root handler.
async fn root() -> &'static str {
    "Atelier Rental Ledger"
}
