//! Rental endpoint routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::RentalFilter;
use crate::error::Result;
use crate::handlers;
use crate::idempotency::IdempotencyKey;
use crate::AppState;
use atelier_engine::{ApiResponse, NewRental, Rental, RentalPatch};

/// Create rental routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rentals", get(list).post(create))
        .route("/rentals/active", get(active))
        .route("/rentals/stats", get(stats))
        .route(
            "/rentals/{id}",
            get(get_one).put(update).delete(cancel),
        )
}

/// Query parameters for the rental listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    garment_id: Option<i64>,
    client_id: Option<i64>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// GET /rentals - paged listing with filters.
async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Rental>>>> {
    let filter = RentalFilter {
        garment_id: query.garment_id,
        client_id: query.client_id,
        from: query.from,
        to: query.to,
    };
    let (rentals, pagination) = handlers::list_rentals(
        &state.pool,
        filter,
        query.page.unwrap_or(1),
        query.limit.unwrap_or(10),
    )
    .await?;
    Ok(Json(ApiResponse::page(rentals, pagination)))
}

/// GET /rentals/active - snapshot ordered by start time.
async fn active(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Rental>>>> {
    let rentals = handlers::list_active_rentals(&state.pool).await?;
    Ok(Json(ApiResponse::ok(rentals)))
}

/// GET /rentals/stats - dashboard summary.
async fn stats(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<handlers::RentalStats>>> {
    let stats = handlers::rental_stats(&state.pool).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /rentals/{id}
async fn get_one(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Rental>>> {
    let rental = handlers::get_rental(&state.pool, id).await?;
    Ok(Json(ApiResponse::ok(rental)))
}

/// POST /rentals
async fn create(
    State(state): State<AppState>,
    _auth: AuthUser,
    key: IdempotencyKey,
    Json(request): Json<NewRental>,
) -> Result<impl IntoResponse> {
    let rental = handlers::create_rental(&state.pool, key.as_deref(), request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(rental, "Rental created")),
    ))
}

/// PUT /rentals/{id}
async fn update(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    key: IdempotencyKey,
    Json(patch): Json<RentalPatch>,
) -> Result<Json<ApiResponse<Rental>>> {
    let rental = handlers::update_rental(&state.pool, key.as_deref(), id, patch).await?;
    Ok(Json(ApiResponse::ok_with_message(rental, "Rental updated")))
}

/// DELETE /rentals/{id} - cancel.
async fn cancel(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    key: IdempotencyKey,
) -> Result<Json<ApiResponse<()>>> {
    handlers::cancel_rental(&state.pool, key.as_deref(), id).await?;
    Ok(Json(ApiResponse::ok_message("Rental cancelled")))
}
