//! Garment endpoint routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::GarmentFilter;
use crate::error::Result;
use crate::handlers;
use crate::AppState;
use atelier_engine::{ApiResponse, Garment, GarmentPatch, GarmentStatus, NewGarment};

/// Create garment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/garments", get(list).post(create))
        .route("/garments/available", get(available))
        .route(
            "/garments/{id}",
            get(get_one).put(update).delete(delete_one),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    status: Option<GarmentStatus>,
    active: Option<bool>,
}

/// GET /garments
async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Garment>>>> {
    let filter = GarmentFilter {
        status: query.status,
        active: query.active,
    };
    let (garments, pagination) = handlers::list_garments(
        &state.pool,
        filter,
        query.page.unwrap_or(1),
        query.limit.unwrap_or(10),
    )
    .await?;
    Ok(Json(ApiResponse::page(garments, pagination)))
}

/// GET /garments/available
async fn available(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<Garment>>>> {
    let garments = handlers::available_garments(&state.pool).await?;
    Ok(Json(ApiResponse::ok(garments)))
}

/// GET /garments/{id}
async fn get_one(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Garment>>> {
    let garment = handlers::get_garment(&state.pool, id).await?;
    Ok(Json(ApiResponse::ok(garment)))
}

/// POST /garments
async fn create(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<NewGarment>,
) -> Result<impl IntoResponse> {
    let garment = handlers::create_garment(&state.pool, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(garment, "Garment created")),
    ))
}

/// PUT /garments/{id}
async fn update(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<GarmentPatch>,
) -> Result<Json<ApiResponse<Garment>>> {
    let garment = handlers::update_garment(&state.pool, id, patch).await?;
    Ok(Json(ApiResponse::ok_with_message(garment, "Garment updated")))
}

/// DELETE /garments/{id} - soft delete.
async fn delete_one(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    handlers::delete_garment(&state.pool, id).await?;
    Ok(Json(ApiResponse::ok_message("Garment deleted")))
}
