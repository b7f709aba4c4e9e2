//! Client endpoint routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::ClientFilter;
use crate::error::Result;
use crate::handlers;
use crate::AppState;
use atelier_engine::{ApiResponse, Client, ClientPatch, NewClient, Rental};

/// Create client routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list).post(create))
        .route(
            "/clients/{id}",
            get(get_one).put(update).delete(delete_one),
        )
        .route("/clients/{id}/rentals", get(rentals))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<i64>,
    limit: Option<i64>,
    active: Option<bool>,
    search: Option<String>,
}

/// GET /clients
async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Client>>>> {
    let filter = ClientFilter {
        active: query.active,
        search: query.search,
    };
    let (clients, pagination) = handlers::list_clients(
        &state.pool,
        filter,
        query.page.unwrap_or(1),
        query.limit.unwrap_or(10),
    )
    .await?;
    Ok(Json(ApiResponse::page(clients, pagination)))
}

/// GET /clients/{id}
async fn get_one(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Client>>> {
    let client = handlers::get_client(&state.pool, id).await?;
    Ok(Json(ApiResponse::ok(client)))
}

/// POST /clients
async fn create(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<NewClient>,
) -> Result<impl IntoResponse> {
    let client = handlers::create_client(&state.pool, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(client, "Client created")),
    ))
}

/// PUT /clients/{id}
async fn update(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<ClientPatch>,
) -> Result<Json<ApiResponse<Client>>> {
    let client = handlers::update_client(&state.pool, id, patch).await?;
    Ok(Json(ApiResponse::ok_with_message(client, "Client updated")))
}

/// DELETE /clients/{id} - soft delete, blocked while rentals are open.
async fn delete_one(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    handlers::delete_client(&state.pool, id).await?;
    Ok(Json(ApiResponse::ok_message("Client deleted")))
}

/// GET /clients/{id}/rentals - rental history.
async fn rentals(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<Rental>>>> {
    let rentals = handlers::client_rentals(&state.pool, id).await?;
    Ok(Json(ApiResponse::ok(rentals)))
}
