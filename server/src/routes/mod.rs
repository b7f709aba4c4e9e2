//! HTTP route definitions.

mod clients;
mod garments;
mod health;
mod rentals;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(rentals::routes())
        .merge(garments::routes())
        .merge(clients::routes())
}
