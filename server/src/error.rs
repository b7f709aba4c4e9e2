//! Unified error handling for the server.
//!
//! Every failure leaves the handler as an [`AppError`] and is rendered as
//! the uniform response envelope. Ledger errors keep their detail (entity
//! id, offending interval); storage errors are reported generically while
//! the true cause is logged for operators.

use atelier_engine::{ApiResponse, Error as LedgerError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The HTTP status this error renders as.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Ledger(e) => match e {
                LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
                LedgerError::BookingConflict { .. } => StatusCode::CONFLICT,
                LedgerError::InvalidInterval { .. }
                | LedgerError::InactiveEntity { .. }
                | LedgerError::Unavailable { .. }
                | LedgerError::InvalidState { .. } => StatusCode::BAD_REQUEST,
                LedgerError::InvalidSnapshot(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body: ApiResponse<()> = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {e:?}");
                ApiResponse::fail("Internal server error")
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                ApiResponse::fail("Internal server error")
            }
            AppError::Ledger(e) => {
                tracing::warn!("ledger rejected request: {e}");
                ApiResponse::fail_with_error(e.to_string(), error_code(e))
            }
            AppError::BadRequest(msg) => ApiResponse::fail(msg.clone()),
            AppError::Conflict(msg) => ApiResponse::fail(msg.clone()),
        };

        (status, Json(body)).into_response()
    }
}

/// Stable machine-oriented code for a ledger error.
fn error_code(e: &LedgerError) -> &'static str {
    match e {
        LedgerError::InvalidInterval { .. } => "invalid_interval",
        LedgerError::NotFound { .. } => "not_found",
        LedgerError::InactiveEntity { .. } => "inactive_entity",
        LedgerError::Unavailable { .. } => "unavailable",
        LedgerError::BookingConflict { .. } => "booking_conflict",
        LedgerError::InvalidState { .. } => "invalid_state",
        LedgerError::InvalidSnapshot(_) => "internal",
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_engine::{EntityKind, GarmentStatus, RentalStatus};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ledger_errors_map_to_http_classes() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();

        let cases = [
            (
                AppError::Ledger(LedgerError::InvalidInterval { start, end }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Ledger(LedgerError::NotFound {
                    entity: EntityKind::Rental,
                    id: "5".into(),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Ledger(LedgerError::InactiveEntity {
                    entity: EntityKind::Client,
                    id: 2,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Ledger(LedgerError::Unavailable {
                    garment_id: 3,
                    status: GarmentStatus::Rented,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Ledger(LedgerError::BookingConflict {
                    garment_id: 3,
                    start,
                    end,
                }),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Ledger(LedgerError::InvalidState {
                    rental_id: 5,
                    status: RentalStatus::Cancelled,
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Conflict("client 1 has an open rental".into()),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "wrong status for {error:?}");
        }
    }

    #[test]
    fn storage_errors_render_generically() {
        let response = AppError::Internal("connection pool exhausted".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The body must not leak the internal cause; it is only logged.
    }
}
