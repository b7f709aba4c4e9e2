//! Error types for the Atelier engine.

use crate::model::{EntityKind, GarmentStatus, RentalStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// All failures the ledger and the offline engine can produce.
///
/// Validation failures, missing entities and state conflicts are distinct
/// variants so callers can map them to distinct HTTP classes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("end time {end} is not after start time {start}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("{entity} {id} is inactive")]
    InactiveEntity { entity: EntityKind, id: i64 },

    #[error("garment {garment_id} is not available (status: {status})")]
    Unavailable {
        garment_id: i64,
        status: GarmentStatus,
    },

    #[error("garment {garment_id} already has an active rental overlapping [{start}, {end}]")]
    BookingConflict {
        garment_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("rental {rental_id} is {status}, operation requires an active rental")]
    InvalidState {
        rental_id: i64,
        status: RentalStatus,
    },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures that describe a state conflict rather than bad
    /// input or a missing entity (409-equivalent).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::BookingConflict { .. })
    }

    /// True when the failure is a missing entity (404-equivalent).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
