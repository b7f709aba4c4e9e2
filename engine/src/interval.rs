//! Rental time intervals and the overlap check.
//!
//! The overlap check is the single source of truth for booking conflicts.
//! Both the server-side conflict query and the client-side tests go through
//! the same predicate so the two sides cannot drift apart.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated rental window.
///
/// Invariant: `end > start`. Construction is the only way to obtain one,
/// so an invalid interval can never reach the conflict check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range, rejecting `end <= start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive overlap: two windows conflict when
    /// `start_a <= end_b && start_b <= end_a`.
    ///
    /// Touching endpoints count as a conflict, so back-to-back bookings on
    /// the same garment need at least an instant of turnaround between
    /// them.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// First window in `existing` that conflicts with this one, if any.
    pub fn first_conflict<'a, I>(&self, existing: I) -> Option<&'a TimeRange>
    where
        I: IntoIterator<Item = &'a TimeRange>,
    {
        existing.into_iter().find(|w| self.overlaps(w))
    }
}
