//! The rental ledger: conflict checking and transactional state
//! transitions.
//!
//! Every mutation runs as one transaction that first locks the garment (or
//! rental) row, so two concurrent bookings of the same garment serialize:
//! the second one sees the first's committed rental and fails the conflict
//! check instead of double-booking.

use crate::db;
use crate::error::{AppError, Result};
use atelier_engine::{
    Error as LedgerError, GarmentStatus, NewRental, Pagination, Rental, RentalPatch, RentalStatus,
    TimeRange,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

/// Create a rental and mark the garment rented, atomically.
pub async fn create_rental(
    pool: &PgPool,
    idempotency_key: Option<&str>,
    request: NewRental,
) -> Result<Rental> {
    // Interval validation happens before any row is touched.
    let window = TimeRange::new(request.start_time, request.end_time)?;

    // A replayed mutation returns the rental the original call produced.
    if let Some(key) = idempotency_key {
        if let Some(Some(rental_id)) = db::processed_mutation(pool, key).await? {
            tracing::debug!(key, rental_id, "replayed create, returning original rental");
            return fetch_joined(pool, rental_id).await;
        }
    }

    let mut tx = pool.begin().await?;

    if let Some(client_id) = request.client_id {
        let client = db::client_by_id(&mut *tx, client_id)
            .await?
            .ok_or_else(|| db::client_not_found(client_id))?;
        if !client.active {
            return Err(LedgerError::InactiveEntity {
                entity: atelier_engine::EntityKind::Client,
                id: client_id,
            }
            .into());
        }
    }

    // Locks the garment row: concurrent transitions on this garment wait
    // here until we commit or roll back.
    let garment = db::garment_for_update(&mut *tx, request.garment_id)
        .await?
        .ok_or_else(|| db::garment_not_found(request.garment_id))?;
    let garment_status = GarmentStatus::parse(&garment.status)
        .ok_or_else(|| AppError::Internal(format!("unknown garment status: {}", garment.status)))?;
    if !garment.active || garment_status != GarmentStatus::Available {
        return Err(LedgerError::Unavailable {
            garment_id: garment.id,
            status: garment_status,
        }
        .into());
    }

    let taken: Vec<TimeRange> = db::active_windows(&mut *tx, garment.id)
        .await?
        .into_iter()
        .filter_map(|(start, end)| TimeRange::new(start, end).ok())
        .collect();
    if window.first_conflict(&taken).is_some() {
        return Err(LedgerError::BookingConflict {
            garment_id: garment.id,
            start: window.start,
            end: window.end,
        }
        .into());
    }

    let rental_id = db::insert_rental(&mut *tx, &request).await?;
    db::set_garment_status(&mut *tx, garment.id, GarmentStatus::Rented).await?;
    if let Some(key) = idempotency_key {
        db::record_processed(&mut *tx, key, Some(rental_id)).await?;
    }
    tx.commit().await?;

    tracing::info!(rental_id, garment_id = garment.id, "rental created");
    fetch_joined(pool, rental_id).await
}

/// Patch a rental. A status transition into `completed` or `cancelled`
/// frees the garment in the same transaction.
///
/// Date edits are not re-checked for overlap against other active rentals
/// on the garment; the conflict check runs at creation time only.
pub async fn update_rental(
    pool: &PgPool,
    idempotency_key: Option<&str>,
    id: i64,
    patch: RentalPatch,
) -> Result<Rental> {
    if let (Some(start), Some(end)) = (patch.start_time, patch.end_time) {
        TimeRange::new(start, end)?;
    }

    if let Some(key) = idempotency_key {
        if db::processed_mutation(pool, key).await?.is_some() {
            tracing::debug!(key, id, "replayed update, returning current rental");
            return fetch_joined(pool, id).await;
        }
    }

    let mut tx = pool.begin().await?;

    let current = db::rental_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| db::rental_not_found(id))?;
    let current_status = RentalStatus::parse(&current.status)
        .ok_or_else(|| AppError::Internal(format!("unknown rental status: {}", current.status)))?;
    if current_status.is_terminal() {
        return Err(LedgerError::InvalidState {
            rental_id: id,
            status: current_status,
        }
        .into());
    }

    db::update_rental_fields(&mut *tx, id, &patch).await?;

    // The caller's single update produces both row mutations.
    if patch.status.is_some_and(|s| s.frees_garment()) {
        db::set_garment_status(&mut *tx, current.garment_id, GarmentStatus::Available).await?;
    }
    if let Some(key) = idempotency_key {
        db::record_processed(&mut *tx, key, Some(id)).await?;
    }
    tx.commit().await?;

    fetch_joined(pool, id).await
}

/// Cancel an active rental and free its garment, atomically.
pub async fn cancel_rental(pool: &PgPool, idempotency_key: Option<&str>, id: i64) -> Result<()> {
    if let Some(key) = idempotency_key {
        if db::processed_mutation(pool, key).await?.is_some() {
            tracing::debug!(key, id, "replayed cancel, already applied");
            return Ok(());
        }
    }

    let mut tx = pool.begin().await?;

    let current = db::rental_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| db::rental_not_found(id))?;
    let current_status = RentalStatus::parse(&current.status)
        .ok_or_else(|| AppError::Internal(format!("unknown rental status: {}", current.status)))?;
    if current_status != RentalStatus::Active {
        return Err(LedgerError::InvalidState {
            rental_id: id,
            status: current_status,
        }
        .into());
    }

    db::set_rental_status(&mut *tx, id, RentalStatus::Cancelled).await?;
    db::set_garment_status(&mut *tx, current.garment_id, GarmentStatus::Available).await?;
    if let Some(key) = idempotency_key {
        db::record_processed(&mut *tx, key, Some(id)).await?;
    }
    tx.commit().await?;

    tracing::info!(rental_id = id, "rental cancelled");
    Ok(())
}

/// Snapshot of active rentals ordered by start time.
pub async fn list_active_rentals(pool: &PgPool) -> Result<Vec<Rental>> {
    let rows = db::list_active(pool).await?;
    rows.iter()
        .map(|row| row.to_rental().map_err(AppError::Internal))
        .collect()
}

pub async fn get_rental(pool: &PgPool, id: i64) -> Result<Rental> {
    fetch_joined(pool, id).await
}

/// Paged rental listing with filters.
pub async fn list_rentals(
    pool: &PgPool,
    filter: db::RentalFilter,
    page: i64,
    limit: i64,
) -> Result<(Vec<Rental>, Pagination)> {
    let page = page.max(1);
    let limit = limit.clamp(1, 100);
    let offset = (page - 1) * limit;

    let total = db::count_rentals(pool, &filter).await?;
    let rows = db::list_rentals(pool, &filter, limit, offset).await?;
    let rentals: Vec<Rental> = rows
        .iter()
        .map(|row| row.to_rental().map_err(AppError::Internal))
        .collect::<Result<_>>()?;

    Ok((rentals, Pagination::new(page, limit, total)))
}

/// Summary figures for the operations dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalStats {
    pub total: i64,
    pub active: i64,
    pub completed: i64,
    pub revenue_total: Decimal,
    pub revenue_month: Decimal,
}

pub async fn rental_stats(pool: &PgPool) -> Result<RentalStats> {
    let (total, active, completed) = db::rental_counts(pool).await?;
    let (revenue_total, revenue_month) = db::rental_revenue(pool).await?;
    Ok(RentalStats {
        total,
        active,
        completed,
        revenue_total,
        revenue_month,
    })
}

async fn fetch_joined(pool: &PgPool, id: i64) -> Result<Rental> {
    let row = db::rental_joined(pool, id)
        .await?
        .ok_or_else(|| db::rental_not_found(id))?;
    row.to_rental().map_err(AppError::Internal)
}
