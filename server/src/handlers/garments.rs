//! Garment handlers. Plain CRUD except for the guards that interact with
//! the rental ledger: a garment cannot be marked available or retired
//! while an active rental still holds it.

use crate::db;
use crate::error::{AppError, Result};
use atelier_engine::{Garment, GarmentPatch, GarmentStatus, NewGarment, Pagination};
use sqlx::PgPool;

pub async fn list_garments(
    pool: &PgPool,
    filter: db::GarmentFilter,
    page: i64,
    limit: i64,
) -> Result<(Vec<Garment>, Pagination)> {
    let page = page.max(1);
    let limit = limit.clamp(1, 100);
    let offset = (page - 1) * limit;

    let total = db::count_garments(pool, &filter).await?;
    let rows = db::list_garments(pool, &filter, limit, offset).await?;
    let garments: Vec<Garment> = rows
        .iter()
        .map(|row| row.to_garment().map_err(AppError::Internal))
        .collect::<Result<_>>()?;

    Ok((garments, Pagination::new(page, limit, total)))
}

pub async fn available_garments(pool: &PgPool) -> Result<Vec<Garment>> {
    let rows = db::available_garments(pool).await?;
    rows.iter()
        .map(|row| row.to_garment().map_err(AppError::Internal))
        .collect()
}

pub async fn get_garment(pool: &PgPool, id: i64) -> Result<Garment> {
    let row = db::garment_by_id(pool, id)
        .await?
        .ok_or_else(|| db::garment_not_found(id))?;
    row.to_garment().map_err(AppError::Internal)
}

pub async fn create_garment(pool: &PgPool, request: NewGarment) -> Result<Garment> {
    let row = db::insert_garment(pool, &request).await?;
    tracing::info!(garment_id = row.id, "garment created");
    row.to_garment().map_err(AppError::Internal)
}

pub async fn update_garment(pool: &PgPool, id: i64, patch: GarmentPatch) -> Result<Garment> {
    let mut tx = pool.begin().await?;

    let existing = db::garment_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| db::garment_not_found(id))?;

    // Forcing a rented garment back to available would contradict the
    // ledger; the rental has to be completed or cancelled instead.
    if patch.status == Some(GarmentStatus::Available)
        && db::garment_has_active_rental(&mut *tx, existing.id).await?
    {
        return Err(AppError::BadRequest(format!(
            "garment {id} still has an active rental and cannot be marked available"
        )));
    }

    db::update_garment_fields(
        &mut *tx,
        id,
        patch.name.as_deref(),
        patch.description.as_deref(),
        patch.status,
        patch.active,
    )
    .await?;
    tx.commit().await?;

    get_garment(pool, id).await
}

/// Soft delete. Refused while the garment is out on an active rental.
pub async fn delete_garment(pool: &PgPool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    db::garment_for_update(&mut *tx, id)
        .await?
        .ok_or_else(|| db::garment_not_found(id))?;
    if db::garment_has_active_rental(&mut *tx, id).await? {
        return Err(AppError::Conflict(format!(
            "garment {id} has an active rental and cannot be deleted"
        )));
    }

    db::deactivate_garment(&mut *tx, id).await?;
    tx.commit().await?;

    tracing::info!(garment_id = id, "garment deactivated");
    Ok(())
}
