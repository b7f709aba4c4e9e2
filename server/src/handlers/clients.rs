//! Client handlers. Deletion is the only ledger-coupled operation: a
//! client with an open rental cannot be removed.

use crate::db;
use crate::error::{AppError, Result};
use atelier_engine::{Client, ClientPatch, NewClient, Pagination, Rental};
use sqlx::PgPool;

pub async fn list_clients(
    pool: &PgPool,
    filter: db::ClientFilter,
    page: i64,
    limit: i64,
) -> Result<(Vec<Client>, Pagination)> {
    let page = page.max(1);
    let limit = limit.clamp(1, 100);
    let offset = (page - 1) * limit;

    let total = db::count_clients(pool, &filter).await?;
    let rows = db::list_clients(pool, &filter, limit, offset).await?;
    let clients = rows.iter().map(|row| row.to_client()).collect();

    Ok((clients, Pagination::new(page, limit, total)))
}

pub async fn get_client(pool: &PgPool, id: i64) -> Result<Client> {
    let row = db::client_by_id(pool, id)
        .await?
        .ok_or_else(|| db::client_not_found(id))?;
    Ok(row.to_client())
}

pub async fn create_client(pool: &PgPool, request: NewClient) -> Result<Client> {
    let row = db::insert_client(pool, &request).await?;
    tracing::info!(client_id = row.id, "client created");
    Ok(row.to_client())
}

pub async fn update_client(pool: &PgPool, id: i64, patch: ClientPatch) -> Result<Client> {
    let updated = db::update_client_fields(
        pool,
        id,
        patch.name.as_deref(),
        patch.email.as_deref(),
        patch.phone.as_deref(),
        patch.active,
    )
    .await?;
    if updated == 0 {
        return Err(db::client_not_found(id).into());
    }
    get_client(pool, id).await
}

/// Soft delete, blocked while the client has an open rental.
pub async fn delete_client(pool: &PgPool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    db::client_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| db::client_not_found(id))?;
    if db::client_has_open_rentals(&mut *tx, id).await? {
        return Err(AppError::Conflict(format!(
            "client {id} has an open rental and cannot be deleted"
        )));
    }

    db::deactivate_client(&mut *tx, id).await?;
    tx.commit().await?;

    tracing::info!(client_id = id, "client deactivated");
    Ok(())
}

/// Rental history for a client, newest first.
pub async fn client_rentals(pool: &PgPool, id: i64) -> Result<Vec<Rental>> {
    db::client_by_id(pool, id)
        .await?
        .ok_or_else(|| db::client_not_found(id))?;

    let rows = db::rentals_for_client(pool, id).await?;
    rows.iter()
        .map(|row| row.to_rental().map_err(AppError::Internal))
        .collect()
}
