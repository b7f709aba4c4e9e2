//! Database operations for the rentals table and the idempotency ledger.

use atelier_engine::{EntityKind, NewRental, Rental, RentalPatch, RentalStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, QueryBuilder, Row};

/// A rental row joined with denormalized client and garment names.
#[derive(Debug, Clone)]
pub struct RentalRow {
    pub id: i64,
    pub garment_id: i64,
    pub client_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub client_name: String,
    pub garment_name: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RentalRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RentalRow {
            id: row.try_get("id")?,
            garment_id: row.try_get("garment_id")?,
            client_id: row.try_get("client_id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: row.try_get("status")?,
            cost: row.try_get("cost")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            client_name: row.try_get("client_name")?,
            garment_name: row.try_get("garment_name")?,
        })
    }
}

impl RentalRow {
    /// Convert to the wire model, rejecting unknown status strings.
    pub fn to_rental(&self) -> Result<Rental, String> {
        let status = RentalStatus::parse(&self.status)
            .ok_or_else(|| format!("unknown rental status: {}", self.status))?;
        Ok(Rental {
            id: self.id,
            garment_id: self.garment_id,
            client_id: self.client_id,
            start_time: self.start_time,
            end_time: self.end_time,
            status,
            cost: self.cost,
            notes: self.notes.clone(),
            created_at: self.created_at,
            client_name: self.client_name.clone(),
            garment_name: self.garment_name.clone(),
        })
    }
}

/// Select clause for the joined rental shape.
const RENTAL_SELECT: &str = "SELECT r.id, r.garment_id, r.client_id, r.start_time, r.end_time, \
     r.status, r.cost, r.notes, r.created_at, \
     COALESCE(c.name, 'Unassigned') AS client_name, g.name AS garment_name \
     FROM rentals r \
     LEFT JOIN clients c ON r.client_id = c.id \
     JOIN garments g ON r.garment_id = g.id";

/// Minimal rental fields needed to gate a state transition.
#[derive(Debug, sqlx::FromRow)]
pub struct RentalHead {
    pub id: i64,
    pub garment_id: i64,
    pub status: String,
}

/// Active rental windows on a garment, for the conflict check. Must run
/// inside the transaction that holds the garment row lock.
pub async fn active_windows(
    exec: impl PgExecutor<'_>,
    garment_id: i64,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT start_time, end_time FROM rentals WHERE garment_id = $1 AND status = 'active'",
    )
    .bind(garment_id)
    .fetch_all(exec)
    .await
}

/// Insert a rental with status `active`, returning the new id.
pub async fn insert_rental(
    exec: impl PgExecutor<'_>,
    rental: &NewRental,
) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO rentals (garment_id, client_id, start_time, end_time, status, cost, notes) \
         VALUES ($1, $2, $3, $4, 'active', $5, $6) \
         RETURNING id",
    )
    .bind(rental.garment_id)
    .bind(rental.client_id)
    .bind(rental.start_time)
    .bind(rental.end_time)
    .bind(rental.cost)
    .bind(&rental.notes)
    .fetch_one(exec)
    .await?;
    Ok(id)
}

/// Fetch a rental head and lock its row for the transaction.
pub async fn rental_for_update(
    exec: impl PgExecutor<'_>,
    id: i64,
) -> Result<Option<RentalHead>, sqlx::Error> {
    sqlx::query_as::<_, RentalHead>(
        "SELECT id, garment_id, status FROM rentals WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(exec)
    .await
}

pub async fn set_rental_status(
    exec: impl PgExecutor<'_>,
    id: i64,
    status: RentalStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE rentals SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(exec)
        .await?;
    Ok(())
}

/// Apply a patch. Unset fields keep their current value.
pub async fn update_rental_fields(
    exec: impl PgExecutor<'_>,
    id: i64,
    patch: &RentalPatch,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE rentals SET \
             start_time = COALESCE($2, start_time), \
             end_time = COALESCE($3, end_time), \
             status = COALESCE($4, status), \
             cost = COALESCE($5, cost), \
             notes = COALESCE($6, notes) \
         WHERE id = $1",
    )
    .bind(id)
    .bind(patch.start_time)
    .bind(patch.end_time)
    .bind(patch.status.map(|s| s.as_str()))
    .bind(patch.cost)
    .bind(&patch.notes)
    .execute(exec)
    .await?;
    Ok(())
}

/// One rental joined with display names.
pub async fn rental_joined(
    exec: impl PgExecutor<'_>,
    id: i64,
) -> Result<Option<RentalRow>, sqlx::Error> {
    sqlx::query_as::<_, RentalRow>(&format!("{RENTAL_SELECT} WHERE r.id = $1"))
        .bind(id)
        .fetch_optional(exec)
        .await
}

/// Snapshot of active rentals ordered by start time, for dashboards.
pub async fn list_active(pool: &PgPool) -> Result<Vec<RentalRow>, sqlx::Error> {
    sqlx::query_as::<_, RentalRow>(&format!(
        "{RENTAL_SELECT} WHERE r.status = 'active' ORDER BY r.start_time ASC"
    ))
    .fetch_all(pool)
    .await
}

/// Listing filters for rentals.
#[derive(Debug, Default)]
pub struct RentalFilter {
    pub garment_id: Option<i64>,
    pub client_id: Option<i64>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

fn push_rental_filters(qb: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &RentalFilter) {
    if let Some(garment_id) = filter.garment_id {
        qb.push(" AND r.garment_id = ").push_bind(garment_id);
    }
    if let Some(client_id) = filter.client_id {
        qb.push(" AND r.client_id = ").push_bind(client_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND r.start_time >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND r.end_time <= ").push_bind(to);
    }
}

pub async fn list_rentals(
    pool: &PgPool,
    filter: &RentalFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<RentalRow>, sqlx::Error> {
    let mut qb = QueryBuilder::new(format!("{RENTAL_SELECT} WHERE 1=1"));
    push_rental_filters(&mut qb, filter);
    qb.push(" ORDER BY r.created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as().fetch_all(pool).await
}

pub async fn count_rentals(pool: &PgPool, filter: &RentalFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::new(
        "SELECT COUNT(*) FROM rentals r \
         LEFT JOIN clients c ON r.client_id = c.id \
         JOIN garments g ON r.garment_id = g.id \
         WHERE 1=1",
    );
    push_rental_filters(&mut qb, filter);

    let (count,): (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count)
}

/// Rental history for one client, newest first.
pub async fn rentals_for_client(
    pool: &PgPool,
    client_id: i64,
) -> Result<Vec<RentalRow>, sqlx::Error> {
    sqlx::query_as::<_, RentalRow>(&format!(
        "{RENTAL_SELECT} WHERE r.client_id = $1 ORDER BY r.created_at DESC"
    ))
    .bind(client_id)
    .fetch_all(pool)
    .await
}

/// Counts and revenue for the stats endpoint.
pub async fn rental_counts(pool: &PgPool) -> Result<(i64, i64, i64), sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE status = 'active') AS active, \
                COUNT(*) FILTER (WHERE status = 'completed') AS completed \
         FROM rentals",
    )
    .fetch_one(pool)
    .await?;
    Ok((
        row.try_get("total")?,
        row.try_get("active")?,
        row.try_get("completed")?,
    ))
}

/// Revenue from completed rentals: all-time and current month.
pub async fn rental_revenue(pool: &PgPool) -> Result<(Decimal, Decimal), sqlx::Error> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(cost), 0) AS total, \
                COALESCE(SUM(cost) FILTER ( \
                    WHERE date_trunc('month', created_at) = date_trunc('month', now())), 0) AS month \
         FROM rentals WHERE status = 'completed'",
    )
    .fetch_one(pool)
    .await?;
    Ok((row.try_get("total")?, row.try_get("month")?))
}

/// Look up an already-processed mutation key. `Some(rental_id)` holds the
/// rental the original call produced (None for cancels).
pub async fn processed_mutation(
    exec: impl PgExecutor<'_>,
    key: &str,
) -> Result<Option<Option<i64>>, sqlx::Error> {
    let row: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT rental_id FROM processed_mutations WHERE key = $1")
            .bind(key)
            .fetch_optional(exec)
            .await?;
    Ok(row.map(|(rental_id,)| rental_id))
}

/// Record a processed mutation key inside the same transaction as its
/// effect, so the ack and the dedupe entry commit together.
pub async fn record_processed(
    exec: impl PgExecutor<'_>,
    key: &str,
    rental_id: Option<i64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO processed_mutations (key, rental_id) VALUES ($1, $2) \
         ON CONFLICT (key) DO NOTHING",
    )
    .bind(key)
    .bind(rental_id)
    .execute(exec)
    .await?;
    Ok(())
}

/// Shorthand for a typed not-found error.
pub fn rental_not_found(id: i64) -> atelier_engine::Error {
    atelier_engine::Error::NotFound {
        entity: EntityKind::Rental,
        id: id.to_string(),
    }
}
