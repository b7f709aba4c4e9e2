//! Database operations for the garments table.

use atelier_engine::{EntityKind, Garment, GarmentStatus, NewGarment};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, QueryBuilder};

/// A garment row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GarmentRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl GarmentRow {
    /// Convert to the wire model, rejecting unknown status strings.
    pub fn to_garment(&self) -> Result<Garment, String> {
        let status = GarmentStatus::parse(&self.status)
            .ok_or_else(|| format!("unknown garment status: {}", self.status))?;
        Ok(Garment {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            status,
            active: self.active,
            created_at: self.created_at,
        })
    }
}

const GARMENT_COLUMNS: &str = "id, name, description, status, active, created_at";

pub async fn garment_by_id(
    exec: impl PgExecutor<'_>,
    id: i64,
) -> Result<Option<GarmentRow>, sqlx::Error> {
    sqlx::query_as::<_, GarmentRow>(&format!(
        "SELECT {GARMENT_COLUMNS} FROM garments WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(exec)
    .await
}

/// Fetch a garment and lock its row for the rest of the transaction.
///
/// Every rental state transition takes this lock first, which serializes
/// the conflict check plus the paired writes per garment.
pub async fn garment_for_update(
    exec: impl PgExecutor<'_>,
    id: i64,
) -> Result<Option<GarmentRow>, sqlx::Error> {
    sqlx::query_as::<_, GarmentRow>(&format!(
        "SELECT {GARMENT_COLUMNS} FROM garments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(exec)
    .await
}

pub async fn insert_garment(
    exec: impl PgExecutor<'_>,
    garment: &NewGarment,
) -> Result<GarmentRow, sqlx::Error> {
    let status = garment.status.unwrap_or(GarmentStatus::Available);
    sqlx::query_as::<_, GarmentRow>(&format!(
        "INSERT INTO garments (name, description, status) VALUES ($1, $2, $3) \
         RETURNING {GARMENT_COLUMNS}"
    ))
    .bind(&garment.name)
    .bind(&garment.description)
    .bind(status.as_str())
    .fetch_one(exec)
    .await
}

/// Patch a garment. Unset fields keep their current value.
pub async fn update_garment_fields(
    exec: impl PgExecutor<'_>,
    id: i64,
    name: Option<&str>,
    description: Option<&str>,
    status: Option<GarmentStatus>,
    active: Option<bool>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE garments SET \
             name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             status = COALESCE($4, status), \
             active = COALESCE($5, active) \
         WHERE id = $1",
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(status.map(|s| s.as_str()))
    .bind(active)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

pub async fn set_garment_status(
    exec: impl PgExecutor<'_>,
    id: i64,
    status: GarmentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE garments SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn deactivate_garment(exec: impl PgExecutor<'_>, id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE garments SET active = FALSE WHERE id = $1")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

/// True when the garment currently has an active rental.
pub async fn garment_has_active_rental(
    exec: impl PgExecutor<'_>,
    garment_id: i64,
) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM rentals WHERE garment_id = $1 AND status = 'active')",
    )
    .bind(garment_id)
    .fetch_one(exec)
    .await?;
    Ok(exists)
}

/// Listing filters for garments.
#[derive(Debug, Default)]
pub struct GarmentFilter {
    pub status: Option<GarmentStatus>,
    pub active: Option<bool>,
}

pub async fn list_garments(
    pool: &PgPool,
    filter: &GarmentFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<GarmentRow>, sqlx::Error> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {GARMENT_COLUMNS} FROM garments WHERE 1=1"
    ));
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(active) = filter.active {
        qb.push(" AND active = ").push_bind(active);
    }
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as().fetch_all(pool).await
}

pub async fn count_garments(pool: &PgPool, filter: &GarmentFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM garments WHERE 1=1");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(active) = filter.active {
        qb.push(" AND active = ").push_bind(active);
    }

    let (count,): (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count)
}

/// Garments ready to rent right now.
pub async fn available_garments(pool: &PgPool) -> Result<Vec<GarmentRow>, sqlx::Error> {
    sqlx::query_as::<_, GarmentRow>(&format!(
        "SELECT {GARMENT_COLUMNS} FROM garments \
         WHERE status = 'available' AND active = TRUE \
         ORDER BY name ASC"
    ))
    .fetch_all(pool)
    .await
}

/// Shorthand for a typed not-found error.
pub fn garment_not_found(id: i64) -> atelier_engine::Error {
    atelier_engine::Error::NotFound {
        entity: EntityKind::Garment,
        id: id.to_string(),
    }
}
