//! Database operations for the clients table.

use atelier_engine::{Client, EntityKind, NewClient};
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, QueryBuilder};

/// A client row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClientRow {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ClientRow {
    pub fn to_client(&self) -> Client {
        Client {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            active: self.active,
            created_at: self.created_at,
        }
    }
}

const CLIENT_COLUMNS: &str = "id, name, email, phone, active, created_at";

pub async fn client_by_id(
    exec: impl PgExecutor<'_>,
    id: i64,
) -> Result<Option<ClientRow>, sqlx::Error> {
    sqlx::query_as::<_, ClientRow>(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(exec)
    .await
}

pub async fn insert_client(
    exec: impl PgExecutor<'_>,
    client: &NewClient,
) -> Result<ClientRow, sqlx::Error> {
    sqlx::query_as::<_, ClientRow>(&format!(
        "INSERT INTO clients (name, email, phone) VALUES ($1, $2, $3) \
         RETURNING {CLIENT_COLUMNS}"
    ))
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.phone)
    .fetch_one(exec)
    .await
}

pub async fn update_client_fields(
    exec: impl PgExecutor<'_>,
    id: i64,
    name: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
    active: Option<bool>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE clients SET \
             name = COALESCE($2, name), \
             email = COALESCE($3, email), \
             phone = COALESCE($4, phone), \
             active = COALESCE($5, active) \
         WHERE id = $1",
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(phone)
    .bind(active)
    .execute(exec)
    .await?;
    Ok(result.rows_affected())
}

/// Soft delete.
pub async fn deactivate_client(exec: impl PgExecutor<'_>, id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE clients SET active = FALSE WHERE id = $1")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

/// True when the client still has a rental that is not in a terminal
/// state. Deletion is blocked while this holds.
pub async fn client_has_open_rentals(
    exec: impl PgExecutor<'_>,
    client_id: i64,
) -> Result<bool, sqlx::Error> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM rentals WHERE client_id = $1 AND status = 'active')",
    )
    .bind(client_id)
    .fetch_one(exec)
    .await?;
    Ok(exists)
}

/// Listing filters for clients.
#[derive(Debug, Default)]
pub struct ClientFilter {
    pub active: Option<bool>,
    pub search: Option<String>,
}

pub async fn list_clients(
    pool: &PgPool,
    filter: &ClientFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ClientRow>, sqlx::Error> {
    let mut qb = QueryBuilder::new(format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE 1=1"));
    if let Some(active) = filter.active {
        qb.push(" AND active = ").push_bind(active);
    }
    if let Some(search) = &filter.search {
        qb.push(" AND name ILIKE ")
            .push_bind(format!("%{search}%"));
    }
    qb.push(" ORDER BY name ASC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as().fetch_all(pool).await
}

pub async fn count_clients(pool: &PgPool, filter: &ClientFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM clients WHERE 1=1");
    if let Some(active) = filter.active {
        qb.push(" AND active = ").push_bind(active);
    }
    if let Some(search) = &filter.search {
        qb.push(" AND name ILIKE ")
            .push_bind(format!("%{search}%"));
    }

    let (count,): (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(count)
}

/// Shorthand for a typed not-found error.
pub fn client_not_found(id: i64) -> atelier_engine::Error {
    atelier_engine::Error::NotFound {
        entity: EntityKind::Client,
        id: id.to_string(),
    }
}
