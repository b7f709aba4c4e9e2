//! Shared data model for the rental ledger.
//!
//! These types are the wire contract between the server and the offline
//! client. Wire names are camelCase; status values are snake_case strings
//! to match the persisted representation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity collections the ledger owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Garment,
    Client,
    Rental,
}

impl EntityKind {
    /// Collection name used as the storage key for this entity kind.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Garment => "garments",
            EntityKind::Client => "clients",
            EntityKind::Rental => "rentals",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Garment => "garment",
            EntityKind::Client => "client",
            EntityKind::Rental => "rental",
        };
        f.write_str(name)
    }
}

/// Identifier for a record as seen by the client.
///
/// Server-assigned ids are numeric. Records created while offline carry a
/// client-generated temporary id until the create is acknowledged and the
/// id is remapped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    Server(i64),
    Temp(String),
}

impl EntityKey {
    /// True while the record has not yet been assigned a server id.
    pub fn is_temp(&self) -> bool {
        matches!(self, EntityKey::Temp(_))
    }

    /// The server id, if this key has one.
    pub fn server_id(&self) -> Option<i64> {
        match self {
            EntityKey::Server(id) => Some(*id),
            EntityKey::Temp(_) => None,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Server(id) => write!(f, "{id}"),
            EntityKey::Temp(t) => f.write_str(t),
        }
    }
}

impl From<i64> for EntityKey {
    fn from(id: i64) -> Self {
        EntityKey::Server(id)
    }
}

/// Garment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarmentStatus {
    Available,
    Rented,
    Maintenance,
    OutOfService,
}

impl GarmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GarmentStatus::Available => "available",
            GarmentStatus::Rented => "rented",
            GarmentStatus::Maintenance => "maintenance",
            GarmentStatus::OutOfService => "out_of_service",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(GarmentStatus::Available),
            "rented" => Some(GarmentStatus::Rented),
            "maintenance" => Some(GarmentStatus::Maintenance),
            "out_of_service" => Some(GarmentStatus::OutOfService),
            _ => None,
        }
    }
}

impl fmt::Display for GarmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rental lifecycle status. Rentals start active; completed, expired and
/// cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl RentalStatus {
    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RentalStatus::Active)
    }

    /// Transitions into these states hand the garment back.
    pub fn frees_garment(&self) -> bool {
        matches!(self, RentalStatus::Completed | RentalStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Active => "active",
            RentalStatus::Completed => "completed",
            RentalStatus::Expired => "expired",
            RentalStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RentalStatus::Active),
            "completed" => Some(RentalStatus::Completed),
            "expired" => Some(RentalStatus::Expired),
            "cancelled" => Some(RentalStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rentable physical item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Garment {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: GarmentStatus,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A renter. Optional on a rental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Display name used when a rental has no assigned client.
pub const UNASSIGNED_CLIENT: &str = "Unassigned";

/// A time-bounded booking of one garment, joined with display names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rental {
    pub id: i64,
    pub garment_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: RentalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Denormalized client name, `"Unassigned"` when no client is set.
    #[serde(default)]
    pub client_name: String,
    /// Denormalized garment name.
    #[serde(default)]
    pub garment_name: String,
}

/// Payload for creating a garment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGarment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Defaults to `available`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GarmentStatus>,
}

/// Partial update for a garment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GarmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GarmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Payload for creating a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Partial update for a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Payload for creating a rental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRental {
    pub garment_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Partial update for a rental. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RentalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RentalPatch {
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.end_time.is_none()
            && self.status.is_none()
            && self.cost.is_none()
            && self.notes.is_none()
    }
}
