//! # Atelier Engine
//!
//! Core logic for the Atelier rental ledger and its offline-first client.
//!
//! This crate has no IO: it holds the shared data model, the booking
//! interval semantics, and the client-side offline machinery (mirror
//! cache, mutation queue, connectivity state machine, drain planning).
//! The server and the HTTP client build on it; all of it is testable
//! without a network or a database.
//!
//! ## Core Concepts
//!
//! ### Rentals and conflicts
//!
//! A [`Rental`] books one [`Garment`] for a [`TimeRange`]. For a given
//! garment, active rentals must never overlap. [`TimeRange::overlaps`]
//! is the single definition of "overlap" used everywhere (inclusive
//! boundaries: touching endpoints conflict).
//!
//! ### Offline writes
//!
//! Writes made while disconnected become [`PendingMutation`]s in a
//! [`MutationQueue`] and are applied optimistically to the [`Mirror`].
//! On reconnect they are replayed in FIFO order; [`DrainState`] decides
//! which mutations must be held back after a failure, and a
//! [`DrainReport`] tells the user what happened, including bookings the
//! server could no longer honor.
//!
//! ### Persistence
//!
//! [`MirrorSnapshot`] captures mirror plus queue as deterministic JSON
//! for the device's durable storage.

pub mod connectivity;
pub mod drain;
pub mod envelope;
pub mod error;
pub mod interval;
pub mod mirror;
pub mod model;
pub mod mutation;
pub mod snapshot;

pub use connectivity::{ConnState, Connectivity, ProbeOutcome, Transition};
pub use drain::{DrainReport, DrainState, ReplayFailure};
pub use envelope::{ApiResponse, Pagination};
pub use error::{Error, Result};
pub use interval::TimeRange;
pub use mirror::{Mirror, MirrorRecord};
pub use model::{
    Client, ClientPatch, EntityKey, EntityKind, Garment, GarmentPatch, GarmentStatus, NewClient,
    NewGarment, NewRental, Rental, RentalPatch, RentalStatus, UNASSIGNED_CLIENT,
};
pub use mutation::{MutationOp, MutationQueue, PendingMutation};
pub use snapshot::{MirrorSnapshot, SNAPSHOT_FORMAT_VERSION};
