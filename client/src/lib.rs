//! # Atelier Client
//!
//! Offline-capable client for the Atelier rental ledger.
//!
//! [`Reconciler`] wraps the engine's mirror and mutation queue and drives
//! them against the ledger's REST API: writes pass straight through while
//! online, queue while offline, and replay in order on reconnect. The
//! network sits behind the [`LedgerApi`] trait; [`HttpLedger`] is the
//! reqwest implementation and tests use in-process fakes.

pub mod error;
pub mod reconciler;
pub mod transport;

pub use error::{ApiFailure, ClientError, Result};
pub use reconciler::{DispatchResult, Reconciler};
pub use transport::{
    HttpLedger, LedgerApi, DEFAULT_PROBE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, IDEMPOTENCY_HEADER,
};
