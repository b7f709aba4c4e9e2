//! Replay planning for the drain cycle.
//!
//! The queue is replayed in strict FIFO order, one call in flight at a
//! time. When a mutation fails, everything causally dependent on it (same
//! record, or a payload referencing its unacked temp id) is skipped for the
//! rest of the cycle and retried on the next drain. The bookkeeping here is
//! pure so the skip rules can be tested without a network.

use crate::model::{EntityKey, EntityKind};
use crate::mutation::PendingMutation;
use serde::{Deserialize, Serialize};

/// Why a replayed mutation did not land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFailure {
    pub local_id: String,
    pub entity: EntityKind,
    pub target: EntityKey,
    pub reason: String,
    /// True when the server rejected the replay with a booking conflict.
    /// These are user-visible and never auto-resolved.
    pub conflict: bool,
}

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Mutations acknowledged by the server, in replay order.
    pub replayed: Vec<String>,
    /// Mutations that failed and stay queued.
    pub failed: Vec<ReplayFailure>,
    /// Mutations skipped because a causal predecessor failed this cycle.
    pub skipped: Vec<String>,
    /// True when the cycle stopped early because connectivity dropped.
    pub interrupted: bool,
}

impl DrainReport {
    /// Conflicts that must be surfaced to the user.
    pub fn conflicts(&self) -> impl Iterator<Item = &ReplayFailure> {
        self.failed.iter().filter(|f| f.conflict)
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && !self.interrupted
    }
}

/// Tracks failures within one drain cycle to decide which later mutations
/// must be held back.
#[derive(Debug, Default)]
pub struct DrainState {
    failed: Vec<(EntityKind, EntityKey)>,
}

impl DrainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed mutation so its dependents are held back.
    pub fn record_failure(&mut self, mutation: &PendingMutation) {
        self.failed
            .push((mutation.entity, mutation.target.clone()));
    }

    /// True when `mutation` depends on a record whose earlier mutation
    /// failed this cycle.
    pub fn should_skip(&self, mutation: &PendingMutation) -> bool {
        self.failed
            .iter()
            .any(|(entity, key)| mutation.references(*entity, key))
    }
}
