//! Snapshot types for persisting and restoring the client-side state.
//!
//! A snapshot is the bridge between the in-memory mirror/queue and the
//! device's durable storage. BTreeMaps keep serialization deterministic.

use crate::error::{Error, Result};
use crate::mirror::{Mirror, MirrorRecord};
use crate::mutation::MutationQueue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for forward compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time capture of the mirror and the mutation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSnapshot {
    pub format_version: u32,
    /// Device the snapshot belongs to; snapshots never move between
    /// devices.
    pub device_id: String,
    /// Mirror collections keyed by collection name, then record key.
    pub collections: BTreeMap<String, BTreeMap<String, MirrorRecord>>,
    /// The pending mutation queue, in replay order.
    pub queue: MutationQueue,
}

impl MirrorSnapshot {
    /// Capture the current state.
    pub fn capture(device_id: impl Into<String>, mirror: &Mirror, queue: &MutationQueue) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            device_id: device_id.into(),
            collections: mirror.collections().clone(),
            queue: queue.clone(),
        }
    }

    /// Restore mirror and queue, verifying format version and device id.
    pub fn restore(self, device_id: &str) -> Result<(Mirror, MutationQueue)> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.device_id != device_id {
            return Err(Error::InvalidSnapshot(format!(
                "device id mismatch: expected '{device_id}', got '{}'",
                self.device_id
            )));
        }
        Ok((Mirror::from_collections(self.collections), self.queue))
    }

    /// Serialize to JSON for the durable key-value area.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Parse a snapshot previously produced by [`MirrorSnapshot::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Total records across all collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(|c| c.len()).sum()
    }
}
