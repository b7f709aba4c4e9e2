//! Client-local cache of the server's entity collections.
//!
//! The mirror is always treated as possibly stale. It has exactly one
//! writer (the reconciler) and one merge policy, implemented here so it is
//! testable in one place: server records win for any id the server knows,
//! locally pending records survive until their replay is acknowledged.

use crate::model::{EntityKey, EntityKind};
use crate::mutation::{MutationOp, PendingMutation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cached record plus its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRecord {
    pub key: EntityKey,
    pub value: serde_json::Value,
    /// Set while a queued mutation for this record awaits replay.
    #[serde(default)]
    pub pending_sync: bool,
    /// Set when a replay was rejected with a booking conflict; the record
    /// stays visible until the user resolves it.
    #[serde(default)]
    pub conflict: bool,
}

impl MirrorRecord {
    fn server(key: EntityKey, value: serde_json::Value) -> Self {
        Self {
            key,
            value,
            pending_sync: false,
            conflict: false,
        }
    }
}

/// Typed key-value cache of entity collections.
///
/// Collections are keyed by entity kind; records by their id rendered as a
/// string (server ids and temp ids share one keyspace).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mirror {
    collections: BTreeMap<String, BTreeMap<String, MirrorRecord>>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection_mut(&mut self, entity: EntityKind) -> &mut BTreeMap<String, MirrorRecord> {
        self.collections
            .entry(entity.collection().to_string())
            .or_default()
    }

    pub fn get(&self, entity: EntityKind, key: &EntityKey) -> Option<&MirrorRecord> {
        self.collections
            .get(entity.collection())?
            .get(&key.to_string())
    }

    /// All records of a collection in key order.
    pub fn records(&self, entity: EntityKind) -> Vec<&MirrorRecord> {
        self.collections
            .get(entity.collection())
            .map(|c| c.values().collect())
            .unwrap_or_default()
    }

    /// Records still flagged as awaiting replay.
    pub fn pending_records(&self, entity: EntityKind) -> Vec<&MirrorRecord> {
        self.records(entity)
            .into_iter()
            .filter(|r| r.pending_sync)
            .collect()
    }

    /// Upsert an authoritative record returned by a successful server call.
    /// Clears any pending/conflict flags for that id.
    pub fn apply_authoritative(&mut self, entity: EntityKind, value: serde_json::Value) {
        if let Some(key) = record_key(&value) {
            self.collection_mut(entity)
                .insert(key.to_string(), MirrorRecord::server(key, value));
        }
    }

    /// Merge a full server snapshot of one collection.
    ///
    /// Server records replace everything except records still flagged
    /// pending: those are preserved even when absent from the server
    /// response, so an unreplayed write is never lost to a pull.
    pub fn apply_server_snapshot(&mut self, entity: EntityKind, records: Vec<serde_json::Value>) {
        let collection = self.collection_mut(entity);
        let kept: Vec<MirrorRecord> = collection
            .values()
            .filter(|r| r.pending_sync || r.conflict)
            .cloned()
            .collect();

        collection.clear();
        for value in records {
            if let Some(key) = record_key(&value) {
                collection.insert(key.to_string(), MirrorRecord::server(key, value));
            }
        }
        // Locally pending records win over the snapshot for their own id.
        for record in kept {
            collection.insert(record.key.to_string(), record);
        }
    }

    /// Optimistically apply a queued mutation to the cache.
    ///
    /// Creates insert the payload under the mutation's temp key; updates
    /// shallow-merge object fields; deletes remove the record. Every touched
    /// record is flagged pending until the replay is acknowledged.
    pub fn apply_local_mutation(&mut self, mutation: &PendingMutation) {
        let collection = self.collection_mut(mutation.entity);
        let key = mutation.target.to_string();

        match mutation.op {
            MutationOp::Create => {
                let mut value = mutation
                    .payload
                    .clone()
                    .unwrap_or(serde_json::Value::Object(Default::default()));
                if let serde_json::Value::Object(map) = &mut value {
                    map.insert("id".to_string(), serde_json::json!(key));
                }
                collection.insert(
                    key,
                    MirrorRecord {
                        key: mutation.target.clone(),
                        value,
                        pending_sync: true,
                        conflict: false,
                    },
                );
            }
            MutationOp::Update => {
                if let Some(record) = collection.get_mut(&key) {
                    if let (
                        serde_json::Value::Object(existing),
                        Some(serde_json::Value::Object(patch)),
                    ) = (&mut record.value, &mutation.payload)
                    {
                        for (field, value) in patch {
                            existing.insert(field.clone(), value.clone());
                        }
                    }
                    record.pending_sync = true;
                }
            }
            MutationOp::Delete => {
                collection.remove(&key);
            }
        }
    }

    /// Drop a record, e.g. after the server acknowledged a cancel.
    pub fn remove(&mut self, entity: EntityKind, key: &EntityKey) {
        self.collection_mut(entity).remove(&key.to_string());
    }

    /// Clear the pending flag once the server acknowledged the replay.
    pub fn acknowledge(&mut self, entity: EntityKind, key: &EntityKey) {
        if let Some(record) = self.collection_mut(entity).get_mut(&key.to_string()) {
            record.pending_sync = false;
            record.conflict = false;
        }
    }

    /// Flag a record whose replay was rejected with a booking conflict.
    pub fn mark_conflict(&mut self, entity: EntityKind, key: &EntityKey) {
        if let Some(record) = self.collection_mut(entity).get_mut(&key.to_string()) {
            record.conflict = true;
        }
    }

    /// Records currently flagged as unresolved conflicts.
    pub fn conflicts(&self, entity: EntityKind) -> Vec<&MirrorRecord> {
        self.records(entity)
            .into_iter()
            .filter(|r| r.conflict)
            .collect()
    }

    /// Move a record from its temp key to the server-assigned id, rewriting
    /// the embedded id field.
    pub fn remap_key(&mut self, entity: EntityKind, temp: &EntityKey, server_id: i64) {
        let collection = self.collection_mut(entity);
        if let Some(mut record) = collection.remove(&temp.to_string()) {
            record.key = EntityKey::Server(server_id);
            if let serde_json::Value::Object(map) = &mut record.value {
                map.insert("id".to_string(), serde_json::json!(server_id));
            }
            collection.insert(server_id.to_string(), record);
        }
    }

    /// Raw collection map, used by snapshots.
    pub(crate) fn collections(&self) -> &BTreeMap<String, BTreeMap<String, MirrorRecord>> {
        &self.collections
    }

    pub(crate) fn from_collections(
        collections: BTreeMap<String, BTreeMap<String, MirrorRecord>>,
    ) -> Self {
        Self { collections }
    }
}

/// Extract the record key from a JSON value's `id` field.
fn record_key(value: &serde_json::Value) -> Option<EntityKey> {
    match value.get("id")? {
        serde_json::Value::Number(n) => n.as_i64().map(EntityKey::Server),
        serde_json::Value::String(s) => Some(EntityKey::Temp(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn create_mutation(local_id: &str, payload: serde_json::Value) -> PendingMutation {
        PendingMutation {
            local_id: local_id.to_string(),
            seq: 0,
            op: MutationOp::Create,
            entity: EntityKind::Rental,
            target: PendingMutation::temp_key(local_id),
            payload: Some(payload),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn server_snapshot_replaces_stale_records() {
        let mut mirror = Mirror::new();
        mirror.apply_server_snapshot(
            EntityKind::Rental,
            vec![json!({"id": 1, "status": "active"})],
        );
        mirror.apply_server_snapshot(
            EntityKind::Rental,
            vec![json!({"id": 1, "status": "completed"}), json!({"id": 2})],
        );

        let records = mirror.records(EntityKind::Rental);
        assert_eq!(records.len(), 2);
        let r1 = mirror
            .get(EntityKind::Rental, &EntityKey::Server(1))
            .unwrap();
        assert_eq!(r1.value["status"], "completed");
    }

    #[test]
    fn snapshot_preserves_pending_records() {
        let mut mirror = Mirror::new();
        let m = create_mutation("m-1", json!({"garmentId": 3}));
        mirror.apply_local_mutation(&m);

        // Server pull that knows nothing about the unreplayed create.
        mirror.apply_server_snapshot(EntityKind::Rental, vec![json!({"id": 10})]);

        let pending = mirror.pending_records(EntityKind::Rental);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, PendingMutation::temp_key("m-1"));
        assert!(mirror
            .get(EntityKind::Rental, &EntityKey::Server(10))
            .is_some());
    }

    #[test]
    fn optimistic_create_assigns_temp_id() {
        let mut mirror = Mirror::new();
        let m = create_mutation("m-1", json!({"garmentId": 3}));
        mirror.apply_local_mutation(&m);

        let record = mirror.get(EntityKind::Rental, &m.target).unwrap();
        assert!(record.pending_sync);
        assert_eq!(record.value["id"], json!("tmp-m-1"));
        assert_eq!(record.value["garmentId"], json!(3));
    }

    #[test]
    fn optimistic_update_merges_fields() {
        let mut mirror = Mirror::new();
        mirror.apply_server_snapshot(
            EntityKind::Rental,
            vec![json!({"id": 5, "status": "active", "notes": "x"})],
        );

        let m = PendingMutation {
            local_id: "m-2".into(),
            seq: 1,
            op: MutationOp::Update,
            entity: EntityKind::Rental,
            target: EntityKey::Server(5),
            payload: Some(json!({"notes": "steamed"})),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        };
        mirror.apply_local_mutation(&m);

        let record = mirror
            .get(EntityKind::Rental, &EntityKey::Server(5))
            .unwrap();
        assert!(record.pending_sync);
        assert_eq!(record.value["notes"], "steamed");
        assert_eq!(record.value["status"], "active");
    }

    #[test]
    fn delete_removes_record() {
        let mut mirror = Mirror::new();
        mirror.apply_server_snapshot(EntityKind::Rental, vec![json!({"id": 5})]);

        let m = PendingMutation {
            local_id: "m-3".into(),
            seq: 2,
            op: MutationOp::Delete,
            entity: EntityKind::Rental,
            target: EntityKey::Server(5),
            payload: None,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        };
        mirror.apply_local_mutation(&m);
        assert!(mirror
            .get(EntityKind::Rental, &EntityKey::Server(5))
            .is_none());
    }

    #[test]
    fn remap_moves_temp_record_to_server_id() {
        let mut mirror = Mirror::new();
        let m = create_mutation("m-1", json!({"garmentId": 3}));
        mirror.apply_local_mutation(&m);

        mirror.remap_key(EntityKind::Rental, &m.target, 42);

        assert!(mirror.get(EntityKind::Rental, &m.target).is_none());
        let record = mirror
            .get(EntityKind::Rental, &EntityKey::Server(42))
            .unwrap();
        assert_eq!(record.value["id"], json!(42));
        assert!(record.pending_sync);
    }

    #[test]
    fn acknowledge_clears_flags() {
        let mut mirror = Mirror::new();
        let m = create_mutation("m-1", json!({}));
        mirror.apply_local_mutation(&m);
        mirror.mark_conflict(EntityKind::Rental, &m.target);
        assert_eq!(mirror.conflicts(EntityKind::Rental).len(), 1);

        mirror.acknowledge(EntityKind::Rental, &m.target);
        let record = mirror.get(EntityKind::Rental, &m.target).unwrap();
        assert!(!record.pending_sync);
        assert!(!record.conflict);
        assert!(mirror.conflicts(EntityKind::Rental).is_empty());
    }

    #[test]
    fn conflict_survives_server_snapshot() {
        let mut mirror = Mirror::new();
        let m = create_mutation("m-1", json!({"garmentId": 3}));
        mirror.apply_local_mutation(&m);
        mirror.mark_conflict(EntityKind::Rental, &m.target);

        mirror.apply_server_snapshot(EntityKind::Rental, vec![json!({"id": 1})]);

        // The conflicted booking must stay visible, not silently vanish.
        assert_eq!(mirror.conflicts(EntityKind::Rental).len(), 1);
    }

    #[test]
    fn authoritative_upsert_clears_pending() {
        let mut mirror = Mirror::new();
        let m = create_mutation("m-1", json!({}));
        mirror.apply_local_mutation(&m);

        mirror.apply_authoritative(EntityKind::Rental, json!({"id": 9, "status": "active"}));
        let record = mirror
            .get(EntityKind::Rental, &EntityKey::Server(9))
            .unwrap();
        assert!(!record.pending_sync);
    }
}
