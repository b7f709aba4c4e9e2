//! The durable queue of writes made while offline.
//!
//! Mutations are appended in the order the user issued them and replayed in
//! that same order. An entry leaves the queue only once the server has
//! acknowledged its replay; failures keep the entry queued for the next
//! drain cycle.

use crate::model::{EntityKey, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of write a queued mutation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

/// A locally applied write awaiting server acknowledgement.
///
/// `local_id` doubles as the idempotency key sent with the replayed call,
/// so a crash between server-ack and queue removal cannot double-apply the
/// write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Client-generated unique id for this mutation.
    pub local_id: String,
    /// Position in the device-local total order.
    pub seq: u64,
    pub op: MutationOp,
    pub entity: EntityKind,
    /// Target record. Temporary for creates until the replay is acked.
    pub target: EntityKey,
    /// Request body for create/update; absent for delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl PendingMutation {
    /// Temporary record key derived from a mutation id.
    pub fn temp_key(local_id: &str) -> EntityKey {
        EntityKey::Temp(format!("tmp-{local_id}"))
    }

    /// True when this mutation references `key` either as its target or
    /// inside its payload (`garmentId`/`clientId` fields).
    pub fn references(&self, entity: EntityKind, key: &EntityKey) -> bool {
        if self.entity == entity && self.target == *key {
            return true;
        }
        if let (EntityKey::Temp(temp), Some(payload)) = (key, &self.payload) {
            for field in ["garmentId", "clientId"] {
                if payload.get(field).and_then(|v| v.as_str()) == Some(temp.as_str()) {
                    return true;
                }
            }
        }
        false
    }
}

/// Ordered, serializable queue of pending mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationQueue {
    items: Vec<PendingMutation>,
    next_seq: u64,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation, assigning it the next sequence number.
    pub fn push(
        &mut self,
        local_id: impl Into<String>,
        op: MutationOp,
        entity: EntityKind,
        target: EntityKey,
        payload: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> &PendingMutation {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push(PendingMutation {
            local_id: local_id.into(),
            seq,
            op,
            entity,
            target,
            payload,
            created_at,
        });
        self.items.last().expect("just pushed")
    }

    /// Mutations in replay order (FIFO by sequence number).
    pub fn iter(&self) -> impl Iterator<Item = &PendingMutation> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, local_id: &str) -> Option<&PendingMutation> {
        self.items.iter().find(|m| m.local_id == local_id)
    }

    /// Remove an acknowledged mutation. Returns it if it was present.
    pub fn acknowledge(&mut self, local_id: &str) -> Option<PendingMutation> {
        let idx = self.items.iter().position(|m| m.local_id == local_id)?;
        Some(self.items.remove(idx))
    }

    /// Rewrite every reference to a temporary key with the server-assigned
    /// id. Applied to later queued mutations after a create replay is
    /// acked, so they land on the real record.
    pub fn remap_key(&mut self, entity: EntityKind, temp: &EntityKey, server_id: i64) {
        let EntityKey::Temp(temp_str) = temp else {
            return;
        };
        for m in &mut self.items {
            if m.entity == entity && m.target == *temp {
                m.target = EntityKey::Server(server_id);
            }
            if let Some(payload) = &mut m.payload {
                for field in ["garmentId", "clientId"] {
                    if payload.get(field).and_then(|v| v.as_str()) == Some(temp_str.as_str()) {
                        payload[field] = serde_json::json!(server_id);
                    }
                }
            }
        }
    }

    /// Clone of the queue contents, for drain planning.
    pub fn snapshot(&self) -> Vec<PendingMutation> {
        self.items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn push_assigns_increasing_seq() {
        let mut queue = MutationQueue::new();
        queue.push(
            "m-1",
            MutationOp::Create,
            EntityKind::Rental,
            PendingMutation::temp_key("m-1"),
            Some(json!({"garmentId": 1})),
            ts(),
        );
        queue.push(
            "m-2",
            MutationOp::Update,
            EntityKind::Rental,
            PendingMutation::temp_key("m-1"),
            Some(json!({"notes": "fitted"})),
            ts(),
        );

        let seqs: Vec<u64> = queue.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn acknowledge_removes_only_target() {
        let mut queue = MutationQueue::new();
        queue.push(
            "m-1",
            MutationOp::Create,
            EntityKind::Rental,
            PendingMutation::temp_key("m-1"),
            None,
            ts(),
        );
        queue.push(
            "m-2",
            MutationOp::Delete,
            EntityKind::Rental,
            EntityKey::Server(4),
            None,
            ts(),
        );

        let removed = queue.acknowledge("m-1").unwrap();
        assert_eq!(removed.local_id, "m-1");
        assert_eq!(queue.len(), 1);
        assert!(queue.acknowledge("m-1").is_none());
    }

    #[test]
    fn remap_rewrites_targets_and_payload_refs() {
        let mut queue = MutationQueue::new();
        let temp = PendingMutation::temp_key("m-1");
        // An update queued against the temp id of an unacked create.
        queue.push(
            "m-2",
            MutationOp::Update,
            EntityKind::Rental,
            temp.clone(),
            Some(json!({"notes": "hemmed"})),
            ts(),
        );
        // A rental create whose payload references an offline-created garment.
        let garment_temp = PendingMutation::temp_key("g-1");
        queue.push(
            "m-3",
            MutationOp::Create,
            EntityKind::Rental,
            PendingMutation::temp_key("m-3"),
            Some(json!({"garmentId": "tmp-g-1"})),
            ts(),
        );

        queue.remap_key(EntityKind::Rental, &temp, 77);
        assert_eq!(queue.get("m-2").unwrap().target, EntityKey::Server(77));

        queue.remap_key(EntityKind::Garment, &garment_temp, 5);
        let payload = queue.get("m-3").unwrap().payload.as_ref().unwrap();
        assert_eq!(payload["garmentId"], json!(5));
    }

    #[test]
    fn references_detects_target_and_payload() {
        let temp = PendingMutation::temp_key("m-1");
        let m = PendingMutation {
            local_id: "m-2".into(),
            seq: 1,
            op: MutationOp::Update,
            entity: EntityKind::Rental,
            target: temp.clone(),
            payload: None,
            created_at: ts(),
        };
        assert!(m.references(EntityKind::Rental, &temp));
        assert!(!m.references(EntityKind::Garment, &temp));

        let garment_temp = PendingMutation::temp_key("g-9");
        let m = PendingMutation {
            local_id: "m-3".into(),
            seq: 2,
            op: MutationOp::Create,
            entity: EntityKind::Rental,
            target: PendingMutation::temp_key("m-3"),
            payload: Some(json!({"garmentId": "tmp-g-9"})),
            created_at: ts(),
        };
        assert!(m.references(EntityKind::Garment, &garment_temp));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut queue = MutationQueue::new();
        queue.push(
            "m-1",
            MutationOp::Create,
            EntityKind::Rental,
            PendingMutation::temp_key("m-1"),
            Some(json!({"garmentId": 3})),
            ts(),
        );

        let json = serde_json::to_string(&queue).unwrap();
        assert!(json.contains("\"op\":\"create\""));
        let parsed: MutationQueue = serde_json::from_str(&json).unwrap();
        assert_eq!(queue, parsed);
    }
}
