//! The offline reconciler.
//!
//! One logical actor per device: it decides online/offline, passes writes
//! through to the ledger or queues them, and drains the queue on
//! reconnect. Exactly one drain runs at a time; replay is sequential so a
//! create always lands before a later update to the same record.

use crate::error::{ApiFailure, ClientError, Result};
use crate::transport::LedgerApi;
use atelier_engine::{
    Connectivity, DrainReport, DrainState, EntityKey, EntityKind, Mirror, MirrorRecord,
    MirrorSnapshot, MutationOp, MutationQueue, NewRental, PendingMutation, Rental, RentalPatch,
    ReplayFailure, Transition,
};
use tokio::sync::Mutex;

/// Outcome of a dispatched write.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    /// The ledger applied the write; the mirror holds the authoritative
    /// record.
    Applied(Rental),
    /// The ledger acknowledged a cancel.
    Cancelled,
    /// The write was queued for replay and applied optimistically to the
    /// mirror. For creates, `key` is the temporary record id.
    Queued { key: EntityKey },
}

struct Inner {
    mirror: Mirror,
    queue: MutationQueue,
    conn: Connectivity,
}

/// Client-side coordinator between the local mirror and the remote ledger.
pub struct Reconciler<A: LedgerApi> {
    api: A,
    device_id: String,
    inner: Mutex<Inner>,
    /// Held for the duration of a drain; `try_lock` coalesces re-entrant
    /// triggers instead of running two drains.
    drain_gate: Mutex<()>,
}

impl<A: LedgerApi> Reconciler<A> {
    /// Start with an empty mirror and queue. The reconciler is offline
    /// until the first probe succeeds.
    pub fn new(api: A, device_id: impl Into<String>) -> Self {
        Self {
            api,
            device_id: device_id.into(),
            inner: Mutex::new(Inner {
                mirror: Mirror::new(),
                queue: MutationQueue::new(),
                conn: Connectivity::new(),
            }),
            drain_gate: Mutex::new(()),
        }
    }

    /// Restore mirror and queue from a persisted snapshot.
    pub async fn restore(&self, snapshot: MirrorSnapshot) -> Result<()> {
        let (mirror, queue) = snapshot
            .restore(&self.device_id)
            .map_err(|e| ClientError::Payload(e.to_string()))?;
        let mut inner = self.inner.lock().await;
        inner.mirror = mirror;
        inner.queue = queue;
        Ok(())
    }

    /// Capture mirror and queue for durable storage.
    pub async fn snapshot(&self) -> MirrorSnapshot {
        let inner = self.inner.lock().await;
        MirrorSnapshot::capture(&self.device_id, &inner.mirror, &inner.queue)
    }

    pub async fn is_online(&self) -> bool {
        self.inner.lock().await.conn.is_online()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// Mirror records for a collection (cloned snapshot).
    pub async fn records(&self, entity: EntityKind) -> Vec<MirrorRecord> {
        self.inner
            .lock()
            .await
            .mirror
            .records(entity)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Bookings the server refused at replay time, awaiting user action.
    pub async fn unresolved_conflicts(&self, entity: EntityKind) -> Vec<MirrorRecord> {
        self.inner
            .lock()
            .await
            .mirror
            .conflicts(entity)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Run an active probe and react to the resulting transition. Returns
    /// the drain report when the probe brought us online.
    pub async fn probe_and_sync(&self) -> Result<Option<DrainReport>> {
        let outcome = self.api.probe().await;
        let transition = self.inner.lock().await.conn.record_probe(outcome);
        match transition {
            Some(Transition::WentOnline) => {
                tracing::info!("connectivity restored, draining mutation queue");
                self.drain().await
            }
            Some(Transition::WentOffline) => {
                tracing::warn!("ledger unreachable, queueing writes locally");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// A runtime connectivity event fired. The event itself is not
    /// trusted; it only triggers a re-probe.
    pub async fn connectivity_hint(&self) -> Result<Option<DrainReport>> {
        self.probe_and_sync().await
    }

    /// Create a rental: pass through when online, queue when not.
    pub async fn create_rental(&self, rental: NewRental) -> Result<DispatchResult> {
        let mutation_id = uuid::Uuid::new_v4().to_string();

        if self.is_online().await {
            match self.api.create_rental(&rental, &mutation_id).await {
                Ok(created) => {
                    let mut inner = self.inner.lock().await;
                    inner
                        .mirror
                        .apply_authoritative(EntityKind::Rental, serde_json::to_value(&created)?);
                    return Ok(DispatchResult::Applied(created));
                }
                Err(ApiFailure::Transport(detail)) => {
                    tracing::warn!(%detail, "create failed at transport, queueing offline");
                    self.inner.lock().await.conn.record_transport_failure();
                    // fall through to the offline path: the write is never lost
                }
                Err(ApiFailure::Rejected { status, message }) => {
                    return Err(ClientError::Rejected { status, message });
                }
            }
        }

        let payload = serde_json::to_value(&rental)?;
        let target = PendingMutation::temp_key(&mutation_id);
        let mut inner = self.inner.lock().await;
        let mutation = inner
            .queue
            .push(
                mutation_id,
                MutationOp::Create,
                EntityKind::Rental,
                target.clone(),
                Some(payload),
                chrono::Utc::now(),
            )
            .clone();
        inner.mirror.apply_local_mutation(&mutation);
        Ok(DispatchResult::Queued { key: target })
    }

    /// Patch a rental. Updates to a record whose create has not been
    /// acknowledged yet always queue behind it.
    pub async fn update_rental(&self, key: EntityKey, patch: RentalPatch) -> Result<DispatchResult> {
        let mutation_id = uuid::Uuid::new_v4().to_string();

        if let (Some(id), true) = (key.server_id(), self.is_online().await) {
            match self.api.update_rental(id, &patch, &mutation_id).await {
                Ok(updated) => {
                    let mut inner = self.inner.lock().await;
                    inner
                        .mirror
                        .apply_authoritative(EntityKind::Rental, serde_json::to_value(&updated)?);
                    return Ok(DispatchResult::Applied(updated));
                }
                Err(ApiFailure::Transport(detail)) => {
                    tracing::warn!(%detail, "update failed at transport, queueing offline");
                    self.inner.lock().await.conn.record_transport_failure();
                }
                Err(ApiFailure::Rejected { status, message }) => {
                    return Err(ClientError::Rejected { status, message });
                }
            }
        }

        let payload = serde_json::to_value(&patch)?;
        let mut inner = self.inner.lock().await;
        let mutation = inner
            .queue
            .push(
                mutation_id,
                MutationOp::Update,
                EntityKind::Rental,
                key.clone(),
                Some(payload),
                chrono::Utc::now(),
            )
            .clone();
        inner.mirror.apply_local_mutation(&mutation);
        Ok(DispatchResult::Queued { key })
    }

    /// Cancel a rental.
    pub async fn cancel_rental(&self, key: EntityKey) -> Result<DispatchResult> {
        let mutation_id = uuid::Uuid::new_v4().to_string();

        if let (Some(id), true) = (key.server_id(), self.is_online().await) {
            match self.api.cancel_rental(id, &mutation_id).await {
                Ok(()) => {
                    let mut inner = self.inner.lock().await;
                    inner.mirror.remove(EntityKind::Rental, &key);
                    return Ok(DispatchResult::Cancelled);
                }
                Err(ApiFailure::Transport(detail)) => {
                    tracing::warn!(%detail, "cancel failed at transport, queueing offline");
                    self.inner.lock().await.conn.record_transport_failure();
                }
                Err(ApiFailure::Rejected { status, message }) => {
                    return Err(ClientError::Rejected { status, message });
                }
            }
        }

        let mut inner = self.inner.lock().await;
        let mutation = inner
            .queue
            .push(
                mutation_id,
                MutationOp::Delete,
                EntityKind::Rental,
                key.clone(),
                None,
                chrono::Utc::now(),
            )
            .clone();
        inner.mirror.apply_local_mutation(&mutation);
        Ok(DispatchResult::Queued { key })
    }

    /// Drain the mutation queue against the ledger in FIFO order.
    ///
    /// Returns `Ok(None)` when another drain is already running (the
    /// trigger is coalesced). Failed mutations stay queued; causal
    /// dependents are held back for the next cycle; a transport failure
    /// stops the cycle after the in-flight call.
    pub async fn drain(&self) -> Result<Option<DrainReport>> {
        let Ok(_gate) = self.drain_gate.try_lock() else {
            tracing::debug!("drain already in progress, coalescing trigger");
            return Ok(None);
        };

        let mut report = DrainReport::default();
        let mut state = DrainState::new();
        let pending = self.inner.lock().await.queue.snapshot();

        for mutation in pending {
            if !self.is_online().await {
                report.interrupted = true;
                break;
            }
            if state.should_skip(&mutation) {
                tracing::debug!(local_id = %mutation.local_id, "skipping dependent of failed mutation");
                report.skipped.push(mutation.local_id.clone());
                continue;
            }

            match self.replay(&mutation).await {
                Ok(()) => report.replayed.push(mutation.local_id.clone()),
                Err(ApiFailure::Transport(detail)) => {
                    tracing::warn!(%detail, "transport dropped mid-drain, stopping cycle");
                    self.inner.lock().await.conn.record_transport_failure();
                    report.failed.push(ReplayFailure {
                        local_id: mutation.local_id.clone(),
                        entity: mutation.entity,
                        target: mutation.target.clone(),
                        reason: detail,
                        conflict: false,
                    });
                    report.interrupted = true;
                    break;
                }
                Err(failure @ ApiFailure::Rejected { .. }) => {
                    let conflict = failure.is_conflict();
                    tracing::warn!(
                        local_id = %mutation.local_id,
                        %failure,
                        conflict,
                        "replay rejected, mutation stays queued"
                    );
                    if conflict {
                        self.inner
                            .lock()
                            .await
                            .mirror
                            .mark_conflict(mutation.entity, &mutation.target);
                    }
                    state.record_failure(&mutation);
                    report.failed.push(ReplayFailure {
                        local_id: mutation.local_id.clone(),
                        entity: mutation.entity,
                        target: mutation.target.clone(),
                        reason: failure.to_string(),
                        conflict,
                    });
                }
            }
        }

        if !report.interrupted {
            self.pull_all().await;
        }

        if !report.is_clean() {
            tracing::warn!(
                replayed = report.replayed.len(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                interrupted = report.interrupted,
                "drain finished with unresolved work"
            );
        }
        Ok(Some(report))
    }

    /// Replay one queued mutation and fold the acknowledgement into the
    /// mirror and queue.
    async fn replay(&self, mutation: &PendingMutation) -> std::result::Result<(), ApiFailure> {
        match mutation.op {
            MutationOp::Create => {
                let rental: NewRental = decode(mutation.payload.as_ref())?;
                let created = self.api.create_rental(&rental, &mutation.local_id).await?;

                let mut inner = self.inner.lock().await;
                inner.queue.acknowledge(&mutation.local_id);
                if mutation.target.is_temp() {
                    // Later queued mutations on this record must land on
                    // the server id, never the stale temp id.
                    inner
                        .queue
                        .remap_key(mutation.entity, &mutation.target, created.id);
                    inner
                        .mirror
                        .remap_key(mutation.entity, &mutation.target, created.id);
                }
                let value =
                    serde_json::to_value(&created).map_err(|e| ApiFailure::Transport(e.to_string()))?;
                inner.mirror.apply_authoritative(mutation.entity, value);
                Ok(())
            }
            MutationOp::Update => {
                let Some(id) = mutation.target.server_id() else {
                    // The create this update depends on has not been acked.
                    return Err(ApiFailure::Rejected {
                        status: 409,
                        message: format!(
                            "update targets unacknowledged record {}",
                            mutation.target
                        ),
                    });
                };
                let patch: RentalPatch = decode(mutation.payload.as_ref())?;
                let updated = self.api.update_rental(id, &patch, &mutation.local_id).await?;

                let mut inner = self.inner.lock().await;
                inner.queue.acknowledge(&mutation.local_id);
                let value =
                    serde_json::to_value(&updated).map_err(|e| ApiFailure::Transport(e.to_string()))?;
                inner.mirror.apply_authoritative(mutation.entity, value);
                Ok(())
            }
            MutationOp::Delete => {
                let Some(id) = mutation.target.server_id() else {
                    return Err(ApiFailure::Rejected {
                        status: 409,
                        message: format!(
                            "cancel targets unacknowledged record {}",
                            mutation.target
                        ),
                    });
                };
                self.api.cancel_rental(id, &mutation.local_id).await?;
                let mut inner = self.inner.lock().await;
                inner.queue.acknowledge(&mutation.local_id);
                Ok(())
            }
        }
    }

    /// Post-drain reconciliation: merge the server's view of every
    /// collection into the mirror. Server records win except for ids
    /// still pending locally. Best-effort; failures are logged.
    async fn pull_all(&self) {
        for entity in [EntityKind::Garment, EntityKind::Client, EntityKind::Rental] {
            match self.api.fetch_collection(entity).await {
                Ok(records) => {
                    self.inner
                        .lock()
                        .await
                        .mirror
                        .apply_server_snapshot(entity, records);
                }
                Err(ApiFailure::Transport(detail)) => {
                    tracing::warn!(%detail, "pull failed at transport");
                    self.inner.lock().await.conn.record_transport_failure();
                    return;
                }
                Err(failure) => {
                    tracing::warn!(%entity, %failure, "pull rejected");
                }
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    payload: Option<&serde_json::Value>,
) -> std::result::Result<T, ApiFailure> {
    let value = payload.cloned().ok_or_else(|| ApiFailure::Rejected {
        status: 400,
        message: "queued mutation has no payload".to_string(),
    })?;
    serde_json::from_value(value).map_err(|e| ApiFailure::Rejected {
        status: 400,
        message: format!("queued payload no longer decodes: {e}"),
    })
}
