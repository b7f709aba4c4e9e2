//! Reconciler tests against an in-process fake ledger.
//!
//! The fake enforces the same booking rules as the real server (inclusive
//! overlap on active rentals per garment, idempotency keys) so the
//! replay-ordering and conflict-surfacing guarantees can be exercised
//! without a network.

use async_trait::async_trait;
use atelier_client::{ApiFailure, ClientError, DispatchResult, LedgerApi, Reconciler};
use atelier_engine::{
    EntityKey, EntityKind, NewRental, ProbeOutcome, Rental, RentalPatch, RentalStatus, TimeRange,
    UNASSIGNED_CLIENT,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
}

fn booking(garment_id: i64, start_h: u32, end_h: u32) -> NewRental {
    NewRental {
        garment_id,
        client_id: None,
        start_time: at(start_h),
        end_time: at(end_h),
        cost: None,
        notes: None,
    }
}

#[derive(Default)]
struct FakeState {
    rentals: Vec<Rental>,
    processed: HashMap<String, Rental>,
    calls: Vec<String>,
}

/// In-process stand-in for the rental ledger.
#[derive(Clone, Default)]
struct FakeLedger {
    inner: Arc<FakeInner>,
}

#[derive(Default)]
struct FakeInner {
    reachable: AtomicBool,
    next_id: AtomicI64,
    /// When >= 0, decremented per write; the write that hits zero (and all
    /// later ones) fails at the transport layer.
    fail_after: AtomicI64,
    state: Mutex<FakeState>,
    hold_create: Mutex<Option<Arc<Notify>>>,
    create_started: Arc<Notify>,
}

impl FakeLedger {
    fn new() -> Self {
        let fake = Self::default();
        fake.inner.next_id.store(1, Ordering::SeqCst);
        fake.inner.fail_after.store(-1, Ordering::SeqCst);
        fake.set_reachable(true);
        fake
    }

    fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    fn fail_writes_after(&self, calls: i64) {
        self.inner.fail_after.store(calls, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().calls.clone()
    }

    fn rentals(&self) -> Vec<Rental> {
        self.inner.state.lock().unwrap().rentals.clone()
    }

    fn check_transport(&self) -> Result<(), ApiFailure> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(ApiFailure::Transport("connection refused".into()));
        }
        let remaining = self.inner.fail_after.load(Ordering::SeqCst);
        if remaining >= 0 {
            if remaining == 0 {
                return Err(ApiFailure::Transport("connection reset".into()));
            }
            self.inner.fail_after.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerApi for FakeLedger {
    async fn probe(&self) -> ProbeOutcome {
        if self.inner.reachable.load(Ordering::SeqCst) {
            ProbeOutcome::Reachable
        } else {
            ProbeOutcome::Unreachable
        }
    }

    async fn create_rental(
        &self,
        rental: &NewRental,
        idempotency_key: &str,
    ) -> Result<Rental, ApiFailure> {
        let gate = self.inner.hold_create.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.inner.create_started.notify_one();
            gate.notified().await;
        }
        self.check_transport()?;

        let mut state = self.inner.state.lock().unwrap();
        state.calls.push(format!("create:{}", rental.garment_id));

        if let Some(previous) = state.processed.get(idempotency_key) {
            return Ok(previous.clone());
        }

        let window = TimeRange::new(rental.start_time, rental.end_time)
            .map_err(|e| ApiFailure::Rejected {
                status: 400,
                message: e.to_string(),
            })?;
        let taken: Vec<TimeRange> = state
            .rentals
            .iter()
            .filter(|r| r.garment_id == rental.garment_id && r.status == RentalStatus::Active)
            .map(|r| TimeRange::new(r.start_time, r.end_time).unwrap())
            .collect();
        if window.first_conflict(&taken).is_some() {
            return Err(ApiFailure::Rejected {
                status: 409,
                message: format!(
                    "garment {} already has an active rental overlapping the window",
                    rental.garment_id
                ),
            });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let created = Rental {
            id,
            garment_id: rental.garment_id,
            client_id: rental.client_id,
            start_time: rental.start_time,
            end_time: rental.end_time,
            status: RentalStatus::Active,
            cost: rental.cost,
            notes: rental.notes.clone(),
            created_at: at(0),
            client_name: UNASSIGNED_CLIENT.to_string(),
            garment_name: format!("garment-{}", rental.garment_id),
        };
        state.rentals.push(created.clone());
        state
            .processed
            .insert(idempotency_key.to_string(), created.clone());
        Ok(created)
    }

    async fn update_rental(
        &self,
        id: i64,
        patch: &RentalPatch,
        _idempotency_key: &str,
    ) -> Result<Rental, ApiFailure> {
        self.check_transport()?;
        let mut state = self.inner.state.lock().unwrap();
        state.calls.push(format!("update:{id}"));

        let rental = state
            .rentals
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ApiFailure::Rejected {
                status: 404,
                message: format!("rental not found: {id}"),
            })?;
        if let Some(start) = patch.start_time {
            rental.start_time = start;
        }
        if let Some(end) = patch.end_time {
            rental.end_time = end;
        }
        if let Some(status) = patch.status {
            rental.status = status;
        }
        if let Some(cost) = patch.cost {
            rental.cost = Some(cost);
        }
        if let Some(notes) = &patch.notes {
            rental.notes = Some(notes.clone());
        }
        Ok(rental.clone())
    }

    async fn cancel_rental(&self, id: i64, _idempotency_key: &str) -> Result<(), ApiFailure> {
        self.check_transport()?;
        let mut state = self.inner.state.lock().unwrap();
        state.calls.push(format!("cancel:{id}"));

        let rental = state
            .rentals
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ApiFailure::Rejected {
                status: 404,
                message: format!("rental not found: {id}"),
            })?;
        if rental.status != RentalStatus::Active {
            return Err(ApiFailure::Rejected {
                status: 400,
                message: format!("rental {id} is not active"),
            });
        }
        rental.status = RentalStatus::Cancelled;
        Ok(())
    }

    async fn fetch_collection(
        &self,
        entity: EntityKind,
    ) -> Result<Vec<serde_json::Value>, ApiFailure> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(ApiFailure::Transport("connection refused".into()));
        }
        match entity {
            EntityKind::Rental => {
                let state = self.inner.state.lock().unwrap();
                Ok(state
                    .rentals
                    .iter()
                    .map(|r| serde_json::to_value(r).unwrap())
                    .collect())
            }
            _ => Ok(vec![]),
        }
    }
}

async fn online_reconciler(api: FakeLedger) -> Reconciler<FakeLedger> {
    let reconciler = Reconciler::new(api, "device-1");
    reconciler.probe_and_sync().await.unwrap();
    assert!(reconciler.is_online().await);
    reconciler
}

#[tokio::test]
async fn online_create_passes_through() {
    let api = FakeLedger::new();
    let reconciler = online_reconciler(api.clone()).await;

    let result = reconciler.create_rental(booking(1, 10, 12)).await.unwrap();
    let DispatchResult::Applied(rental) = result else {
        panic!("expected pass-through, got {result:?}");
    };
    assert_eq!(rental.id, 1);
    assert_eq!(api.rentals().len(), 1);
    assert_eq!(reconciler.pending_count().await, 0);

    // The mirror holds the authoritative record.
    let records = reconciler.records(EntityKind::Rental).await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].pending_sync);
}

#[tokio::test]
async fn online_conflict_surfaces_as_rejection() {
    let api = FakeLedger::new();
    let reconciler = online_reconciler(api.clone()).await;

    reconciler.create_rental(booking(1, 10, 12)).await.unwrap();
    let err = reconciler
        .create_rental(booking(1, 11, 13))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected { status: 409, .. }));
}

#[tokio::test]
async fn offline_create_queues_and_applies_optimistically() {
    let api = FakeLedger::new();
    api.set_reachable(false);
    let reconciler = Reconciler::new(api.clone(), "device-1");

    let result = reconciler.create_rental(booking(1, 10, 12)).await.unwrap();
    let DispatchResult::Queued { key } = result else {
        panic!("expected queued result, got {result:?}");
    };
    assert!(key.is_temp());
    assert_eq!(reconciler.pending_count().await, 1);
    assert!(api.rentals().is_empty());

    let records = reconciler.records(EntityKind::Rental).await;
    assert_eq!(records.len(), 1);
    assert!(records[0].pending_sync);
}

#[tokio::test]
async fn transport_failure_flips_offline_and_queues_the_write() {
    let api = FakeLedger::new();
    let reconciler = online_reconciler(api.clone()).await;

    // The next write dies at the transport layer.
    api.fail_writes_after(0);
    let result = reconciler.create_rental(booking(1, 10, 12)).await.unwrap();
    assert!(matches!(result, DispatchResult::Queued { .. }));
    assert!(!reconciler.is_online().await);
    assert_eq!(reconciler.pending_count().await, 1);
}

#[tokio::test]
async fn drain_replays_in_order_and_remaps_temp_ids() {
    let api = FakeLedger::new();
    api.set_reachable(false);
    let reconciler = Reconciler::new(api.clone(), "device-1");

    // Offline: create a booking, then patch the not-yet-acked record.
    let DispatchResult::Queued { key } =
        reconciler.create_rental(booking(3, 10, 12)).await.unwrap()
    else {
        panic!("expected queued create");
    };
    let patch = RentalPatch {
        notes: Some("hem before pickup".into()),
        ..Default::default()
    };
    reconciler
        .update_rental(key.clone(), patch)
        .await
        .unwrap();
    assert_eq!(reconciler.pending_count().await, 2);

    // Reconnect and drain.
    api.set_reachable(true);
    let report = reconciler.probe_and_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed.len(), 2);
    assert!(report.is_clean());
    assert_eq!(reconciler.pending_count().await, 0);

    // The update hit the server-assigned id, after the create.
    assert_eq!(api.calls(), vec!["create:3", "update:1"]);
    let rentals = api.rentals();
    assert_eq!(rentals[0].notes.as_deref(), Some("hem before pickup"));

    // The mirror no longer knows the temp id.
    assert!(reconciler
        .records(EntityKind::Rental)
        .await
        .iter()
        .all(|r| r.key == EntityKey::Server(1)));
}

#[tokio::test]
async fn offline_double_booking_surfaces_conflict_on_drain() {
    let api = FakeLedger::new();
    api.set_reachable(false);
    let reconciler = Reconciler::new(api.clone(), "device-1");

    // Both accepted locally while offline.
    reconciler.create_rental(booking(7, 10, 12)).await.unwrap();
    reconciler.create_rental(booking(7, 11, 13)).await.unwrap();
    assert_eq!(reconciler.pending_count().await, 2);

    api.set_reachable(true);
    let report = reconciler.probe_and_sync().await.unwrap().unwrap();

    assert_eq!(report.replayed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].conflict);

    // The rejected booking stays queued and visibly flagged, not dropped.
    assert_eq!(reconciler.pending_count().await, 1);
    let conflicts = reconciler.unresolved_conflicts(EntityKind::Rental).await;
    assert_eq!(conflicts.len(), 1);

    // Only one rental landed on the server.
    assert_eq!(api.rentals().len(), 1);
}

#[tokio::test]
async fn touching_windows_conflict_on_drain() {
    let api = FakeLedger::new();
    api.set_reachable(false);
    let reconciler = Reconciler::new(api.clone(), "device-1");

    reconciler.create_rental(booking(7, 10, 12)).await.unwrap();
    // Shares the 12:00 boundary: inclusive semantics reject it.
    reconciler.create_rental(booking(7, 12, 13)).await.unwrap();

    api.set_reachable(true);
    let report = reconciler.probe_and_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].conflict);
}

#[tokio::test]
async fn drain_stops_after_transport_drop_and_keeps_remainder() {
    let api = FakeLedger::new();
    api.set_reachable(false);
    let reconciler = Reconciler::new(api.clone(), "device-1");

    reconciler.create_rental(booking(1, 8, 9)).await.unwrap();
    reconciler.create_rental(booking(2, 8, 9)).await.unwrap();
    reconciler.create_rental(booking(3, 8, 9)).await.unwrap();

    api.set_reachable(true);
    // First write succeeds, the second dies mid-drain.
    api.fail_writes_after(1);
    let report = reconciler.probe_and_sync().await.unwrap().unwrap();

    assert!(report.interrupted);
    assert_eq!(report.replayed.len(), 1);
    assert!(!reconciler.is_online().await);
    // The two undrained mutations wait for the next reconnect.
    assert_eq!(reconciler.pending_count().await, 2);
}

#[tokio::test]
async fn drain_is_single_flight() {
    let api = FakeLedger::new();
    api.set_reachable(false);
    let reconciler = Arc::new(Reconciler::new(api.clone(), "device-1"));

    reconciler.create_rental(booking(1, 10, 12)).await.unwrap();

    // Park the first drain inside the create call.
    let gate = Arc::new(Notify::new());
    *api.inner.hold_create.lock().unwrap() = Some(gate.clone());
    api.set_reachable(true);

    let first = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.probe_and_sync().await })
    };
    api.inner.create_started.notified().await;

    // A second trigger while the first drain is in flight is coalesced.
    let second = reconciler.drain().await.unwrap();
    assert!(second.is_none());

    *api.inner.hold_create.lock().unwrap() = None;
    gate.notify_one();
    let report = first.await.unwrap().unwrap().unwrap();
    assert_eq!(report.replayed.len(), 1);
}

#[tokio::test]
async fn post_drain_pull_merges_server_state() {
    let api = FakeLedger::new();

    // Seed the server with a rental made by another device.
    api.create_rental(&booking(9, 14, 16), "other-device-key")
        .await
        .unwrap();

    let reconciler = online_reconciler(api.clone()).await;
    // probe_and_sync already pulled: the foreign rental is mirrored.
    let records = reconciler.records(EntityKind::Rental).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, EntityKey::Server(1));
}

#[tokio::test]
async fn queued_work_survives_a_restart() {
    let api = FakeLedger::new();
    api.set_reachable(false);
    let reconciler = Reconciler::new(api.clone(), "device-1");
    reconciler.create_rental(booking(5, 10, 12)).await.unwrap();

    // Persist, "restart", restore.
    let snapshot = reconciler.snapshot().await;
    let restarted = Reconciler::new(api.clone(), "device-1");
    restarted.restore(snapshot).await.unwrap();
    assert_eq!(restarted.pending_count().await, 1);

    // The restored queue drains like the original would have.
    api.set_reachable(true);
    let report = restarted.probe_and_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed.len(), 1);
    assert_eq!(api.rentals().len(), 1);
}

#[tokio::test]
async fn offline_cancel_queues_and_replays() {
    let api = FakeLedger::new();
    let reconciler = online_reconciler(api.clone()).await;

    let DispatchResult::Applied(rental) =
        reconciler.create_rental(booking(1, 10, 12)).await.unwrap()
    else {
        panic!("expected pass-through create");
    };

    // Drop offline; cancel queues.
    api.set_reachable(false);
    reconciler.probe_and_sync().await.unwrap();
    let result = reconciler
        .cancel_rental(EntityKey::Server(rental.id))
        .await
        .unwrap();
    assert!(matches!(result, DispatchResult::Queued { .. }));
    assert_eq!(api.rentals()[0].status, RentalStatus::Active);

    // Reconnect: the cancel lands.
    api.set_reachable(true);
    let report = reconciler.probe_and_sync().await.unwrap().unwrap();
    assert_eq!(report.replayed.len(), 1);
    assert_eq!(api.rentals()[0].status, RentalStatus::Cancelled);
}
