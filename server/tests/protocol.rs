//! Wire-contract tests for the rental API.
//!
//! These cover the request/response shapes the server commits to, without
//! needing a running PostgreSQL instance. Full round-trips against a live
//! database are exercised separately with DATABASE_URL set.

use atelier_engine::{
    ApiResponse, EntityKind, Error, GarmentStatus, NewRental, Rental, RentalPatch, RentalStatus,
};
use chrono::{TimeZone, Utc};

/// The exact body the admin panel posts for a booking.
#[test]
fn create_request_parses_panel_body() {
    let body = r#"{
        "garmentId": 3,
        "clientId": 7,
        "startTime": "2025-06-01T10:00:00Z",
        "endTime": "2025-06-01T18:00:00Z",
        "cost": "149.50",
        "notes": "wedding fitting"
    }"#;

    let request: NewRental = serde_json::from_str(body).unwrap();
    assert_eq!(request.garment_id, 3);
    assert_eq!(request.client_id, Some(7));
    assert_eq!(request.cost.unwrap().to_string(), "149.50");
}

#[test]
fn create_request_without_client_parses() {
    let body = r#"{
        "garmentId": 3,
        "startTime": "2025-06-01T10:00:00Z",
        "endTime": "2025-06-01T18:00:00Z"
    }"#;

    let request: NewRental = serde_json::from_str(body).unwrap();
    assert_eq!(request.client_id, None);
    assert_eq!(request.cost, None);
}

#[test]
fn patch_accepts_any_field_subset() {
    let status_only: RentalPatch = serde_json::from_str(r#"{"status": "completed"}"#).unwrap();
    assert_eq!(status_only.status, Some(RentalStatus::Completed));
    assert!(status_only.start_time.is_none());

    let dates_only: RentalPatch = serde_json::from_str(
        r#"{"startTime": "2025-06-02T10:00:00Z", "endTime": "2025-06-02T18:00:00Z"}"#,
    )
    .unwrap();
    assert!(dates_only.status.is_none());
    assert!(dates_only.start_time.is_some());
    assert!(dates_only.end_time.is_some());

    let empty: RentalPatch = serde_json::from_str("{}").unwrap();
    assert!(empty.is_empty());
}

#[test]
fn rental_response_envelope_shape() {
    let rental = Rental {
        id: 12,
        garment_id: 3,
        client_id: None,
        start_time: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap(),
        status: RentalStatus::Active,
        cost: None,
        notes: None,
        created_at: Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).unwrap(),
        client_name: "Unassigned".into(),
        garment_name: "Evening gown".into(),
    };

    let envelope = ApiResponse::ok_with_message(rental, "Rental created");
    let json = serde_json::to_value(&envelope).unwrap();

    assert_eq!(json["success"], true);
    assert_eq!(json["message"], "Rental created");
    assert_eq!(json["data"]["id"], 12);
    assert_eq!(json["data"]["garmentId"], 3);
    assert_eq!(json["data"]["clientName"], "Unassigned");
    assert!(json.get("error").is_none());
}

#[test]
fn failure_envelope_shape() {
    let envelope: ApiResponse<()> = ApiResponse::fail_with_error(
        "garment 3 already has an active rental overlapping [2025-06-01 10:00:00 UTC, 2025-06-01 18:00:00 UTC]",
        "booking_conflict",
    );
    let json = serde_json::to_value(&envelope).unwrap();

    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "booking_conflict");
    assert!(json.get("data").is_none());
}

/// Failure classes map to distinct HTTP families: validation (400),
/// not-found (404), state conflict (409).
#[test]
fn error_taxonomy_classification() {
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();

    let invalid = Error::InvalidInterval { start, end };
    assert!(!invalid.is_conflict() && !invalid.is_not_found());

    let missing = Error::NotFound {
        entity: EntityKind::Garment,
        id: "3".into(),
    };
    assert!(missing.is_not_found());

    let conflict = Error::BookingConflict {
        garment_id: 3,
        start: end,
        end: start,
    };
    assert!(conflict.is_conflict());

    let unavailable = Error::Unavailable {
        garment_id: 3,
        status: GarmentStatus::Maintenance,
    };
    assert!(!unavailable.is_conflict() && !unavailable.is_not_found());
}

/// Error messages carry enough detail for the caller to explain the
/// failure: entity ids and the offending interval.
#[test]
fn error_messages_identify_the_offender() {
    let start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();

    let conflict = Error::BookingConflict {
        garment_id: 3,
        start,
        end,
    };
    let message = conflict.to_string();
    assert!(message.contains("garment 3"));
    assert!(message.contains("2025-06-01 10:00:00 UTC"));

    let invalid = Error::InvalidState {
        rental_id: 9,
        status: RentalStatus::Cancelled,
    };
    assert!(invalid.to_string().contains("rental 9"));
    assert!(invalid.to_string().contains("cancelled"));
}

#[test]
fn status_values_match_persisted_representation() {
    assert_eq!(
        serde_json::to_string(&GarmentStatus::OutOfService).unwrap(),
        "\"out_of_service\""
    );
    assert_eq!(
        serde_json::to_string(&RentalStatus::Cancelled).unwrap(),
        "\"cancelled\""
    );
    // What serde writes, the database CHECK constraints accept.
    assert_eq!(GarmentStatus::OutOfService.as_str(), "out_of_service");
    assert_eq!(RentalStatus::Cancelled.as_str(), "cancelled");
}
