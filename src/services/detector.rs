//! Change detection between availability snapshots.
//!
//! Compares a newly fetched availability against the last stored
//! snapshot and produces the discrete change events for notification
//! dispatch. Pure transforms over in-memory values; nothing here blocks.

use chrono::{DateTime, Utc};

use crate::models::{
    AvailabilitySnapshot, ChangeEvent, ChangeKind, FetchedAvailability, FieldValue,
};

/// Compare the previous snapshot against a fetched availability.
///
/// Returns an ordered list of events; a single sync can produce several.
/// Two asymmetries carry the whole contract:
/// - no prior snapshot emits nothing (the first sync only establishes
///   the baseline);
/// - a field absent in the fetch is unknown, not changed — it never
///   manufactures an event, so a transient scraping gap cannot produce
///   a false "seats appeared".
pub fn detect(
    previous: Option<&AvailabilitySnapshot>,
    fetched: &FetchedAvailability,
    departure_id: &str,
    circuit_id: &str,
    at: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let Some(prev) = previous else {
        return events;
    };

    let event = |kind: ChangeKind, old: FieldValue, new: FieldValue| ChangeEvent {
        kind,
        departure_id: departure_id.to_string(),
        circuit_id: circuit_id.to_string(),
        old,
        new,
        at,
    };

    if let (Some(old), Some(new)) = (prev.available_seats, fetched.available_seats) {
        let (old_v, new_v) = (FieldValue::Seats(old), FieldValue::Seats(new));
        if new < old {
            events.push(event(ChangeKind::AvailabilityDecreased, old_v, new_v));
        } else if new > old {
            events.push(event(ChangeKind::AvailabilityIncreased, old_v, new_v));
        }
        if old > 0 && new == 0 {
            events.push(event(ChangeKind::BecameFull, old_v, new_v));
        } else if old == 0 && new > 0 {
            events.push(event(ChangeKind::BecameAvailable, old_v, new_v));
        }
    }

    if let (Some(old), Some(new)) = (prev.total_seats, fetched.total_seats) {
        if old != new {
            events.push(event(
                ChangeKind::CapacityChanged,
                FieldValue::Seats(old),
                FieldValue::Seats(new),
            ));
        }
    }

    if let (Some(old), Some(new)) = (prev.status, fetched.status) {
        if old != new {
            events.push(event(
                ChangeKind::StatusChanged,
                FieldValue::Status(old),
                FieldValue::Status(new),
            ));
        }
    }

    if let (Some(old), Some(new)) = (prev.price_cents, fetched.price_cents) {
        if old != new {
            events.push(event(
                ChangeKind::PriceChanged,
                FieldValue::PriceCents(old),
                FieldValue::PriceCents(new),
            ));
        }
    }

    events
}

/// Build the snapshot to persist after a successful sync.
///
/// Fields absent in the fetch carry forward from the previous snapshot;
/// the result replaces the stored snapshot whole.
pub fn merge_snapshot(
    previous: Option<&AvailabilitySnapshot>,
    fetched: &FetchedAvailability,
    synced_at: DateTime<Utc>,
) -> AvailabilitySnapshot {
    AvailabilitySnapshot {
        available_seats: fetched
            .available_seats
            .or(previous.and_then(|p| p.available_seats)),
        total_seats: fetched.total_seats.or(previous.and_then(|p| p.total_seats)),
        status: fetched.status.or(previous.and_then(|p| p.status)),
        price_cents: fetched.price_cents.or(previous.and_then(|p| p.price_cents)),
        synced_at,
    }
}
