//! Change events and notification intents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::DepartureStatus;

/// What kind of change a sync (or booking) observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AvailabilityDecreased,
    AvailabilityIncreased,
    /// Available seats crossed from >0 to 0
    BecameFull,
    /// Available seats crossed from 0 to >0
    BecameAvailable,
    /// total_seats moved independently of availability
    CapacityChanged,
    StatusChanged,
    PriceChanged,
    /// Raised by the internal booking flow, not by a fetch
    NewBooking,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::AvailabilityDecreased => "availability_decreased",
            ChangeKind::AvailabilityIncreased => "availability_increased",
            ChangeKind::BecameFull => "became_full",
            ChangeKind::BecameAvailable => "became_available",
            ChangeKind::CapacityChanged => "capacity_changed",
            ChangeKind::StatusChanged => "status_changed",
            ChangeKind::PriceChanged => "price_changed",
            ChangeKind::NewBooking => "new_booking",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old/new value carried by a change event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Seats(u32),
    Status(DepartureStatus),
    PriceCents(i64),
    /// The field was unknown on that side of the transition
    Unknown,
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Seats(n) => write!(f, "{n}"),
            FieldValue::Status(s) => write!(f, "{s}"),
            FieldValue::PriceCents(p) => write!(f, "{p}"),
            FieldValue::Unknown => f.write_str("unknown"),
        }
    }
}

/// A discrete, meaningful change observed on one departure.
///
/// Ephemeral: lives only for the dispatch cycle that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub departure_id: String,
    pub circuit_id: String,
    pub old: FieldValue,
    pub new: FieldValue,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    /// True for a status transition into or out of `cancelled`.
    pub fn touches_cancelled(&self) -> bool {
        matches!(self.old, FieldValue::Status(DepartureStatus::Cancelled))
            || matches!(self.new, FieldValue::Status(DepartureStatus::Cancelled))
    }
}

/// One decided notification: this agency, this event.
///
/// Handed to the delivery collaborator; the engine never renders or
/// sends the message itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationIntent {
    pub agency_id: String,
    pub dedup_key: String,
    pub event: ChangeEvent,
}

/// The identity used to suppress repeated notifications for an
/// unchanged observation.
pub fn dedup_key(agency_id: &str, event: &ChangeEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agency_id.as_bytes());
    hasher.update([0]);
    hasher.update(event.departure_id.as_bytes());
    hasher.update([0]);
    hasher.update(event.kind.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(event.new.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
