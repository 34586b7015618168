//! Availability snapshots and fetched values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::DepartureStatus;

/// Last-known availability tuple for a departure.
///
/// The comparison baseline for change detection. Replaced whole on every
/// successful sync, never partially updated; a failed sync leaves it
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilitySnapshot {
    pub available_seats: Option<u32>,
    pub total_seats: Option<u32>,
    pub status: Option<DepartureStatus>,
    pub price_cents: Option<i64>,
    pub synced_at: DateTime<Utc>,
}

/// Typed result of one extraction pass.
///
/// Every field is independently optional: a rule may be unset, or its
/// locator may match nothing. A `None` here means "unknown this fetch",
/// never "zero" or "removed".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchedAvailability {
    pub available_seats: Option<u32>,
    pub total_seats: Option<u32>,
    pub status: Option<DepartureStatus>,
    pub price_cents: Option<i64>,
    pub next_departure_date: Option<NaiveDate>,
}

impl FetchedAvailability {
    /// True when the fetch produced no usable field at all.
    pub fn is_empty(&self) -> bool {
        self.available_seats.is_none()
            && self.total_seats.is_none()
            && self.status.is_none()
            && self.price_cents.is_none()
            && self.next_departure_date.is_none()
    }

    /// Sanity-check the fetched values against each other.
    ///
    /// Violations fail the whole sync; values are never silently clamped.
    pub fn validate(&self) -> Result<()> {
        if let (Some(available), Some(total)) = (self.available_seats, self.total_seats) {
            if available > total {
                return Err(AppError::validation(format!(
                    "available_seats {available} exceeds total_seats {total}"
                )));
            }
        }
        if let Some(price) = self.price_cents {
            if price < 0 {
                return Err(AppError::validation(format!("negative price: {price}")));
            }
        }
        Ok(())
    }
}
