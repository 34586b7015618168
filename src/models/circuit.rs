//! Circuit and departure data structures.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A sellable guaranteed-departure travel product.
///
/// The engine never mutates circuits; they exist as foreign-key targets
/// for departures, sources and watchlist subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Circuit {
    /// Circuit unique identifier
    pub id: String,

    /// Display title
    pub title: String,

    /// Base price in currency minor units (cents)
    pub base_price_cents: i64,

    /// Trip length in days
    pub duration_days: u32,
}

/// Sale status of a departure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DepartureStatus {
    Open,
    Closed,
    Full,
    Cancelled,
}

impl DepartureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepartureStatus::Open => "open",
            DepartureStatus::Closed => "closed",
            DepartureStatus::Full => "full",
            DepartureStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DepartureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled occurrence of a circuit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Departure {
    /// Departure unique identifier
    pub id: String,

    /// Owning circuit
    pub circuit_id: String,

    /// First day of the trip
    pub start_date: NaiveDate,

    /// Seat capacity (>= 1)
    pub total_seats: u32,

    /// Seats already sold (0 <= booked <= total)
    pub booked_seats: u32,

    /// Price override in minor units; `None` falls back to the circuit base price
    #[serde(default)]
    pub price_cents: Option<i64>,

    /// Sale status
    pub status: DepartureStatus,
}

impl Departure {
    /// Seats still sellable.
    pub fn available_seats(&self) -> u32 {
        self.total_seats.saturating_sub(self.booked_seats)
    }

    /// Price for this departure, falling back to the circuit base price.
    pub fn effective_price_cents(&self, circuit: &Circuit) -> i64 {
        self.price_cents.unwrap_or(circuit.base_price_cents)
    }

    /// Check the seat invariants.
    pub fn validate(&self) -> Result<()> {
        if self.total_seats == 0 {
            return Err(AppError::validation(format!(
                "departure {}: total_seats must be >= 1",
                self.id
            )));
        }
        if self.booked_seats > self.total_seats {
            return Err(AppError::validation(format!(
                "departure {}: booked_seats {} exceeds total_seats {}",
                self.id, self.booked_seats, self.total_seats
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_departure() -> Departure {
        Departure {
            id: "dep-1".to_string(),
            circuit_id: "circuit-1".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 9, 15).unwrap(),
            total_seats: 16,
            booked_seats: 10,
            price_cents: None,
            status: DepartureStatus::Open,
        }
    }

    #[test]
    fn test_available_seats() {
        assert_eq!(sample_departure().available_seats(), 6);
    }

    #[test]
    fn test_effective_price_falls_back_to_circuit() {
        let circuit = Circuit {
            id: "circuit-1".to_string(),
            title: "Andes Explorer".to_string(),
            base_price_cents: 129900,
            duration_days: 12,
        };
        let mut departure = sample_departure();
        assert_eq!(departure.effective_price_cents(&circuit), 129900);
        departure.price_cents = Some(119900);
        assert_eq!(departure.effective_price_cents(&circuit), 119900);
    }

    #[test]
    fn test_validate_rejects_overbooking() {
        let mut departure = sample_departure();
        departure.booked_seats = 17;
        assert!(departure.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut departure = sample_departure();
        departure.total_seats = 0;
        departure.booked_seats = 0;
        assert!(departure.validate().is_err());
    }
}
