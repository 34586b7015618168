//! Watchlist subscriptions.

use serde::{Deserialize, Serialize};

/// An agency's interest in one circuit.
///
/// Unique per (agency, circuit). The three flags are independently
/// toggleable and take effect from the next evaluated event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchlistSubscription {
    pub agency_id: String,
    pub circuit_id: String,

    #[serde(default)]
    pub notify_on_booking: bool,

    #[serde(default)]
    pub notify_on_availability_change: bool,

    #[serde(default)]
    pub notify_on_price_change: bool,
}
