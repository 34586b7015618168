//! Storage abstractions — the persistence collaborator.
//!
//! The engine only ever talks to [`EngineStore`]; the shipped
//! implementation is a JSON-file store for stand-alone deployments.

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AvailabilitySnapshot, Departure, ExternalSource, SyncOutcome, WatchlistSubscription,
};

// Re-export for convenience
pub use local::LocalStore;

/// Persistence interface consumed by the engine.
#[async_trait]
pub trait EngineStore: Send + Sync {
    /// Sources eligible for scheduling (active flag set).
    async fn load_active_sources(&self) -> Result<Vec<ExternalSource>>;

    async fn load_source(&self, source_id: &str) -> Result<Option<ExternalSource>>;

    /// Record a finished run on the source's outcome fields.
    async fn record_sync_outcome(&self, source_id: &str, outcome: &SyncOutcome) -> Result<()>;

    async fn load_departure(&self, departure_id: &str) -> Result<Option<Departure>>;

    async fn save_departure(&self, departure: &Departure) -> Result<()>;

    async fn departures_for_circuit(&self, circuit_id: &str) -> Result<Vec<Departure>>;

    async fn load_snapshot(&self, departure_id: &str) -> Result<Option<AvailabilitySnapshot>>;

    /// Replace the stored snapshot whole. Must complete or fail atomically;
    /// a partially-written snapshot is never observable.
    async fn save_snapshot(
        &self,
        departure_id: &str,
        snapshot: &AvailabilitySnapshot,
    ) -> Result<()>;

    async fn load_subscriptions(&self, circuit_id: &str) -> Result<Vec<WatchlistSubscription>>;
}
