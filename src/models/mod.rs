// src/models/mod.rs

//! Domain models for the sync engine.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod circuit;
mod config;
mod event;
mod snapshot;
mod source;
mod watchlist;

// Re-export all public types
pub use circuit::{Circuit, Departure, DepartureStatus};
pub use config::{Config, DispatcherConfig, ExtractionConfig, FetcherConfig, SchedulerConfig};
pub use event::{dedup_key, ChangeEvent, ChangeKind, FieldValue, NotificationIntent};
pub use snapshot::{AvailabilitySnapshot, FetchedAvailability};
pub use source::{
    ExternalSource, ExtractionRules, SourceKind, SyncFrequency, SyncOutcome, SyncStatus,
};
pub use watchlist::WatchlistSubscription;
