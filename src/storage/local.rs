//! Local filesystem storage implementation.
//!
//! JSON documents under a root directory, for development and
//! single-host deployments.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Engine configuration
//! ├── circuits.json         # Circuit catalog (read-only for the engine)
//! ├── departures.json       # Departures, updated by syncs and bookings
//! ├── sources.json          # External sources + last sync outcomes
//! ├── watchlists.json       # Agency subscriptions
//! └── snapshots/            # One availability baseline per departure
//!     └── {departure_id}.json
//! ```
//!
//! Every write goes through a temp file and rename, so a crashed sync
//! never leaves a half-written document behind.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    AvailabilitySnapshot, Circuit, Departure, ExternalSource, SyncOutcome, WatchlistSubscription,
};
use crate::storage::EngineStore;

const CIRCUITS: &str = "circuits.json";
const DEPARTURES: &str = "departures.json";
const SOURCES: &str = "sources.json";
const WATCHLISTS: &str = "watchlists.json";

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    // Serializes read-modify-write cycles on the shared documents;
    // per-source serialization alone does not cover two circuits
    // landing in the same file.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a new store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn snapshot_key(departure_id: &str) -> String {
        format!("snapshots/{departure_id}.json")
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        Ok(self.read_json(key).await?.unwrap_or_default())
    }

    /// Load the circuit catalog (not part of the engine interface; the
    /// CLI uses it for display).
    pub async fn load_circuits(&self) -> Result<Vec<Circuit>> {
        self.read_list(CIRCUITS).await
    }

    /// Load all sources regardless of the active flag.
    pub async fn load_all_sources(&self) -> Result<Vec<ExternalSource>> {
        self.read_list(SOURCES).await
    }

    /// Load every subscription across circuits.
    pub async fn load_all_subscriptions(&self) -> Result<Vec<WatchlistSubscription>> {
        self.read_list(WATCHLISTS).await
    }

    /// Seed helper: write the full source list.
    pub async fn save_sources(&self, sources: &[ExternalSource]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(SOURCES, sources).await
    }

    /// Seed helper: write the full departure list.
    pub async fn save_departures(&self, departures: &[Departure]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(DEPARTURES, departures).await
    }

    /// Seed helper: write the full subscription list.
    pub async fn save_subscriptions(
        &self,
        subscriptions: &[WatchlistSubscription],
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(WATCHLISTS, subscriptions).await
    }
}

#[async_trait]
impl EngineStore for LocalStore {
    async fn load_active_sources(&self) -> Result<Vec<ExternalSource>> {
        let sources: Vec<ExternalSource> = self.read_list(SOURCES).await?;
        Ok(sources.into_iter().filter(|s| s.active).collect())
    }

    async fn load_source(&self, source_id: &str) -> Result<Option<ExternalSource>> {
        let sources: Vec<ExternalSource> = self.read_list(SOURCES).await?;
        Ok(sources.into_iter().find(|s| s.id == source_id))
    }

    async fn record_sync_outcome(&self, source_id: &str, outcome: &SyncOutcome) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut sources: Vec<ExternalSource> = self.read_list(SOURCES).await?;
        let Some(source) = sources.iter_mut().find(|s| s.id == source_id) else {
            return Err(AppError::validation(format!("unknown source: {source_id}")));
        };
        source.apply_outcome(outcome);
        self.write_json(SOURCES, &sources).await
    }

    async fn load_departure(&self, departure_id: &str) -> Result<Option<Departure>> {
        let departures: Vec<Departure> = self.read_list(DEPARTURES).await?;
        Ok(departures.into_iter().find(|d| d.id == departure_id))
    }

    async fn save_departure(&self, departure: &Departure) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut departures: Vec<Departure> = self.read_list(DEPARTURES).await?;
        match departures.iter_mut().find(|d| d.id == departure.id) {
            Some(existing) => *existing = departure.clone(),
            None => departures.push(departure.clone()),
        }
        self.write_json(DEPARTURES, &departures).await
    }

    async fn departures_for_circuit(&self, circuit_id: &str) -> Result<Vec<Departure>> {
        let departures: Vec<Departure> = self.read_list(DEPARTURES).await?;
        Ok(departures
            .into_iter()
            .filter(|d| d.circuit_id == circuit_id)
            .collect())
    }

    async fn load_snapshot(&self, departure_id: &str) -> Result<Option<AvailabilitySnapshot>> {
        self.read_json(&Self::snapshot_key(departure_id)).await
    }

    async fn save_snapshot(
        &self,
        departure_id: &str,
        snapshot: &AvailabilitySnapshot,
    ) -> Result<()> {
        self.write_json(&Self::snapshot_key(departure_id), snapshot)
            .await
    }

    async fn load_subscriptions(&self, circuit_id: &str) -> Result<Vec<WatchlistSubscription>> {
        let subscriptions: Vec<WatchlistSubscription> = self.read_list(WATCHLISTS).await?;
        Ok(subscriptions
            .into_iter()
            .filter(|s| s.circuit_id == circuit_id)
            .collect())
    }
}
