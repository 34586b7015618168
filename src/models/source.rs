//! External source configuration and sync outcome records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Where the availability data comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A partner booking page, read with CSS selectors
    WebScraping,
    /// A JSON endpoint, read with field paths
    Api,
    /// Operator-entered values, never fetched
    Manual,
}

/// How often the scheduler refreshes a source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncFrequency {
    Hourly,
    Daily,
    Weekly,
    /// Only explicit on-demand requests trigger a sync
    Manual,
}

impl SyncFrequency {
    /// The scheduling interval, `None` for manual-only sources.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            SyncFrequency::Hourly => Some(Duration::hours(1)),
            SyncFrequency::Daily => Some(Duration::days(1)),
            SyncFrequency::Weekly => Some(Duration::weeks(1)),
            SyncFrequency::Manual => None,
        }
    }
}

/// Per-source field locators.
///
/// Each rule is an opaque locator string interpreted by the field
/// extractor: a CSS selector for `web_scraping` sources, a dot-separated
/// field path for `api` sources. An unset rule falls back to the
/// documented default locator for that field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionRules {
    #[serde(default)]
    pub places_available: Option<String>,

    #[serde(default)]
    pub places_total: Option<String>,

    #[serde(default)]
    pub departure_dates: Option<String>,

    #[serde(default)]
    pub booking_status: Option<String>,

    #[serde(default)]
    pub price: Option<String>,
}

/// Outcome classification recorded on the source after each run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Error,
}

/// Sync configuration attached to a circuit (at most one per circuit).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalSource {
    /// Source unique identifier
    pub id: String,

    /// Circuit this source feeds
    pub circuit_id: String,

    /// Page or endpoint URL
    pub url: String,

    pub kind: SourceKind,

    pub frequency: SyncFrequency,

    #[serde(default)]
    pub rules: ExtractionRules,

    /// Inactive sources are never scheduled
    #[serde(default = "defaults::active")]
    pub active: bool,

    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_sync_status: Option<SyncStatus>,

    #[serde(default)]
    pub last_sync_error: Option<String>,
}

impl ExternalSource {
    /// Check configuration sanity.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::validation("source id is empty"));
        }
        if self.kind != SourceKind::Manual {
            Url::parse(&self.url)
                .map_err(|e| AppError::validation(format!("source {}: bad url: {e}", self.id)))?;
        }
        Ok(())
    }

    /// Record a finished run on the source's outcome fields.
    pub fn apply_outcome(&mut self, outcome: &SyncOutcome) {
        self.last_sync_at = Some(outcome.finished_at);
        self.last_sync_status = Some(outcome.status);
        self.last_sync_error = outcome.error.clone();
    }
}

/// Result of one orchestrator run, recorded on the source and returned
/// to manual-trigger callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncOutcome {
    pub source_id: String,
    pub status: SyncStatus,
    pub error: Option<String>,
    /// Change events produced by the run
    pub events_emitted: usize,
    /// Notification intents actually handed to delivery
    pub intents_delivered: usize,
    pub finished_at: DateTime<Utc>,
}

impl SyncOutcome {
    pub fn success(source_id: &str, events_emitted: usize, intents_delivered: usize) -> Self {
        Self {
            source_id: source_id.to_string(),
            status: SyncStatus::Success,
            error: None,
            events_emitted,
            intents_delivered,
            finished_at: Utc::now(),
        }
    }

    pub fn error(source_id: &str, message: impl Into<String>) -> Self {
        Self {
            source_id: source_id.to_string(),
            status: SyncStatus::Error,
            error: Some(message.into()),
            events_emitted: 0,
            intents_delivered: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}

mod defaults {
    pub fn active() -> bool {
        true
    }
}
