//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::DepartureStatus;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP fetch behavior
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Scheduling behavior
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Notification suppression behavior
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Field extraction settings shared by all sources
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.scheduler.tick_secs == 0 {
            return Err(AppError::validation("scheduler.tick_secs must be > 0"));
        }
        if self.scheduler.pool_size == 0 {
            return Err(AppError::validation("scheduler.pool_size must be > 0"));
        }
        if self.dispatcher.suppression_window_secs == 0 {
            return Err(AppError::validation(
                "dispatcher.suppression_window_secs must be > 0",
            ));
        }
        if self.extraction.date_formats.is_empty() {
            return Err(AppError::validation("extraction.date_formats is empty"));
        }
        Ok(())
    }
}

/// HTTP client settings for the source fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for outbound requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Hard request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler passes over the source list
    #[serde(default = "defaults::tick")]
    pub tick_secs: u64,

    /// Maximum concurrent in-flight syncs
    #[serde(default = "defaults::pool_size")]
    pub pool_size: usize,

    /// Upper bound for the per-source scheduling jitter
    #[serde(default = "defaults::jitter_max")]
    pub jitter_max_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: defaults::tick(),
            pool_size: defaults::pool_size(),
            jitter_max_secs: defaults::jitter_max(),
        }
    }
}

/// Notification dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Window during which an identical observation is notified at most once
    #[serde(default = "defaults::suppression_window")]
    pub suppression_window_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            suppression_window_secs: defaults::suppression_window(),
        }
    }
}

/// Field extraction settings.
///
/// Keyword lists map free-form status text to a departure status; date
/// formats are tried in order against the departure-dates field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "defaults::cancelled_keywords")]
    pub cancelled_keywords: Vec<String>,

    #[serde(default = "defaults::full_keywords")]
    pub full_keywords: Vec<String>,

    #[serde(default = "defaults::closed_keywords")]
    pub closed_keywords: Vec<String>,

    #[serde(default = "defaults::open_keywords")]
    pub open_keywords: Vec<String>,

    /// chrono format strings for departure date parsing
    #[serde(default = "defaults::date_formats")]
    pub date_formats: Vec<String>,

    /// Maximum excerpt length (graphemes) kept in extraction error logs
    #[serde(default = "defaults::excerpt_graphemes")]
    pub excerpt_graphemes: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            cancelled_keywords: defaults::cancelled_keywords(),
            full_keywords: defaults::full_keywords(),
            closed_keywords: defaults::closed_keywords(),
            open_keywords: defaults::open_keywords(),
            date_formats: defaults::date_formats(),
            excerpt_graphemes: defaults::excerpt_graphemes(),
        }
    }
}

impl ExtractionConfig {
    /// Map free-form booking-status text to a departure status.
    ///
    /// Most specific wins: cancelled before full before closed before open.
    pub fn parse_status(&self, text: &str) -> Option<DepartureStatus> {
        let lower = text.to_lowercase();
        let matches = |keywords: &[String]| keywords.iter().any(|k| lower.contains(&k.to_lowercase()));

        if matches(&self.cancelled_keywords) {
            Some(DepartureStatus::Cancelled)
        } else if matches(&self.full_keywords) {
            Some(DepartureStatus::Full)
        } else if matches(&self.closed_keywords) {
            Some(DepartureStatus::Closed)
        } else if matches(&self.open_keywords) {
            Some(DepartureStatus::Open)
        } else {
            None
        }
    }
}

mod defaults {
    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; girsync/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Scheduler defaults
    pub fn tick() -> u64 {
        60
    }
    pub fn pool_size() -> usize {
        4
    }
    pub fn jitter_max() -> u64 {
        120
    }

    // Dispatcher defaults
    pub fn suppression_window() -> u64 {
        3600
    }

    // Extraction defaults
    pub fn cancelled_keywords() -> Vec<String> {
        vec!["annulé".into(), "cancelled".into(), "canceled".into()]
    }
    pub fn full_keywords() -> Vec<String> {
        vec!["complet".into(), "full".into(), "sold out".into()]
    }
    pub fn closed_keywords() -> Vec<String> {
        vec!["fermé".into(), "closed".into()]
    }
    pub fn open_keywords() -> Vec<String> {
        vec![
            "disponible".into(),
            "available".into(),
            "open".into(),
            "places".into(),
        ]
    }
    pub fn date_formats() -> Vec<String> {
        vec!["%d/%m/%Y".into(), "%Y-%m-%d".into(), "%d-%m-%Y".into()]
    }
    pub fn excerpt_graphemes() -> usize {
        200
    }
}
