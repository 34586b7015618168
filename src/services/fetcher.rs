//! Source fetcher service.
//!
//! Retrieves raw availability content from one external source. Never
//! interprets the business meaning of the data and never retries; retry
//! policy belongs to the sync orchestrator.

use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{ExternalSource, FetcherConfig, SourceKind};
use crate::utils::http;

/// Raw content returned by a fetch, tagged by source kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawContent {
    Html(String),
    Json(String),
}

impl RawContent {
    pub fn as_str(&self) -> &str {
        match self {
            RawContent::Html(s) | RawContent::Json(s) => s,
        }
    }
}

/// Service for fetching raw availability data over HTTP.
#[derive(Clone)]
pub struct SourceFetcher {
    client: Client,
}

impl SourceFetcher {
    /// Create a fetcher with a configured client (timeout, user agent).
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: http::create_client(config)?,
        })
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the raw content for one source.
    ///
    /// Fails closed on network errors, timeout, or a non-2xx response.
    /// Manual sources carry no fetchable URL.
    pub async fn fetch(&self, source: &ExternalSource) -> Result<RawContent> {
        if source.kind == SourceKind::Manual {
            return Err(AppError::config(format!(
                "source {} is manual and cannot be fetched",
                source.id
            )));
        }

        let response = self.client.get(&source.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(&source.url, format!("HTTP {status}")));
        }

        let body = response.text().await?;
        Ok(match source.kind {
            SourceKind::WebScraping => RawContent::Html(body),
            SourceKind::Api => RawContent::Json(body),
            SourceKind::Manual => unreachable!("manual sources rejected above"),
        })
    }
}
