use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use interfaces::{Entry, FeedSource};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::parser::FeedParseError;
use crate::sources::HttpFeedSource;
use crate::types::FetchConfig;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    HttpStatus(u16),
    #[error(transparent)]
    Parse(#[from] FeedParseError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

/// Entries gathered from every configured source in one pass.
#[derive(Debug, Default)]
pub struct FetchSummary {
    /// Entries in configuration order of the sources, then feed order.
    pub entries: Vec<Entry>,
    pub sources_ok: usize,
    pub sources_failed: usize,
}

/// Polls all feed sources concurrently, isolating failures per source.
pub struct Fetcher {
    sources: Vec<Arc<dyn FeedSource>>,
    timeout: Duration,
    max_entries_per_feed: usize,
}

impl Fetcher {
    pub fn new(sources: Vec<Arc<dyn FeedSource>>, config: &FetchConfig) -> Self {
        Self {
            sources,
            timeout: config.timeout(),
            max_entries_per_feed: config.max_entries_per_feed,
        }
    }

    /// Build HTTP sources for `urls` sharing one client.
    pub fn from_urls(urls: &[String], config: &FetchConfig) -> reqwest::Result<Self> {
        let client = build_http_client(config)?;
        let sources = urls
            .iter()
            .map(|url| Arc::new(HttpFeedSource::new(url.clone(), client.clone())) as Arc<dyn FeedSource>)
            .collect();
        Ok(Self::new(sources, config))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetch every source in parallel and wait for all of them. A failed or
    /// timed-out source contributes no entries and does not affect the others.
    pub async fn fetch_all(&self) -> FetchSummary {
        let started = Instant::now();
        let results = join_all(self.sources.iter().map(|source| self.fetch_one(source.as_ref()))).await;

        let mut summary = FetchSummary::default();
        for (source, result) in self.sources.iter().zip(results) {
            match result {
                Ok(entries) => {
                    debug!("Source {} yielded {} entries", source.source_id(), entries.len());
                    summary.sources_ok += 1;
                    summary.entries.extend(entries);
                }
                Err(e) => {
                    warn!("Error fetching {}: {}", source.source_id(), e);
                    summary.sources_failed += 1;
                }
            }
        }

        info!(
            "Fetched {}/{} sources in {:?} ({} candidate entries)",
            summary.sources_ok,
            self.sources.len(),
            started.elapsed(),
            summary.entries.len()
        );
        summary
    }

    async fn fetch_one(&self, source: &dyn FeedSource) -> Result<Vec<Entry>, FetchError> {
        let mut entries = tokio::time::timeout(self.timeout, source.fetch())
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        entries.truncate(self.max_entries_per_feed);
        Ok(entries)
    }
}

pub fn build_http_client(config: &FetchConfig) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .build()
}
