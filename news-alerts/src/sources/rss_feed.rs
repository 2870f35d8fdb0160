use anyhow::Context;
use async_trait::async_trait;
use interfaces::{Entry, FeedSource};
use reqwest::Client;
use tracing::debug;

use crate::fetcher::FetchError;
use crate::parser::FeedParser;

/// A feed document served over HTTP(S).
pub struct HttpFeedSource {
    url: String,
    client: Client,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    async fn fetch_entries(&self) -> Result<Vec<Entry>, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!("Fetched {} ({} bytes)", self.url, body.len());

        Ok(FeedParser::parse(&body)?)
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    fn source_id(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> anyhow::Result<Vec<Entry>> {
        self.fetch_entries()
            .await
            .with_context(|| format!("fetching {}", self.url))
    }
}
