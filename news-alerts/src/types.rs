use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::categorizer::Taxonomy;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Only this many leading entries of each feed are considered per cycle.
    pub max_entries_per_feed: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "News-Alerts/1.0".to_string(),
            timeout_seconds: 10,
            max_entries_per_feed: 5,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    pub long_poll_seconds: u64,
    /// Upper bound for a single Bot API call other than long polling.
    pub request_timeout_seconds: u64,
}

impl TelegramConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            long_poll_seconds: 30,
            request_timeout_seconds: 15,
        }
    }
}

/// Static configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub feeds: Vec<String>,
    pub fetch: FetchConfig,
    pub poll_interval_seconds: u64,
    pub send_pause_millis: u64,
    pub taxonomy: Taxonomy,
    pub telegram: TelegramConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            feeds: vec![
                "https://www.forexlive.com/feed/news".to_string(),
                "https://www.aljazeera.com/xml/rss/all.xml".to_string(),
                "http://feeds.bbci.co.uk/news/world/rss.xml".to_string(),
            ],
            fetch: FetchConfig::default(),
            poll_interval_seconds: 60,
            send_pause_millis: 100,
            taxonomy: Taxonomy::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl AlertConfig {
    /// Read a JSON config file. Missing fields fall back to the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: AlertConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(AlertError::Config("poll_interval_seconds must be positive".to_string()));
        }
        if self.fetch.timeout_seconds == 0 {
            return Err(AlertError::Config("fetch.timeout_seconds must be positive".to_string()));
        }
        if self.telegram.request_timeout_seconds == 0 {
            return Err(AlertError::Config("telegram.request_timeout_seconds must be positive".to_string()));
        }
        if self.fetch.max_entries_per_feed == 0 {
            return Err(AlertError::Config("fetch.max_entries_per_feed must be positive".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn send_pause(&self) -> Duration {
        Duration::from_millis(self.send_pause_millis)
    }
}

/// Counters for one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Set when the cycle was skipped because nobody is subscribed.
    pub skipped_no_subscribers: bool,
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub entries_without_link: usize,
    pub entries_already_seen: usize,
    pub entries_unmatched: usize,
    pub items_dispatched: usize,
    pub deliveries_sent: usize,
    pub deliveries_failed: usize,
    pub storage_failures: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AlertError>;
