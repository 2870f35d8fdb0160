use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One candidate item pulled from a feed source.
///
/// `link` is the stable identifier used for deduplication and may be empty
/// when the feed omits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub link: String,
    pub title: String,
    pub summary: String,
}

/// Fixed taxonomy of alert categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Geopolitics,
    Economics,
}

pub type CategorySet = BTreeSet<Category>;

impl Category {
    pub const ALL: [Category; 2] = [Category::Geopolitics, Category::Economics];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Geopolitics => "Geopolitics",
            Category::Economics => "Economics",
        }
    }

    /// The full category set, which is what a new subscriber starts with.
    pub fn all() -> CategorySet {
        Self::ALL.into_iter().collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Addressable recipient identity (a chat id on the delivery channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub i64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub categories: CategorySet,
}

impl Subscriber {
    pub fn wants_any(&self, matched: &CategorySet) -> bool {
        !self.categories.is_disjoint(matched)
    }
}

/// A text message received from a subscriber on the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: SubscriberId,
    pub text: String,
}

// Collaborator note:
// The traits below are the seams between the alert pipeline and the outside
// world. Implementations are constructed once at startup and shared behind
// `Arc`, so every method takes `&self` except where a cursor has to advance.

/// Where entries come from. Parsing the wire format is the source's job.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Address of the source, used for logging.
    fn source_id(&self) -> &str;

    /// Retrieve the source's entries in the feed's native order.
    async fn fetch(&self) -> Result<Vec<Entry>>;
}

/// Outbound delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: SubscriberId, text: &str) -> Result<()>;
}

/// Inbound command channel.
#[async_trait]
pub trait CommandSource: Send {
    /// Wait for the next batch of messages. An empty batch is a valid result.
    async fn receive(&mut self) -> Result<Vec<InboundMessage>>;
}
