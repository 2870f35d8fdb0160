use anyhow::Result;
use async_trait::async_trait;

use crate::defs::{CategorySet, Subscriber, SubscriberId};

/// Durable set of links that have already been delivered.
#[async_trait]
pub trait SeenStore: Send + Sync {
    async fn has(&self, link: &str) -> Result<bool>;

    /// Record `link` as delivered. Recording the same link twice is an error.
    async fn mark_seen(&self, link: &str) -> Result<()>;
}

/// Durable mapping from subscriber identity to chosen categories.
#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    /// Register `id` with the full category set. Returns `false` and leaves the
    /// existing preferences untouched when `id` is already registered.
    async fn add_or_ignore(&self, id: SubscriberId) -> Result<bool>;

    async fn list_all(&self) -> Result<Vec<Subscriber>>;

    async fn get_categories(&self, id: SubscriberId) -> Result<Option<CategorySet>>;

    /// Replace the category set of an existing subscriber. Returns `false` when
    /// `id` is not registered.
    async fn set_categories(&self, id: SubscriberId, categories: &CategorySet) -> Result<bool>;
}
