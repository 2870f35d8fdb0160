use std::sync::Arc;
use std::time::Duration;

use interfaces::{CategorySet, Entry, Notifier, SeenStore, Subscriber, SubscriberRegistry};
use tracing::{debug, error, info, warn};

use crate::categorizer::Taxonomy;
use crate::fetcher::Fetcher;
use crate::types::{AlertError, CycleReport, Result};

/// Runs one fetch → dedup → categorize → mark seen → fan out cycle.
pub struct Dispatcher {
    fetcher: Fetcher,
    taxonomy: Taxonomy,
    seen: Arc<dyn SeenStore>,
    subscribers: Arc<dyn SubscriberRegistry>,
    notifier: Arc<dyn Notifier>,
    send_pause: Duration,
}

impl Dispatcher {
    pub fn new(
        fetcher: Fetcher,
        taxonomy: Taxonomy,
        seen: Arc<dyn SeenStore>,
        subscribers: Arc<dyn SubscriberRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fetcher,
            taxonomy,
            seen,
            subscribers,
            notifier,
            send_pause: Duration::from_millis(100),
        }
    }

    /// Pause inserted between two consecutive send attempts.
    pub fn with_send_pause(mut self, send_pause: Duration) -> Self {
        self.send_pause = send_pause;
        self
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let subscribers = self.subscribers.list_all().await.map_err(AlertError::Storage)?;
        if subscribers.is_empty() {
            debug!("No subscribers, skipping cycle");
            report.skipped_no_subscribers = true;
            return Ok(report);
        }

        let fetched = self.fetcher.fetch_all().await;
        report.sources_ok = fetched.sources_ok;
        report.sources_failed = fetched.sources_failed;

        let mut sent_any = false;
        for entry in &fetched.entries {
            let Some(matched) = self.admit(entry, &mut report).await else {
                continue;
            };

            report.items_dispatched += 1;
            let message = format_alert(entry, &matched);
            info!("Dispatching {} [{}]", entry.link, format_tags(&matched));

            for subscriber in subscribers.iter().filter(|subscriber| subscriber.wants_any(&matched)) {
                if sent_any {
                    tokio::time::sleep(self.send_pause).await;
                }
                sent_any = true;
                self.deliver(subscriber, &message, &mut report).await;
            }
        }

        Ok(report)
    }

    /// Decide whether `entry` is new and newsworthy. On success the link has
    /// already been recorded as seen and the matched categories are returned.
    async fn admit(&self, entry: &Entry, report: &mut CycleReport) -> Option<CategorySet> {
        if entry.link.is_empty() {
            debug!("Skipping entry without link: {}", entry.title);
            report.entries_without_link += 1;
            return None;
        }

        match self.seen.has(&entry.link).await {
            Ok(true) => {
                report.entries_already_seen += 1;
                return None;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Seen lookup failed for {}: {:#}", entry.link, e);
                report.storage_failures += 1;
                return None;
            }
        }

        let matched = self.taxonomy.categorize(&entry.title, &entry.summary);
        if matched.is_empty() {
            debug!("No category matched for {}", entry.link);
            report.entries_unmatched += 1;
            return None;
        }

        // Recorded before any send so a failed delivery is never retried.
        if let Err(e) = self.seen.mark_seen(&entry.link).await {
            error!("Could not record {} as seen, not delivering: {:#}", entry.link, e);
            report.storage_failures += 1;
            return None;
        }

        Some(matched)
    }

    async fn deliver(&self, subscriber: &Subscriber, message: &str, report: &mut CycleReport) {
        match self.notifier.send(subscriber.id, message).await {
            Ok(()) => report.deliveries_sent += 1,
            Err(e) => {
                warn!("Failed to send to {}: {:#}", subscriber.id, e);
                report.deliveries_failed += 1;
            }
        }
    }
}

fn format_tags(categories: &CategorySet) -> String {
    categories
        .iter()
        .map(|category| format!("#{category}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Build the outbound HTML alert for `entry`.
pub fn format_alert(entry: &Entry, categories: &CategorySet) -> String {
    format!(
        "🚨 <b>BREAKING NEWS</b>\n\n<b>{}</b>\n\n{}\n\n<a href='{}'>Read Full Update</a>",
        escape_html(&entry.title),
        format_tags(categories),
        escape_html(&entry.link).replace('\'', "&#39;"),
    )
}
