use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use interfaces::{
    Category, CategorySet, Entry, FeedSource, Notifier, SeenStore, SubscriberId, SubscriberRegistry,
};
use news_alerts::{CycleReport, Database, Dispatcher, FetchConfig, Fetcher, Result, Taxonomy};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

struct MockSource {
    id: String,
    entries: Vec<Entry>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockSource {
    fn new(id: &str, entries: Vec<Entry>) -> Self {
        Self {
            id: id.to_string(),
            entries,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl FeedSource for MockSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> anyhow::Result<Vec<Entry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.entries.clone())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(SubscriberId, String)>>,
    rejects: Option<SubscriberId>,
}

impl RecordingNotifier {
    fn rejecting(id: SubscriberId) -> Self {
        Self {
            rejects: Some(id),
            ..Self::default()
        }
    }

    fn recipients(&self) -> Vec<SubscriberId> {
        self.sent.lock().expect("lock").iter().map(|(id, _)| *id).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: SubscriberId, text: &str) -> anyhow::Result<()> {
        if self.rejects == Some(recipient) {
            return Err(anyhow!("Forbidden: bot was blocked by the user"));
        }
        self.sent.lock().expect("lock").push((recipient, text.to_string()));
        Ok(())
    }
}

/// Records when each send happened.
#[derive(Default)]
struct TimedNotifier {
    sent_at: Mutex<Vec<Instant>>,
}

#[async_trait]
impl Notifier for TimedNotifier {
    async fn send(&self, _recipient: SubscriberId, _text: &str) -> anyhow::Result<()> {
        self.sent_at.lock().expect("lock").push(Instant::now());
        Ok(())
    }
}

/// Seen store that answers lookups but cannot record anything.
struct ReadOnlySeenStore;

#[async_trait]
impl SeenStore for ReadOnlySeenStore {
    async fn has(&self, _link: &str) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn mark_seen(&self, _link: &str) -> anyhow::Result<()> {
        Err(anyhow!("database is locked"))
    }
}

fn entry(link: &str, title: &str) -> Entry {
    Entry {
        link: link.to_string(),
        title: title.to_string(),
        summary: String::new(),
    }
}

fn categories(list: &[Category]) -> CategorySet {
    list.iter().copied().collect()
}

fn dispatcher(
    database: &Database,
    sources: Vec<Arc<dyn FeedSource>>,
    notifier: Arc<RecordingNotifier>,
    fetch: &FetchConfig,
) -> Dispatcher {
    Dispatcher::new(
        Fetcher::new(sources, fetch),
        Taxonomy::default(),
        Arc::new(database.seen_store()),
        Arc::new(database.subscribers()),
        notifier,
    )
    .with_send_pause(Duration::ZERO)
}

async fn subscribe(database: &Database, id: i64, wanted: &[Category]) -> Result<()> {
    let registry = database.subscribers();
    registry
        .add_or_ignore(SubscriberId(id))
        .await
        .map_err(news_alerts::AlertError::Storage)?;
    registry
        .set_categories(SubscriberId(id), &categories(wanted))
        .await
        .map_err(news_alerts::AlertError::Storage)?;
    Ok(())
}

#[tokio::test]
async fn new_item_is_delivered_exactly_once() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;
    subscribe(&database, 100, &[Category::Economics, Category::Geopolitics]).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(MockSource::new(
        "wire",
        vec![entry("https://x/1", "Gold surges as Fed signals cuts")],
    ))];
    let dispatcher = dispatcher(&database, sources, notifier.clone(), &FetchConfig::default());

    let first = dispatcher.run_cycle().await?;
    assert_eq!(first.items_dispatched, 1);
    assert_eq!(first.deliveries_sent, 1);
    assert!(database.seen_store().has("https://x/1").await.map_err(news_alerts::AlertError::Storage)?);

    {
        let sent = notifier.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, SubscriberId(100));
        assert!(sent[0].1.contains("<b>Gold surges as Fed signals cuts</b>"));
        assert!(sent[0].1.contains("#Economics"));
        assert!(!sent[0].1.contains("#Geopolitics"));
        assert!(sent[0].1.contains("<a href='https://x/1'>"));
    }

    let seen_before = database.seen_store().count().await?;
    let second = dispatcher.run_cycle().await?;
    assert_eq!(database.seen_store().count().await?, seen_before);
    assert_eq!(second.entries_already_seen, 1);
    assert_eq!(second.deliveries_sent, 0);
    assert_eq!(notifier.recipients().len(), 1);
    Ok(())
}

#[tokio::test]
async fn items_route_by_category_intersection() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;
    subscribe(&database, 1, &[Category::Geopolitics]).await?;
    subscribe(&database, 2, &[Category::Economics]).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(MockSource::new(
        "wire",
        vec![
            entry("https://x/nato", "NATO troops deployed"),
            entry("https://x/ecb", "ECB holds rates steady"),
            entry("https://x/school", "fourth grade classroom"),
        ],
    ))];
    let dispatcher = dispatcher(&database, sources, notifier.clone(), &FetchConfig::default());

    let report = dispatcher.run_cycle().await?;

    assert_eq!(report.items_dispatched, 2);
    assert_eq!(report.entries_unmatched, 1);
    let sent = notifier.sent.lock().expect("lock").clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, SubscriberId(1));
    assert!(sent[0].1.contains("NATO troops deployed"));
    assert_eq!(sent[1].0, SubscriberId(2));
    assert!(sent[1].1.contains("ECB holds rates steady"));

    // Unmatched items stay unseen so a later keyword change could still pick them up.
    assert!(!database
        .seen_store()
        .has("https://x/school")
        .await
        .map_err(news_alerts::AlertError::Storage)?);
    Ok(())
}

#[tokio::test]
async fn empty_registry_skips_fetching() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;

    let source = MockSource::new("wire", vec![entry("https://x/1", "Fed raises rates")]);
    let calls = source.calls.clone();
    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(source)];
    let dispatcher = dispatcher(&database, sources, notifier.clone(), &FetchConfig::default());

    let report = dispatcher.run_cycle().await?;

    assert_eq!(
        report,
        CycleReport {
            skipped_no_subscribers: true,
            ..CycleReport::default()
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(database.seen_store().count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn slow_source_does_not_block_the_others() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;
    subscribe(&database, 7, &[Category::Economics, Category::Geopolitics]).await?;

    let fetch = FetchConfig {
        timeout_seconds: 1,
        ..FetchConfig::default()
    };
    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![
        Arc::new(MockSource::new("a", vec![entry("https://a/1", "Fed raises rates")])),
        Arc::new(
            MockSource::new("stuck", vec![entry("https://s/1", "Missile strike reported")])
                .slow(Duration::from_secs(5)),
        ),
        Arc::new(MockSource::new("b", vec![entry("https://b/1", "NATO troops deployed")])),
    ];
    let dispatcher = dispatcher(&database, sources, notifier.clone(), &fetch);

    let started = Instant::now();
    let report = dispatcher.run_cycle().await?;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(report.sources_ok, 2);
    assert_eq!(report.sources_failed, 1);
    assert_eq!(report.deliveries_sent, 2);
    assert!(!database
        .seen_store()
        .has("https://s/1")
        .await
        .map_err(news_alerts::AlertError::Storage)?);
    Ok(())
}

#[tokio::test]
async fn rejected_delivery_does_not_affect_other_recipients() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;
    subscribe(&database, 1, &[Category::Economics]).await?;
    subscribe(&database, 2, &[Category::Economics]).await?;
    subscribe(&database, 3, &[Category::Economics]).await?;

    let notifier = Arc::new(RecordingNotifier::rejecting(SubscriberId(2)));
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(MockSource::new(
        "wire",
        vec![entry("https://x/cpi", "CPI beats expectations")],
    ))];
    let dispatcher = dispatcher(&database, sources, notifier.clone(), &FetchConfig::default());

    let report = dispatcher.run_cycle().await?;

    assert_eq!(report.deliveries_sent, 2);
    assert_eq!(report.deliveries_failed, 1);
    assert_eq!(notifier.recipients(), vec![SubscriberId(1), SubscriberId(3)]);

    // The failed recipient is not retried on the next cycle.
    let again = dispatcher.run_cycle().await?;
    assert_eq!(again.deliveries_sent + again.deliveries_failed, 0);
    Ok(())
}

#[tokio::test]
async fn entries_without_link_are_skipped() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;
    subscribe(&database, 1, &[Category::Economics]).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(MockSource::new(
        "wire",
        vec![entry("", "Fed raises rates"), entry("https://x/2", "Gold at record high")],
    ))];
    let dispatcher = dispatcher(&database, sources, notifier.clone(), &FetchConfig::default());

    let report = dispatcher.run_cycle().await?;

    assert_eq!(report.entries_without_link, 1);
    assert_eq!(report.items_dispatched, 1);
    assert_eq!(database.seen_store().count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn same_link_from_two_sources_is_sent_once() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;
    subscribe(&database, 1, &[Category::Economics]).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![
        Arc::new(MockSource::new("a", vec![entry("https://x/gdp", "GDP contracts")])),
        Arc::new(MockSource::new("b", vec![entry("https://x/gdp", "GDP contracts again")])),
    ];
    let dispatcher = dispatcher(&database, sources, notifier.clone(), &FetchConfig::default());

    let report = dispatcher.run_cycle().await?;

    assert_eq!(report.deliveries_sent, 1);
    assert_eq!(report.entries_already_seen, 1);
    Ok(())
}

#[tokio::test]
async fn failing_mark_seen_aborts_delivery() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;
    subscribe(&database, 1, &[Category::Economics]).await?;

    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(MockSource::new(
        "wire",
        vec![entry("https://x/1", "Fed raises rates")],
    ))];
    let dispatcher = Dispatcher::new(
        Fetcher::new(sources, &FetchConfig::default()),
        Taxonomy::default(),
        Arc::new(ReadOnlySeenStore),
        Arc::new(database.subscribers()),
        notifier.clone(),
    )
    .with_send_pause(Duration::ZERO);

    let report = dispatcher.run_cycle().await?;

    assert_eq!(report.storage_failures, 1);
    assert_eq!(report.items_dispatched, 0);
    assert!(notifier.recipients().is_empty());
    Ok(())
}

#[tokio::test]
async fn delivered_items_stay_seen_after_restart() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("alerts.db").display());
    let feed = vec![entry("https://x/fomc", "FOMC minutes released")];

    let database = Database::connect(&url).await?;
    subscribe(&database, 1, &[Category::Economics]).await?;
    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(MockSource::new("wire", feed.clone()))];
    let report = dispatcher(&database, sources, notifier.clone(), &FetchConfig::default())
        .run_cycle()
        .await?;
    assert_eq!(report.deliveries_sent, 1);
    database.close().await;

    let reopened = Database::connect(&url).await?;
    let notifier = Arc::new(RecordingNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(MockSource::new("wire", feed))];
    let report = dispatcher(&reopened, sources, notifier.clone(), &FetchConfig::default())
        .run_cycle()
        .await?;

    assert_eq!(report.entries_already_seen, 1);
    assert!(notifier.recipients().is_empty());
    Ok(())
}

#[tokio::test]
async fn consecutive_sends_are_spaced_by_the_pause() -> Result<()> {
    init_tracing();
    let database = Database::connect("sqlite::memory:").await?;
    subscribe(&database, 1, &[Category::Economics]).await?;
    subscribe(&database, 2, &[Category::Economics]).await?;

    let pause = Duration::from_millis(50);
    let notifier = Arc::new(TimedNotifier::default());
    let sources: Vec<Arc<dyn FeedSource>> = vec![Arc::new(MockSource::new(
        "wire",
        vec![
            entry("https://x/cpi", "CPI beats expectations"),
            entry("https://x/gdp", "GDP contracts"),
        ],
    ))];
    let dispatcher = Dispatcher::new(
        Fetcher::new(sources, &FetchConfig::default()),
        Taxonomy::default(),
        Arc::new(database.seen_store()),
        Arc::new(database.subscribers()),
        notifier.clone(),
    )
    .with_send_pause(pause);

    let started = Instant::now();
    let report = dispatcher.run_cycle().await?;

    assert_eq!(report.deliveries_sent, 4);
    let sent_at = notifier.sent_at.lock().expect("lock").clone();
    assert_eq!(sent_at.len(), 4);
    assert!(sent_at[0] - started < pause);
    for pair in sent_at.windows(2) {
        assert!(pair[1] - pair[0] >= pause);
    }
    Ok(())
}
