use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use interfaces::{Category, Notifier};
use news_alerts::{
    build_bot_client, run_command_loop, AlertConfig, AlertJob, CommandHandler, Database,
    Dispatcher, Fetcher, SchedulerService, TelegramClient,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "news-alerts", about = "Keyword-routed breaking news alerts over Telegram")]
struct Cli {
    /// JSON configuration file; omitted fields use built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    bot_token: String,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://news_alerts.db")]
    database_url: String,

    /// Run a single polling cycle and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("news_alerts=info,interfaces=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AlertConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AlertConfig::default(),
    };
    info!(
        "Watching {} feeds every {:?}",
        config.feeds.len(),
        config.poll_interval()
    );
    for category in Category::ALL {
        info!("  {}: {} keywords", category, config.taxonomy.keywords(category).len());
    }

    let database = Database::connect(&cli.database_url)
        .await
        .context("opening database")?;
    let seen = database.seen_store();
    info!("{} items already delivered", seen.count().await?);

    let fetcher = Fetcher::from_urls(&config.feeds, &config.fetch)?;
    let telegram = TelegramClient::new(
        build_bot_client(&config.telegram)?,
        config.telegram.api_base.clone(),
        cli.bot_token.clone(),
    );
    let notifier: Arc<dyn Notifier> = Arc::new(telegram.clone());
    let registry = Arc::new(database.subscribers());

    let dispatcher = Arc::new(
        Dispatcher::new(
            fetcher,
            config.taxonomy.clone(),
            Arc::new(seen),
            registry.clone(),
            notifier.clone(),
        )
        .with_send_pause(config.send_pause()),
    );

    if cli.once {
        let report = dispatcher.run_cycle().await?;
        info!("Single cycle finished: {:?}", report);
        database.close().await;
        return Ok(());
    }

    let scheduler = SchedulerService::new().with_job(AlertJob::new(dispatcher, config.poll_interval()));
    let jobs = scheduler.start();

    let handler = match telegram.bot_username().await {
        Ok(username) => {
            info!("Answering commands as @{}", username);
            CommandHandler::new(registry).with_bot_username(username)
        }
        Err(e) => {
            warn!("Could not look up bot username, accepting all command mentions: {}", e);
            CommandHandler::new(registry)
        }
    };
    let commands = tokio::spawn(run_command_loop(
        telegram.updates(&config.telegram),
        notifier,
        handler,
    ));

    info!("News alerts running, press Ctrl-C to stop");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        }
        result = commands => {
            error!("Command loop exited unexpectedly: {:?}", result);
        }
    }

    for job in jobs {
        job.abort();
    }
    database.close().await;
    Ok(())
}
