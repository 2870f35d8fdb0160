pub mod types;
pub mod categorizer;
pub mod parser;
pub mod sources;
pub mod fetcher;
pub mod database;
pub mod seen_store;
pub mod subscribers;
pub mod telegram;
pub mod pipeline;
pub mod scheduler;
pub mod commands;

pub use types::*;
pub use categorizer::Taxonomy;
pub use parser::FeedParser;
pub use sources::HttpFeedSource;
pub use fetcher::{Fetcher, FetchSummary};
pub use database::Database;
pub use seen_store::SqliteSeenStore;
pub use subscribers::SqliteSubscriberRegistry;
pub use telegram::{build_bot_client, TelegramClient, TelegramUpdates};
pub use pipeline::{format_alert, Dispatcher};
pub use scheduler::{AlertJob, SchedulerJob, SchedulerService};
pub use commands::{run_command_loop, Command, CommandHandler};
