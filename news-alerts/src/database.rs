use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::seen_store::SqliteSeenStore;
use crate::subscribers::SqliteSubscriberRegistry;
use crate::types::Result;

/// Shared SQLite pool backing the seen-item store and the subscriber registry.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `database_url` and apply
    /// pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database ready at {}", database_url);
        Ok(Self { pool })
    }

    pub fn seen_store(&self) -> SqliteSeenStore {
        SqliteSeenStore::new(self.pool.clone())
    }

    pub fn subscribers(&self) -> SqliteSubscriberRegistry {
        SqliteSubscriberRegistry::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
