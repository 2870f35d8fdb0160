use async_trait::async_trait;
use chrono::Utc;
use interfaces::{Category, CategorySet, Subscriber, SubscriberId, SubscriberRegistry};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// `subscribers` table. Category sets are stored as a comma-separated label
/// list; the encoding never leaves this module.
#[derive(Debug, Clone)]
pub struct SqliteSubscriberRegistry {
    pool: SqlitePool,
}

impl SqliteSubscriberRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn encode_categories(categories: &CategorySet) -> String {
    categories
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_categories(raw: &str) -> CategorySet {
    let mut categories = CategorySet::new();
    for label in raw.split(',').filter(|label| !label.trim().is_empty()) {
        match label.parse::<Category>() {
            Ok(category) => {
                categories.insert(category);
            }
            Err(e) => warn!("Ignoring stored {}", e),
        }
    }

    if categories.is_empty() {
        warn!("Stored category list {:?} is empty, treating as all categories", raw);
        return Category::all();
    }
    categories
}

#[async_trait]
impl SubscriberRegistry for SqliteSubscriberRegistry {
    async fn add_or_ignore(&self, id: SubscriberId) -> anyhow::Result<bool> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO subscribers (chat_id, categories, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(id.0)
        .bind(encode_categories(&Category::all()))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            info!("Registered subscriber {}", id);
        }
        Ok(inserted)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<Subscriber>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT chat_id, categories FROM subscribers ORDER BY chat_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(chat_id, categories)| Subscriber {
                id: SubscriberId(chat_id),
                categories: decode_categories(&categories),
            })
            .collect())
    }

    async fn get_categories(&self, id: SubscriberId) -> anyhow::Result<Option<CategorySet>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT categories FROM subscribers WHERE chat_id = ?1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.as_deref().map(decode_categories))
    }

    async fn set_categories(&self, id: SubscriberId, categories: &CategorySet) -> anyhow::Result<bool> {
        if categories.is_empty() {
            anyhow::bail!("subscriber {} must keep at least one category", id);
        }

        let updated = sqlx::query("UPDATE subscribers SET categories = ?1 WHERE chat_id = ?2")
            .bind(encode_categories(categories))
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;
        Ok(updated)
    }
}
