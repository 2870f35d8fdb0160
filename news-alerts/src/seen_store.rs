use async_trait::async_trait;
use chrono::Utc;
use interfaces::SeenStore;
use sqlx::SqlitePool;

/// `sent_news` table: one row per delivered link, never updated or deleted.
#[derive(Debug, Clone)]
pub struct SqliteSeenStore {
    pool: SqlitePool,
}

impl SqliteSeenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sent_news")
            .fetch_one(&self.pool)
            .await
    }
}

#[async_trait]
impl SeenStore for SqliteSeenStore {
    async fn has(&self, link: &str) -> anyhow::Result<bool> {
        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sent_news WHERE url = ?1")
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn mark_seen(&self, link: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO sent_news (url, delivered_at) VALUES (?1, ?2)")
            .bind(link)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
