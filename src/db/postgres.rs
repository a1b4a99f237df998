// PostgreSQL-backed store adapter. Production-shaped counterpart to
// `db::memory` — same trait surface, persisted via sqlx. Schema is
// created eagerly on connect (`CREATE TABLE IF NOT EXISTS`) rather than
// through a separate migration tool, mirroring how small services in
// this stack bootstrap their own schema on boot.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::db::store::{
    AccountStore, CommentStore, ErrorStore, PostStore, ScraperStore, Store, SubredditMetadataStore,
    UsageAggregate, UsageStore,
};
use crate::models::scraper::MAX_SUBREDDITS;
use crate::models::{
    Account, Comment, ErrorRow, Post, ScraperRecord, ScraperStatus, SubredditMetadata, UsageRow,
};
use crate::{AppError, Result};

pub struct PostgresDatabase {
    pub pool: Arc<PgPool>,
}

impl PostgresDatabase {
    pub async fn new(database_url: &str) -> Result<Self> {
        tracing::info!("🔗 DATABASE_RESILIENCE: Configuring connection pool");
        tracing::info!("   📊 Max connections: 20");
        tracing::info!("   ⏰ Connection timeout: 30s");
        tracing::info!("   ⏳ Idle timeout: 10m");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .idle_timeout(StdDuration::from_secs(600))
            .max_lifetime(StdDuration::from_secs(3600))
            .acquire_timeout(StdDuration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| {
                tracing::error!("❌ DATABASE_RESILIENCE: Failed to create connection pool: {}", e);
                AppError::DatabaseError(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        let db = Self { pool: Arc::new(pool) };
        db.ensure_schema().await?;
        tracing::info!("✅ DATABASE_RESILIENCE: Connection pool configured successfully");
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            r#"CREATE TABLE IF NOT EXISTS scrapers (
                id TEXT PRIMARY KEY,
                record JSONB NOT NULL,
                last_updated TIMESTAMPTZ NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS posts (
                post_id TEXT PRIMARY KEY,
                subreddit TEXT NOT NULL,
                record JSONB NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS posts_subreddit_idx ON posts (subreddit)",
            r#"CREATE TABLE IF NOT EXISTS comments (
                comment_id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                record JSONB NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS comments_post_id_idx ON comments (post_id)",
            r#"CREATE TABLE IF NOT EXISTS subreddit_metadata (
                subreddit_name TEXT PRIMARY KEY,
                record JSONB NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS errors (
                id BIGSERIAL PRIMARY KEY,
                record JSONB NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS usage (
                id BIGSERIAL PRIMARY KEY,
                subreddit TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                record JSONB NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS accounts (
                account_name TEXT PRIMARY KEY,
                record JSONB NOT NULL
            )"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&*self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("schema init failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn into_store(self) -> Store {
        let pool = self.pool;
        Store {
            scrapers: Arc::new(PgScraperStore { pool: pool.clone() }),
            posts: Arc::new(PgPostStore { pool: pool.clone() }),
            comments: Arc::new(PgCommentStore { pool: pool.clone() }),
            subreddit_metadata: Arc::new(PgSubredditMetadataStore { pool: pool.clone() }),
            errors: Arc::new(PgErrorStore { pool: pool.clone() }),
            usage: Arc::new(PgUsageStore { pool: pool.clone() }),
            accounts: Arc::new(PgAccountStore { pool }),
        }
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

pub struct PgScraperStore {
    pool: Arc<PgPool>,
}

impl PgScraperStore {
    async fn load_row(&self, scraper_id: &str) -> Result<ScraperRecord> {
        let row = sqlx::query("SELECT record FROM scrapers WHERE id = $1")
            .bind(scraper_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;
        let value: serde_json::Value = row.try_get("record").map_err(db_err)?;
        serde_json::from_value(value).map_err(AppError::from)
    }

    async fn save_row(&self, record: &ScraperRecord) -> Result<()> {
        let value = serde_json::to_value(record)?;
        sqlx::query(
            "INSERT INTO scrapers (id, record, last_updated) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET record = EXCLUDED.record, last_updated = EXCLUDED.last_updated",
        )
        .bind(&record.id)
        .bind(value)
        .bind(record.last_updated)
        .execute(&*self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl ScraperStore for PgScraperStore {
    async fn create(&self, record: ScraperRecord) -> Result<ScraperRecord> {
        self.save_row(&record).await?;
        Ok(record)
    }

    async fn load(&self, scraper_id: &str) -> Result<ScraperRecord> {
        self.load_row(scraper_id).await
    }

    async fn list(&self) -> Result<Vec<ScraperRecord>> {
        let rows = sqlx::query("SELECT record FROM scrapers")
            .fetch_all(&*self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter()
            .map(|row| {
                let value: serde_json::Value = row.try_get("record").map_err(db_err)?;
                serde_json::from_value(value).map_err(AppError::from)
            })
            .collect()
    }

    async fn delete(&self, scraper_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scrapers WHERE id = $1")
            .bind(scraper_id)
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_subreddits(&self, scraper_id: &str, new_list: Vec<String>) -> Result<ScraperRecord> {
        if new_list.len() > MAX_SUBREDDITS {
            return Err(AppError::InvariantViolation(format!(
                "subreddit list exceeds max of {}",
                MAX_SUBREDDITS
            )));
        }
        let mut record = self.load_row(scraper_id).await?;
        let primary = record.primary_subreddit().to_string();
        if !new_list.contains(&primary) {
            return Err(AppError::InvariantViolation(
                "primary subreddit must remain in subreddits".to_string(),
            ));
        }

        let old_set: HashSet<String> = record.subreddits.iter().cloned().collect();
        let new_set: HashSet<String> = new_list.iter().cloned().collect();
        for added in new_set.difference(&old_set) {
            record.pending_scrape.insert(added.clone());
        }
        for removed in old_set.difference(&new_set) {
            record.pending_scrape.remove(removed);
        }
        record.subreddits = new_list;
        record.last_updated = Utc::now();
        self.save_row(&record).await?;
        Ok(record)
    }

    async fn add_subreddits(&self, scraper_id: &str, new_subs: Vec<String>) -> Result<ScraperRecord> {
        let mut record = self.load_row(scraper_id).await?;
        for s in &new_subs {
            if !record.subreddits.contains(s) {
                record.subreddits.push(s.clone());
            }
            record.pending_scrape.insert(s.clone());
        }
        if record.subreddits.len() > MAX_SUBREDDITS {
            return Err(AppError::InvariantViolation(format!(
                "subreddit list exceeds max of {}",
                MAX_SUBREDDITS
            )));
        }
        record.last_updated = Utc::now();
        self.save_row(&record).await?;
        Ok(record)
    }

    async fn remove_subreddits(&self, scraper_id: &str, old_subs: Vec<String>) -> Result<ScraperRecord> {
        let mut record = self.load_row(scraper_id).await?;
        let primary = record.primary_subreddit().to_string();
        if old_subs.iter().any(|s| s == &primary) {
            return Err(AppError::InvariantViolation(
                "the primary subreddit cannot be removed".to_string(),
            ));
        }
        let remove_set: HashSet<&String> = old_subs.iter().collect();
        record.subreddits.retain(|s| !remove_set.contains(s));
        for s in &old_subs {
            record.pending_scrape.remove(s);
        }
        record.last_updated = Utc::now();
        self.save_row(&record).await?;
        Ok(record)
    }

    async fn mark_scraped(&self, scraper_id: &str, subreddit: &str) -> Result<()> {
        let mut record = self.load_row(scraper_id).await?;
        record.pending_scrape.remove(subreddit);
        self.save_row(&record).await
    }

    async fn set_status(&self, scraper_id: &str, status: ScraperStatus, last_error: Option<String>) -> Result<()> {
        let mut record = self.load_row(scraper_id).await?;
        record.status = status;
        record.last_error = last_error;
        record.last_updated = Utc::now();
        self.save_row(&record).await
    }

    async fn record_cycle(&self, scraper_id: &str, posts_delta: u64, comments_delta: u64, duration_secs: f64) -> Result<()> {
        let mut record = self.load_row(scraper_id).await?;
        let m = &mut record.metrics;
        let n = m.total_cycles as f64;
        m.total_cycles += 1;
        let hours = (duration_secs / 3600.0).max(1.0 / 3600.0);
        m.posts_per_hour = (m.posts_per_hour * n + posts_delta as f64 / hours) / (n + 1.0);
        m.comments_per_hour = (m.comments_per_hour * n + comments_delta as f64 / hours) / (n + 1.0);
        m.avg_cycle_duration_secs = (m.avg_cycle_duration_secs * n + duration_secs) / (n + 1.0);
        m.last_cycle_at = Some(Utc::now());
        self.save_row(&record).await
    }

    async fn set_container(&self, scraper_id: &str, container_id: Option<String>, container_name: Option<String>) -> Result<()> {
        let mut record = self.load_row(scraper_id).await?;
        record.container_id = container_id;
        record.container_name = container_name;
        self.save_row(&record).await
    }

    async fn increment_restart_count(&self, scraper_id: &str) -> Result<u32> {
        let mut record = self.load_row(scraper_id).await?;
        record.restart_count += 1;
        self.save_row(&record).await?;
        Ok(record.restart_count)
    }
}

pub struct PgPostStore {
    pool: Arc<PgPool>,
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn upsert_posts(&self, posts: Vec<Post>) -> Result<(u64, u64)> {
        let mut new_count = 0u64;
        let mut updated_count = 0u64;
        for incoming in posts {
            let existing_row = sqlx::query("SELECT record FROM posts WHERE post_id = $1")
                .bind(&incoming.post_id)
                .fetch_optional(&*self.pool)
                .await
                .map_err(db_err)?;

            let merged = match existing_row {
                Some(row) => {
                    let value: serde_json::Value = row.try_get("record").map_err(db_err)?;
                    let existing: Post = serde_json::from_value(value)?;
                    updated_count += 1;
                    existing.merge_preserving_tracking(&incoming)
                }
                None => {
                    new_count += 1;
                    incoming
                }
            };

            let value = serde_json::to_value(&merged)?;
            sqlx::query(
                "INSERT INTO posts (post_id, subreddit, record) VALUES ($1, $2, $3)
                 ON CONFLICT (post_id) DO UPDATE SET record = EXCLUDED.record",
            )
            .bind(&merged.post_id)
            .bind(&merged.subreddit)
            .bind(value)
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        }
        Ok((new_count, updated_count))
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT record FROM posts WHERE post_id = $1")
            .bind(post_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("record").map_err(db_err)?;
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    async fn posts_count(&self, subreddit: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM posts WHERE subreddit = $1")
            .bind(subreddit)
            .fetch_one(&*self.pool)
            .await
            .map_err(db_err)?;
        let cnt: i64 = row.try_get("cnt").map_err(db_err)?;
        Ok(cnt as u64)
    }

    async fn select_for_comment_pass(&self, subreddit: &str, batch: u32, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let rows = sqlx::query("SELECT record FROM posts WHERE subreddit = $1")
            .bind(subreddit)
            .fetch_all(&*self.pool)
            .await
            .map_err(db_err)?;

        let mut eligible: Vec<Post> = rows
            .into_iter()
            .filter_map(|row| {
                let value: serde_json::Value = row.try_get("record").ok()?;
                serde_json::from_value::<Post>(value).ok()
            })
            .filter(|p| p.priority_tier(now).is_some())
            .collect();

        eligible.sort_by(|a, b| {
            let a_unscraped = !a.initial_comments_scraped;
            let b_unscraped = !b.initial_comments_scraped;
            b_unscraped
                .cmp(&a_unscraped)
                .then(b.num_comments.cmp(&a.num_comments))
                .then(b.created_at.cmp(&a.created_at))
        });
        eligible.truncate(batch as usize);
        Ok(eligible)
    }

    async fn mark_comments_scraped(&self, post_id: &str, now: DateTime<Utc>) -> Result<()> {
        if let Some(mut post) = self.get_post(post_id).await? {
            post.comments_scraped = true;
            post.initial_comments_scraped = true;
            post.last_comment_fetch_time = Some(now);
            post.comments_scraped_at = Some(now);
            let value = serde_json::to_value(&post)?;
            sqlx::query("UPDATE posts SET record = $2 WHERE post_id = $1")
                .bind(post_id)
                .bind(value)
                .execute(&*self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }
}

pub struct PgCommentStore {
    pool: Arc<PgPool>,
}

#[async_trait]
impl CommentStore for PgCommentStore {
    async fn upsert_comments(&self, comments: Vec<Comment>) -> Result<u64> {
        let mut inserted = 0u64;
        for c in comments {
            let value = serde_json::to_value(&c)?;
            let result = sqlx::query(
                "INSERT INTO comments (comment_id, post_id, record) VALUES ($1, $2, $3)
                 ON CONFLICT (comment_id) DO NOTHING",
            )
            .bind(&c.comment_id)
            .bind(&c.post_id)
            .bind(value)
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn existing_comment_ids(&self, post_id: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT comment_id FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_all(&*self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter()
            .map(|row| row.try_get::<String, _>("comment_id").map_err(db_err))
            .collect()
    }

    async fn verify_comments_present(&self, post_id: &str) -> Result<u64> {
        // Always a fresh SELECT — never served from the write path's cache.
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&*self.pool)
            .await
            .map_err(db_err)?;
        let cnt: i64 = row.try_get("cnt").map_err(db_err)?;
        Ok(cnt as u64)
    }
}

pub struct PgSubredditMetadataStore {
    pool: Arc<PgPool>,
}

#[async_trait]
impl SubredditMetadataStore for PgSubredditMetadataStore {
    async fn upsert(&self, metadata: SubredditMetadata) -> Result<()> {
        let value = serde_json::to_value(&metadata)?;
        sqlx::query(
            "INSERT INTO subreddit_metadata (subreddit_name, record) VALUES ($1, $2)
             ON CONFLICT (subreddit_name) DO UPDATE SET record = EXCLUDED.record",
        )
        .bind(&metadata.subreddit_name)
        .bind(value)
        .execute(&*self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, subreddit_name: &str) -> Result<Option<SubredditMetadata>> {
        let row = sqlx::query("SELECT record FROM subreddit_metadata WHERE subreddit_name = $1")
            .bind(subreddit_name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("record").map_err(db_err)?;
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }
}

pub struct PgErrorStore {
    pool: Arc<PgPool>,
}

#[async_trait]
impl ErrorStore for PgErrorStore {
    async fn append(&self, row: ErrorRow) -> Result<()> {
        let value = serde_json::to_value(&row)?;
        sqlx::query("INSERT INTO errors (record) VALUES ($1)")
            .bind(value)
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn list(&self, resolved: Option<bool>) -> Result<Vec<ErrorRow>> {
        let rows = sqlx::query("SELECT record FROM errors")
            .fetch_all(&*self.pool)
            .await
            .map_err(db_err)?;
        let all: Vec<ErrorRow> = rows
            .into_iter()
            .filter_map(|row| {
                let value: serde_json::Value = row.try_get("record").ok()?;
                serde_json::from_value(value).ok()
            })
            .collect();
        Ok(all
            .into_iter()
            .filter(|r| resolved.map(|want| r.resolved == want).unwrap_or(true))
            .collect())
    }
}

pub struct PgUsageStore {
    pool: Arc<PgPool>,
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn append(&self, row: UsageRow) -> Result<()> {
        let value = serde_json::to_value(&row)?;
        sqlx::query("INSERT INTO usage (subreddit, timestamp, record) VALUES ($1, $2, $3)")
            .bind(&row.subreddit)
            .bind(row.timestamp)
            .bind(value)
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn aggregate(&self, now: DateTime<Utc>) -> Result<UsageAggregate> {
        let since = now - Duration::days(7);
        let rows = sqlx::query("SELECT record FROM usage WHERE timestamp >= $1")
            .bind(since)
            .fetch_all(&*self.pool)
            .await
            .map_err(db_err)?;

        let parsed: Vec<UsageRow> = rows
            .into_iter()
            .filter_map(|row| {
                let value: serde_json::Value = row.try_get("record").ok()?;
                serde_json::from_value(value).ok()
            })
            .collect();

        let sum_since = |since: DateTime<Utc>| -> f64 {
            parsed
                .iter()
                .filter(|r| r.timestamp >= since)
                .map(|r| r.estimated_cost_usd)
                .sum()
        };

        use chrono::Timelike;
        let today_start = now - Duration::hours(now.hour() as i64);
        let today_usd = sum_since(today_start);
        let last_hour_usd = sum_since(now - Duration::hours(1));
        let week_usd: f64 = parsed.iter().map(|r| r.estimated_cost_usd).sum();
        let avg_7day_usd = week_usd / 7.0;
        let monthly_projection_usd = avg_7day_usd * 30.0;

        let mut per_subreddit: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        for r in &parsed {
            *per_subreddit.entry(r.subreddit.clone()).or_insert(0.0) += r.estimated_cost_usd;
        }
        let mut per_subreddit: Vec<(String, f64)> = per_subreddit.into_iter().collect();
        per_subreddit.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(UsageAggregate {
            today_usd,
            last_hour_usd,
            avg_7day_usd,
            monthly_projection_usd,
            per_subreddit,
        })
    }
}

pub struct PgAccountStore {
    pool: Arc<PgPool>,
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn save(&self, account: Account) -> Result<()> {
        let value = serde_json::to_value(&account)?;
        sqlx::query(
            "INSERT INTO accounts (account_name, record) VALUES ($1, $2)
             ON CONFLICT (account_name) DO UPDATE SET record = EXCLUDED.record",
        )
        .bind(&account.account_name)
        .bind(value)
        .execute(&*self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, account_name: &str) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT record FROM accounts WHERE account_name = $1")
            .bind(account_name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let value: serde_json::Value = row.try_get("record").map_err(db_err)?;
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }
}
