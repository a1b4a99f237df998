//! Trait abstractions over the document store. The store itself is an
//! external collaborator — only its interface lives here. Collections:
//! `posts`, `comments`, `subreddit_metadata`, `scrapers`, `accounts`,
//! `errors`, `usage`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{
    Account, Comment, ErrorRow, Post, ScraperRecord, ScraperStatus, ScraperType, SubredditMetadata,
    UsageRow,
};
use crate::Result;

/// Scraper Queue State. All operations are individually
/// atomic (single-document compare-and-set); the worker only ever
/// *removes* from `pending_scrape` and updates `metrics`, the Queue
/// Mutation API only *edits* `subreddits` and *adds* to `pending_scrape` —
/// these commute, so no cross-writer lock is required beyond per-record
/// atomicity.
#[async_trait]
pub trait ScraperStore: Send + Sync {
    async fn create(&self, record: ScraperRecord) -> Result<ScraperRecord>;
    async fn load(&self, scraper_id: &str) -> Result<ScraperRecord>;
    async fn list(&self) -> Result<Vec<ScraperRecord>>;
    async fn delete(&self, scraper_id: &str) -> Result<()>;

    /// Replace `subreddits` wholesale; diff against the prior list to
    /// update `pending_scrape` (additions go in, removals are purged).
    async fn update_subreddits(&self, scraper_id: &str, new_list: Vec<String>) -> Result<ScraperRecord>;

    /// Union `new_subs` into `subreddits` and into `pending_scrape`.
    async fn add_subreddits(&self, scraper_id: &str, new_subs: Vec<String>) -> Result<ScraperRecord>;

    /// Set-minus `old_subs` from both `subreddits` and `pending_scrape`.
    /// Rejects removal of the primary subreddit.
    async fn remove_subreddits(&self, scraper_id: &str, old_subs: Vec<String>) -> Result<ScraperRecord>;

    async fn mark_scraped(&self, scraper_id: &str, subreddit: &str) -> Result<()>;
    async fn set_status(&self, scraper_id: &str, status: ScraperStatus, last_error: Option<String>) -> Result<()>;
    async fn record_cycle(
        &self,
        scraper_id: &str,
        posts_delta: u64,
        comments_delta: u64,
        duration_secs: f64,
    ) -> Result<()>;
    async fn set_container(&self, scraper_id: &str, container_id: Option<String>, container_name: Option<String>) -> Result<()>;
    async fn increment_restart_count(&self, scraper_id: &str) -> Result<u32>;
}

/// Store Adapter post contracts.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Merges new content with existing rows, never overwriting tracking
    /// fields that are already set. Returns `(new_posts, updated_posts)`.
    async fn upsert_posts(&self, posts: Vec<Post>) -> Result<(u64, u64)>;
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>>;
    async fn posts_count(&self, subreddit: &str) -> Result<u64>;

    /// Selection for the comments worker: posts eligible
    /// under any priority tier, ordered unscraped-first, then
    /// `num_comments DESC`, then `created_at DESC`, limited to `batch`.
    async fn select_for_comment_pass(&self, subreddit: &str, batch: u32, now: DateTime<Utc>) -> Result<Vec<Post>>;

    async fn mark_comments_scraped(&self, post_id: &str, now: DateTime<Utc>) -> Result<()>;
}

/// Store Adapter comment contracts.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Inserts with `comment_id` as unique key; duplicates silently ignored.
    async fn upsert_comments(&self, comments: Vec<Comment>) -> Result<u64>;

    /// The deduplication oracle.
    async fn existing_comment_ids(&self, post_id: &str) -> Result<HashSet<String>>;

    /// Fresh read-back, MUST NOT be served from a cache populated by the
    /// write it is verifying.
    async fn verify_comments_present(&self, post_id: &str) -> Result<u64>;
}

#[async_trait]
pub trait SubredditMetadataStore: Send + Sync {
    async fn upsert(&self, metadata: SubredditMetadata) -> Result<()>;
    async fn get(&self, subreddit_name: &str) -> Result<Option<SubredditMetadata>>;
}

#[async_trait]
pub trait ErrorStore: Send + Sync {
    async fn append(&self, row: ErrorRow) -> Result<()>;
    async fn list(&self, resolved: Option<bool>) -> Result<Vec<ErrorRow>>;
}

/// Aggregation queries are pure reductions over stored rows.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageAggregate {
    pub today_usd: f64,
    pub last_hour_usd: f64,
    pub avg_7day_usd: f64,
    pub monthly_projection_usd: f64,
    pub per_subreddit: Vec<(String, f64)>,
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn append(&self, row: UsageRow) -> Result<()>;
    async fn aggregate(&self, now: DateTime<Utc>) -> Result<UsageAggregate>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn save(&self, account: Account) -> Result<()>;
    async fn get(&self, account_name: &str) -> Result<Option<Account>>;
}

/// Bundles every collection adapter behind one handle, the shape workers
/// and routes are constructed with.
#[derive(Clone)]
pub struct Store {
    pub scrapers: std::sync::Arc<dyn ScraperStore>,
    pub posts: std::sync::Arc<dyn PostStore>,
    pub comments: std::sync::Arc<dyn CommentStore>,
    pub subreddit_metadata: std::sync::Arc<dyn SubredditMetadataStore>,
    pub errors: std::sync::Arc<dyn ErrorStore>,
    pub usage: std::sync::Arc<dyn UsageStore>,
    pub accounts: std::sync::Arc<dyn AccountStore>,
}

// Kept for call sites that only care about scraper type labeling on usage rows.
pub fn scraper_type_label(t: ScraperType) -> &'static str {
    match t {
        ScraperType::Posts => "posts",
        ScraperType::Comments => "comments",
    }
}
