//! In-memory store adapter, analogous to a `Mock*Repository` family:
//! used for local development, and as the backend the integration test
//! suite drives end to end.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::db::store::{
    AccountStore, CommentStore, ErrorStore, PostStore, ScraperStore, Store, SubredditMetadataStore,
    UsageAggregate, UsageStore,
};
use crate::models::scraper::MAX_SUBREDDITS;
use crate::models::{
    Account, Comment, ErrorRow, Post, ScraperRecord, ScraperStatus, SubredditMetadata, UsageRow,
};
use crate::{AppError, Result};

pub fn memory_store() -> Store {
    Store {
        scrapers: std::sync::Arc::new(MemoryScraperStore::default()),
        posts: std::sync::Arc::new(MemoryPostStore::default()),
        comments: std::sync::Arc::new(MemoryCommentStore::default()),
        subreddit_metadata: std::sync::Arc::new(MemorySubredditMetadataStore::default()),
        errors: std::sync::Arc::new(MemoryErrorStore::default()),
        usage: std::sync::Arc::new(MemoryUsageStore::default()),
        accounts: std::sync::Arc::new(MemoryAccountStore::default()),
    }
}

#[derive(Default)]
pub struct MemoryScraperStore {
    records: Mutex<HashMap<String, ScraperRecord>>,
}

#[async_trait]
impl ScraperStore for MemoryScraperStore {
    async fn create(&self, record: ScraperRecord) -> Result<ScraperRecord> {
        let mut guard = self.records.lock().unwrap();
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn load(&self, scraper_id: &str) -> Result<ScraperRecord> {
        let guard = self.records.lock().unwrap();
        guard
            .get(scraper_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))
    }

    async fn list(&self) -> Result<Vec<ScraperRecord>> {
        let guard = self.records.lock().unwrap();
        Ok(guard.values().cloned().collect())
    }

    async fn delete(&self, scraper_id: &str) -> Result<()> {
        let mut guard = self.records.lock().unwrap();
        guard.remove(scraper_id);
        Ok(())
    }

    async fn update_subreddits(&self, scraper_id: &str, new_list: Vec<String>) -> Result<ScraperRecord> {
        if new_list.len() > MAX_SUBREDDITS {
            return Err(AppError::InvariantViolation(format!(
                "subreddit list exceeds max of {}",
                MAX_SUBREDDITS
            )));
        }
        let mut guard = self.records.lock().unwrap();
        let record = guard
            .get_mut(scraper_id)
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;

        let primary = record.primary_subreddit().to_string();
        if !new_list.contains(&primary) {
            return Err(AppError::InvariantViolation(
                "primary subreddit must remain in subreddits".to_string(),
            ));
        }

        let old_set: HashSet<String> = record.subreddits.iter().cloned().collect();
        let new_set: HashSet<String> = new_list.iter().cloned().collect();

        let added: Vec<String> = new_set.difference(&old_set).cloned().collect();
        let removed: Vec<String> = old_set.difference(&new_set).cloned().collect();

        record.subreddits = new_list;
        for a in added {
            record.pending_scrape.insert(a);
        }
        for r in removed {
            record.pending_scrape.remove(&r);
        }
        record.last_updated = Utc::now();
        Ok(record.clone())
    }

    async fn add_subreddits(&self, scraper_id: &str, new_subs: Vec<String>) -> Result<ScraperRecord> {
        let mut guard = self.records.lock().unwrap();
        let record = guard
            .get_mut(scraper_id)
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;

        let mut union = record.subreddits.clone();
        for s in &new_subs {
            if !union.contains(s) {
                union.push(s.clone());
            }
        }
        if union.len() > MAX_SUBREDDITS {
            return Err(AppError::InvariantViolation(format!(
                "subreddit list exceeds max of {}",
                MAX_SUBREDDITS
            )));
        }

        record.subreddits = union;
        for s in &new_subs {
            record.pending_scrape.insert(s.clone());
        }
        record.last_updated = Utc::now();
        Ok(record.clone())
    }

    async fn remove_subreddits(&self, scraper_id: &str, old_subs: Vec<String>) -> Result<ScraperRecord> {
        let mut guard = self.records.lock().unwrap();
        let record = guard
            .get_mut(scraper_id)
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;

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
        Ok(record.clone())
    }

    async fn mark_scraped(&self, scraper_id: &str, subreddit: &str) -> Result<()> {
        let mut guard = self.records.lock().unwrap();
        let record = guard
            .get_mut(scraper_id)
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;
        record.pending_scrape.remove(subreddit);
        Ok(())
    }

    async fn set_status(&self, scraper_id: &str, status: ScraperStatus, last_error: Option<String>) -> Result<()> {
        let mut guard = self.records.lock().unwrap();
        let record = guard
            .get_mut(scraper_id)
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;
        record.status = status;
        record.last_error = last_error;
        record.last_updated = Utc::now();
        Ok(())
    }

    async fn record_cycle(
        &self,
        scraper_id: &str,
        posts_delta: u64,
        comments_delta: u64,
        duration_secs: f64,
    ) -> Result<()> {
        let mut guard = self.records.lock().unwrap();
        let record = guard
            .get_mut(scraper_id)
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;

        let m = &mut record.metrics;
        let n = m.total_cycles as f64;
        m.total_cycles += 1;

        let hours = (duration_secs / 3600.0).max(1.0 / 3600.0);
        let posts_per_hour_this_cycle = posts_delta as f64 / hours;
        let comments_per_hour_this_cycle = comments_delta as f64 / hours;

        // Rolling average over cycles seen so far.
        m.posts_per_hour = (m.posts_per_hour * n + posts_per_hour_this_cycle) / (n + 1.0);
        m.comments_per_hour = (m.comments_per_hour * n + comments_per_hour_this_cycle) / (n + 1.0);
        m.avg_cycle_duration_secs = (m.avg_cycle_duration_secs * n + duration_secs) / (n + 1.0);
        m.last_cycle_at = Some(Utc::now());

        Ok(())
    }

    async fn set_container(&self, scraper_id: &str, container_id: Option<String>, container_name: Option<String>) -> Result<()> {
        let mut guard = self.records.lock().unwrap();
        let record = guard
            .get_mut(scraper_id)
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;
        record.container_id = container_id;
        record.container_name = container_name;
        Ok(())
    }

    async fn increment_restart_count(&self, scraper_id: &str) -> Result<u32> {
        let mut guard = self.records.lock().unwrap();
        let record = guard
            .get_mut(scraper_id)
            .ok_or_else(|| AppError::NotFound(format!("scraper {} not found", scraper_id)))?;
        record.restart_count += 1;
        Ok(record.restart_count)
    }
}

#[derive(Default)]
pub struct MemoryPostStore {
    posts: Mutex<HashMap<String, Post>>,
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn upsert_posts(&self, posts: Vec<Post>) -> Result<(u64, u64)> {
        let mut guard = self.posts.lock().unwrap();
        let mut new_count = 0u64;
        let mut updated_count = 0u64;
        for incoming in posts {
            match guard.get(&incoming.post_id) {
                Some(existing) => {
                    let merged = existing.merge_preserving_tracking(&incoming);
                    guard.insert(incoming.post_id.clone(), merged);
                    updated_count += 1;
                }
                None => {
                    guard.insert(incoming.post_id.clone(), incoming);
                    new_count += 1;
                }
            }
        }
        Ok((new_count, updated_count))
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        Ok(self.posts.lock().unwrap().get(post_id).cloned())
    }

    async fn posts_count(&self, subreddit: &str) -> Result<u64> {
        let guard = self.posts.lock().unwrap();
        Ok(guard.values().filter(|p| p.subreddit == subreddit).count() as u64)
    }

    async fn select_for_comment_pass(&self, subreddit: &str, batch: u32, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let guard = self.posts.lock().unwrap();
        let mut eligible: Vec<Post> = guard
            .values()
            .filter(|p| p.subreddit == subreddit)
            .filter(|p| p.priority_tier(now).is_some())
            .cloned()
            .collect();

        eligible.sort_by(|a, b| {
            // unscraped first, then num_comments desc, then created_at desc
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
        let mut guard = self.posts.lock().unwrap();
        if let Some(post) = guard.get_mut(post_id) {
            post.comments_scraped = true;
            post.initial_comments_scraped = true;
            post.last_comment_fetch_time = Some(now);
            post.comments_scraped_at = Some(now);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCommentStore {
    comments: Mutex<HashMap<String, Comment>>,
}

#[async_trait]
impl CommentStore for MemoryCommentStore {
    async fn upsert_comments(&self, comments: Vec<Comment>) -> Result<u64> {
        let mut guard = self.comments.lock().unwrap();
        let mut inserted = 0u64;
        for c in comments {
            if !guard.contains_key(&c.comment_id) {
                guard.insert(c.comment_id.clone(), c);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn existing_comment_ids(&self, post_id: &str) -> Result<HashSet<String>> {
        let guard = self.comments.lock().unwrap();
        Ok(guard
            .values()
            .filter(|c| c.post_id == post_id)
            .map(|c| c.comment_id.clone())
            .collect())
    }

    async fn verify_comments_present(&self, post_id: &str) -> Result<u64> {
        let guard = self.comments.lock().unwrap();
        Ok(guard.values().filter(|c| c.post_id == post_id).count() as u64)
    }
}

#[derive(Default)]
pub struct MemorySubredditMetadataStore {
    metadata: Mutex<HashMap<String, SubredditMetadata>>,
}

#[async_trait]
impl SubredditMetadataStore for MemorySubredditMetadataStore {
    async fn upsert(&self, metadata: SubredditMetadata) -> Result<()> {
        self.metadata
            .lock()
            .unwrap()
            .insert(metadata.subreddit_name.clone(), metadata);
        Ok(())
    }

    async fn get(&self, subreddit_name: &str) -> Result<Option<SubredditMetadata>> {
        Ok(self.metadata.lock().unwrap().get(subreddit_name).cloned())
    }
}

#[derive(Default)]
pub struct MemoryErrorStore {
    rows: Mutex<Vec<ErrorRow>>,
}

#[async_trait]
impl ErrorStore for MemoryErrorStore {
    async fn append(&self, row: ErrorRow) -> Result<()> {
        self.rows.lock().unwrap().push(row);
        Ok(())
    }

    async fn list(&self, resolved: Option<bool>) -> Result<Vec<ErrorRow>> {
        let guard = self.rows.lock().unwrap();
        Ok(guard
            .iter()
            .filter(|r| resolved.map(|want| r.resolved == want).unwrap_or(true))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryUsageStore {
    rows: Mutex<Vec<UsageRow>>,
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn append(&self, row: UsageRow) -> Result<()> {
        self.rows.lock().unwrap().push(row);
        Ok(())
    }

    async fn aggregate(&self, now: DateTime<Utc>) -> Result<UsageAggregate> {
        let guard = self.rows.lock().unwrap();

        let sum_since = |since: DateTime<Utc>| -> f64 {
            guard
                .iter()
                .filter(|r| r.timestamp >= since)
                .map(|r| r.estimated_cost_usd)
                .sum()
        };

        let today_start = now - Duration::hours(now.hour_of_day());
        let today_usd = sum_since(today_start);
        let last_hour_usd = sum_since(now - Duration::hours(1));
        let week_usd = sum_since(now - Duration::days(7));
        let avg_7day_usd = week_usd / 7.0;
        let monthly_projection_usd = avg_7day_usd * 30.0;

        let mut per_subreddit: HashMap<String, f64> = HashMap::new();
        for r in guard.iter() {
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

trait HourOfDay {
    fn hour_of_day(&self) -> i64;
}

impl HourOfDay for DateTime<Utc> {
    fn hour_of_day(&self) -> i64 {
        use chrono::Timelike;
        self.hour() as i64
    }
}

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Account>>,
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn save(&self, account: Account) -> Result<()> {
        self.accounts
            .lock()
            .unwrap()
            .insert(account.account_name.clone(), account);
        Ok(())
    }

    async fn get(&self, account_name: &str) -> Result<Option<Account>> {
        Ok(self.accounts.lock().unwrap().get(account_name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParentType, ScraperConfig, ScraperMetrics, ScraperType};
    use std::collections::HashSet as Set;

    fn record(id: &str) -> ScraperRecord {
        ScraperRecord {
            id: id.to_string(),
            subreddits: vec![id.to_string()],
            pending_scrape: Set::new(),
            scraper_type: ScraperType::Posts,
            config: ScraperConfig::default(),
            sealed_credentials: vec![],
            account_name: None,
            status: ScraperStatus::Configured,
            auto_restart: true,
            restart_count: 0,
            metrics: ScraperMetrics::default(),
            last_error: None,
            container_id: None,
            container_name: None,
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn add_then_remove_is_identity_for_non_primary() {
        let store = MemoryScraperStore::default();
        store.create(record("examplesub")).await.unwrap();

        store
            .add_subreddits("examplesub", vec!["extra".to_string()])
            .await
            .unwrap();
        let after_add = store.load("examplesub").await.unwrap();
        assert!(after_add.subreddits.contains(&"extra".to_string()));

        store
            .remove_subreddits("examplesub", vec!["extra".to_string()])
            .await
            .unwrap();
        let after_remove = store.load("examplesub").await.unwrap();
        assert_eq!(after_remove.subreddits, vec!["examplesub".to_string()]);
    }

    #[tokio::test]
    async fn removing_primary_subreddit_is_rejected() {
        let store = MemoryScraperStore::default();
        store.create(record("examplesub")).await.unwrap();

        let result = store
            .remove_subreddits("examplesub", vec!["examplesub".to_string()])
            .await;
        assert!(matches!(result, Err(AppError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn add_subreddits_over_cap_is_rejected_without_mutating_record() {
        let store = MemoryScraperStore::default();
        store.create(record("examplesub")).await.unwrap();

        let overflow: Vec<String> = (0..MAX_SUBREDDITS).map(|i| format!("sub{}", i)).collect();
        let result = store.add_subreddits("examplesub", overflow).await;
        assert!(matches!(result, Err(AppError::InvariantViolation(_))));

        let after = store.load("examplesub").await.unwrap();
        assert_eq!(after.subreddits, vec!["examplesub".to_string()]);
        assert!(after.pending_scrape.is_empty());
    }

    #[tokio::test]
    async fn replace_is_idempotent() {
        let store = MemoryScraperStore::default();
        store.create(record("a")).await.unwrap();
        store
            .update_subreddits("a", vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        let first = store.load("a").await.unwrap();
        store
            .update_subreddits("a", vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        let second = store.load("a").await.unwrap();

        assert_eq!(first.subreddits, second.subreddits);
        assert_eq!(first.pending_scrape, second.pending_scrape);
    }

    #[tokio::test]
    async fn upsert_same_batch_repeatedly_is_one_row() {
        let store = MemoryPostStore::default();
        let post = Post {
            post_id: "t3_x".to_string(),
            subreddit: "examplesub".to_string(),
            title: "t".to_string(),
            url: "u".to_string(),
            selftext: String::new(),
            author: "a".to_string(),
            score: 1,
            num_comments: 0,
            created_at: Utc::now(),
            comments_scraped: false,
            initial_comments_scraped: false,
            last_comment_fetch_time: None,
            comments_scraped_at: None,
        };

        for _ in 0..3 {
            store.upsert_posts(vec![post.clone()]).await.unwrap();
        }
        assert_eq!(store.posts_count("examplesub").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_comment_ids_are_ignored() {
        let store = MemoryCommentStore::default();
        let comment = Comment {
            comment_id: "t1_a".to_string(),
            post_id: "t3_x".to_string(),
            parent_id: None,
            parent_type: ParentType::Post,
            depth: 0,
            author: "a".to_string(),
            body: "hi".to_string(),
            score: 1,
            created_at: Utc::now(),
        };

        let first = store.upsert_comments(vec![comment.clone()]).await.unwrap();
        let second = store.upsert_comments(vec![comment]).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(store.verify_comments_present("t3_x").await.unwrap(), 1);
    }
}
