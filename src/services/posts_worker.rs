//! Posts Worker: rotation loop over a scraper's subreddit list,
//! pending-first, fetching posts across configured sort orders and
//! upserting with tracking-field preservation. Shares its rotation
//! skeleton shape with `comments_worker` structurally rather than through
//! inheritance.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::db::store::Store;
use crate::models::{Post, ScraperRecord, ScraperType};
use crate::services::rate_limiter::RateLimitOracle;
use crate::services::reddit_client::RedditTransport;
use crate::Result;

pub struct PostsWorker {
    pub scraper_id: String,
    pub store: Store,
    pub transport: Arc<dyn RedditTransport>,
    pub oracle: Arc<RateLimitOracle>,
}

impl PostsWorker {
    pub fn new(scraper_id: String, store: Store, transport: Arc<dyn RedditTransport>, oracle: Arc<RateLimitOracle>) -> Self {
        Self { scraper_id, store, transport, oracle }
    }

    /// Runs until `shutdown` fires. Every suspension point re-checks the
    /// shutdown signal so a stop request is never stuck behind a sleep.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let cycle_start = Instant::now();
            let record = match self.store.scrapers.load(&self.scraper_id).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(scraper_id = %self.scraper_id, error = %e, "failed to load scraper record");
                    tokio::select! {
                        _ = sleep(Duration::from_secs(10)) => {}
                        _ = shutdown.changed() => {}
                    }
                    continue;
                }
            };

            if record.subreddits.is_empty() {
                tracing::warn!(scraper_id = %self.scraper_id, "empty subreddit queue, sleeping");
                tokio::select! {
                    _ = sleep(Duration::from_secs(60)) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }

            let (mut new_total, mut updated_total) = (0u64, 0u64);
            let cycle_list = cycle_order(&record);

            for subreddit in cycle_list {
                if *shutdown.borrow() {
                    break;
                }

                // Re-load at the start of every iteration so a subreddit
                // removed mid-cycle drops out before it's fetched.
                let fresh = match self.store.scrapers.load(&self.scraper_id).await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::error!(scraper_id = %self.scraper_id, error = %e, "reload failed mid-cycle");
                        continue;
                    }
                };
                if !fresh.subreddits.contains(&subreddit) {
                    continue;
                }

                tokio::select! {
                    _ = self.oracle.await_capacity() => {}
                    _ = shutdown.changed() => break,
                }

                match self.run_one(&subreddit, &fresh).await {
                    Ok((new, updated)) => {
                        new_total += new;
                        updated_total += updated;
                        if let Err(e) = self.store.scrapers.mark_scraped(&self.scraper_id, &subreddit).await {
                            tracing::error!(subreddit = %subreddit, error = %e, "mark_scraped failed");
                        }
                    }
                    Err(e) => {
                        // Log and continue; one subreddit's failure doesn't abort the cycle.
                        tracing::error!(subreddit = %subreddit, error = %e, "posts fetch failed for subreddit");
                    }
                }

                tokio::select! {
                    _ = sleep(Duration::from_secs(fresh.config.rotation_delay_seconds)) => {}
                    _ = shutdown.changed() => {}
                }
            }

            let duration = cycle_start.elapsed();
            if let Err(e) = self
                .store
                .scrapers
                .record_cycle(&self.scraper_id, new_total, updated_total, duration.as_secs_f64())
                .await
            {
                tracing::error!(error = %e, "record_cycle failed");
            }

            let interval = Duration::from_secs(record.config.interval_seconds);
            let remaining = interval.saturating_sub(duration);
            if !remaining.is_zero() {
                tokio::select! {
                    _ = sleep(remaining) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    /// Fetches and upserts one subreddit's posts across every configured
    /// sort order, then refreshes metadata if stale.
    async fn run_one(&self, subreddit: &str, record: &ScraperRecord) -> Result<(u64, u64)> {
        let first_run = self.store.posts.posts_count(subreddit).await? == 0;

        let mut union: HashMap<String, Post> = HashMap::new();
        for sort in &record.config.sorting_methods {
            let limit = record
                .config
                .sort_limits
                .get(sort)
                .copied()
                .unwrap_or(record.config.posts_limit);

            let time_filter = if sort == "top" {
                if first_run {
                    record.config.initial_top_time_filter.clone()
                } else {
                    record.config.top_time_filter.clone()
                }
            } else {
                String::new()
            };

            let posts = self
                .transport
                .list_posts(subreddit, sort, &time_filter, limit, ScraperType::Posts)
                .await?;

            // First writer wins across sorts within a cycle.
            for post in posts {
                union.entry(post.post_id.clone()).or_insert(post);
            }
        }

        let (new_count, updated_count) = self.store.posts.upsert_posts(union.into_values().collect()).await?;

        if let Some(existing) = self.store.subreddit_metadata.get(subreddit).await? {
            if Utc::now() - existing.last_updated >= chrono::Duration::hours(24) {
                let refreshed = self.transport.fetch_subreddit_about(subreddit).await?;
                self.store.subreddit_metadata.upsert(refreshed).await?;
            }
        } else {
            let metadata = self.transport.fetch_subreddit_about(subreddit).await?;
            self.store.subreddit_metadata.upsert(metadata).await?;
        }

        Ok((new_count, updated_count))
    }
}

/// Pending-scrape subreddits first, then the rest in list order.
fn cycle_order(record: &ScraperRecord) -> Vec<String> {
    let mut pending: Vec<String> = record
        .subreddits
        .iter()
        .filter(|s| record.pending_scrape.contains(*s))
        .cloned()
        .collect();
    let rest: Vec<String> = record
        .subreddits
        .iter()
        .filter(|s| !record.pending_scrape.contains(*s))
        .cloned()
        .collect();
    pending.extend(rest);
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScraperConfig, ScraperMetrics, ScraperStatus, ScraperType as SType};
    use std::collections::HashSet;

    fn record(pending: &[&str]) -> ScraperRecord {
        ScraperRecord {
            id: "a".to_string(),
            subreddits: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            pending_scrape: pending.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            scraper_type: SType::Posts,
            config: ScraperConfig::default(),
            sealed_credentials: vec![],
            account_name: None,
            status: ScraperStatus::Running,
            auto_restart: true,
            restart_count: 0,
            metrics: ScraperMetrics::default(),
            last_error: None,
            container_id: None,
            container_name: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn pending_subreddits_come_first() {
        let r = record(&["c"]);
        assert_eq!(cycle_order(&r), vec!["c", "a", "b"]);
    }

    #[test]
    fn no_pending_preserves_list_order() {
        let r = record(&[]);
        assert_eq!(cycle_order(&r), vec!["a", "b", "c"]);
    }
}
