//! Comments Worker: selects posts by priority tier, fetches depth-capped
//! comment trees, dedups against the existing id set, and applies
//! verify-then-mark before flipping tracking fields — the integrity rule
//! that prevents "ghost posts."

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::db::store::Store;
use crate::models::{ErrorRow, ErrorType, ScraperRecord};
use crate::services::rate_limiter::RateLimitOracle;
use crate::services::reddit_client::RedditTransport;
use crate::services::retry::{retry_with_backoff, RetryPolicy};
use crate::{AppError, Result};

pub struct CommentsWorker {
    pub scraper_id: String,
    pub store: Store,
    pub transport: Arc<dyn RedditTransport>,
    pub oracle: Arc<RateLimitOracle>,
}

impl CommentsWorker {
    pub fn new(scraper_id: String, store: Store, transport: Arc<dyn RedditTransport>, oracle: Arc<RateLimitOracle>) -> Self {
        Self { scraper_id, store, transport, oracle }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

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

            let retry_policy = RetryPolicy::from_scraper_config(
                record.config.max_retries,
                record.config.retry_backoff_factor,
            );

            let mut new_comments_total = 0u64;
            for subreddit in &record.subreddits {
                if *shutdown.borrow() {
                    break;
                }

                let batch = match self
                    .store
                    .posts
                    .select_for_comment_pass(subreddit, record.config.comment_batch, Utc::now())
                    .await
                {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::error!(subreddit = %subreddit, error = %e, "select_for_comment_pass failed");
                        continue;
                    }
                };

                for post in batch {
                    if *shutdown.borrow() {
                        break;
                    }

                    tokio::select! {
                        _ = self.oracle.await_capacity() => {}
                        _ = shutdown.changed() => break,
                    }

                    match self.fetch_one(&post.post_id, subreddit, &record, &retry_policy).await {
                        Ok(inserted) => new_comments_total += inserted,
                        Err(e) => {
                            tracing::error!(post_id = %post.post_id, error = %e, "comment fetch abandoned");
                        }
                    }

                    // Politeness pause between posts.
                    tokio::select! {
                        _ = sleep(Duration::from_secs(2)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }

            tracing::info!(scraper_id = %self.scraper_id, new_comments = new_comments_total, "comment pass complete");

            tokio::select! {
                _ = sleep(Duration::from_secs(record.config.interval_seconds)) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Fetches, dedups, and verify-then-marks one post's comment tree.
    /// Returns the number of newly inserted comments.
    async fn fetch_one(
        &self,
        post_id: &str,
        subreddit: &str,
        record: &ScraperRecord,
        retry_policy: &RetryPolicy,
    ) -> Result<u64> {
        let depth_cap = record.config.max_comment_depth;
        let skip_more = matches!(
            record.config.more_comments_limit,
            crate::models::scraper::MoreCommentsLimit::Skip
        );

        let existing_ids = self.store.comments.existing_comment_ids(post_id).await?;

        let transport = self.transport.clone();
        let post_id_owned = post_id.to_string();
        let subreddit_owned = subreddit.to_string();
        let fetched = retry_with_backoff(
            move || {
                let transport = transport.clone();
                let post_id = post_id_owned.clone();
                let subreddit = subreddit_owned.clone();
                async move { transport.fetch_comment_tree(&subreddit, &post_id, depth_cap, skip_more).await }
            },
            retry_policy,
        )
        .await;

        let tree = match fetched {
            Ok(tree) => tree,
            Err(AppError::NotFound(msg)) => {
                // A gone post has no comments to chase next cycle; treat
                // it as vacuously scraped rather than a retriable failure.
                tracing::info!(post_id = %post_id, "post gone upstream, marking comments vacuously scraped");
                self.store.posts.mark_comments_scraped(post_id, Utc::now()).await?;
                return Err(AppError::NotFound(msg));
            }
            Err(e) => {
                self.record_failure(subreddit, post_id, &e, retry_policy.max_retries).await;
                return Err(e);
            }
        };

        // Dedup: skip ids already stored but still traverse (children may
        // be new) — the transport already returns the full tree, so we
        // only filter the insert set here.
        let to_insert: Vec<_> = tree.into_iter().filter(|c| !existing_ids.contains(&c.comment_id)).collect();
        let expected_any = !to_insert.is_empty() || !existing_ids.is_empty();
        let inserted = self.store.comments.upsert_comments(to_insert).await?;

        let present = self.store.comments.verify_comments_present(post_id).await?;
        if present > 0 || !expected_any {
            self.store.posts.mark_comments_scraped(post_id, Utc::now()).await?;
        } else {
            // Verification failure: leave tracking fields untouched, log,
            // retry next cycle.
            self.store
                .errors
                .append(ErrorRow {
                    subreddit: subreddit.to_string(),
                    post_id: Some(post_id.to_string()),
                    error_type: ErrorType::VerificationFailed,
                    error_message: format!("expected comments for {} but verify_comments_present returned 0", post_id),
                    retry_count: retry_policy.max_retries,
                    timestamp: Utc::now(),
                    resolved: false,
                })
                .await?;
        }

        Ok(inserted)
    }

    async fn record_failure(&self, subreddit: &str, post_id: &str, error: &AppError, retry_count: u32) {
        let error_type = match error {
            AppError::AuthFailure(_) => ErrorType::AuthFailed,
            AppError::TransientTransport(_) | AppError::RateLimited { .. } => ErrorType::TransportError,
            _ => ErrorType::CommentScrapeFailed,
        };

        let row = ErrorRow {
            subreddit: subreddit.to_string(),
            post_id: Some(post_id.to_string()),
            error_type,
            error_message: error.to_string(),
            retry_count,
            timestamp: Utc::now(),
            resolved: false,
        };
        if let Err(e) = self.store.errors.append(row).await {
            tracing::error!(error = %e, "failed to append error ledger row");
        }
    }
}
