//! Queue Mutation API. Thin validated wrappers around the
//! `ScraperStore` queue operations — the invariant enforcement itself
//! (primary-subreddit protection, the 100-subreddit cap) lives at the
//! store layer since it must hold under concurrent writers; this module
//! is the seam the HTTP routes call through.

use crate::db::store::Store;
use crate::models::ScraperRecord;
use crate::Result;

pub struct QueueMutationService {
    store: Store,
}

impl QueueMutationService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn add(&self, scraper_id: &str, new_subs: Vec<String>) -> Result<ScraperRecord> {
        self.store.scrapers.add_subreddits(scraper_id, new_subs).await
    }

    pub async fn remove(&self, scraper_id: &str, old_subs: Vec<String>) -> Result<ScraperRecord> {
        self.store.scrapers.remove_subreddits(scraper_id, old_subs).await
    }

    pub async fn replace(&self, scraper_id: &str, full_list: Vec<String>) -> Result<ScraperRecord> {
        self.store.scrapers.update_subreddits(scraper_id, full_list).await
    }
}
