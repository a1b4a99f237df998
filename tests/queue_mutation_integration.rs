use std::collections::HashSet;

use chrono::Utc;
use reddit_fleet::db::memory::memory_store;
use reddit_fleet::models::{ScraperConfig, ScraperMetrics, ScraperRecord, ScraperStatus, ScraperType};
use reddit_fleet::services::QueueMutationService;
use reddit_fleet::AppError;

fn record(id: &str) -> ScraperRecord {
    ScraperRecord {
        id: id.to_string(),
        subreddits: vec![id.to_string()],
        pending_scrape: HashSet::new(),
        scraper_type: ScraperType::Posts,
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

/// Additions land in both `subreddits` and `pending_scrape`; the primary
/// subreddit can never be removed through the same seam.
#[tokio::test]
async fn add_and_remove_round_trip_through_queue_mutation_service() {
    let store = memory_store();
    store.scrapers.create(record("primarysub")).await.unwrap();
    let svc = QueueMutationService::new(store.clone());

    let after_add = svc.add("primarysub", vec!["extra1".to_string(), "extra2".to_string()]).await.unwrap();
    assert!(after_add.subreddits.contains(&"extra1".to_string()));
    assert!(after_add.pending_scrape.contains("extra1"));
    assert!(after_add.pending_subset_of_subreddits());

    let after_remove = svc.remove("primarysub", vec!["extra1".to_string()]).await.unwrap();
    assert!(!after_remove.subreddits.contains(&"extra1".to_string()));
    assert!(after_remove.subreddits.contains(&"extra2".to_string()));

    let rejected = svc.remove("primarysub", vec!["primarysub".to_string()]).await;
    assert!(matches!(rejected, Err(AppError::InvariantViolation(_))));
}

/// A wholesale replace diffs against the prior list, adding newcomers to
/// `pending_scrape` and purging departures from it.
#[tokio::test]
async fn replace_diffs_pending_scrape_against_prior_list() {
    let store = memory_store();
    store.scrapers.create(record("primarysub")).await.unwrap();
    let svc = QueueMutationService::new(store.clone());

    svc.add("primarysub", vec!["stale".to_string()]).await.unwrap();
    store.scrapers.mark_scraped("primarysub", "stale").await.unwrap();

    let replaced = svc
        .replace("primarysub", vec!["primarysub".to_string(), "fresh".to_string()])
        .await
        .unwrap();

    assert!(!replaced.subreddits.contains(&"stale".to_string()));
    assert!(replaced.pending_scrape.contains("fresh"));
    assert!(!replaced.pending_scrape.contains("stale"));
}
