use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reddit_fleet::db::memory::memory_store;
use reddit_fleet::models::{ScraperConfig, ScraperMetrics, ScraperRecord, ScraperStatus, ScraperType};
use reddit_fleet::services::mock_transport::{sample_metadata, sample_post, MockRedditTransport};
use reddit_fleet::services::{PostsWorker, RateLimitOracle, RedditTransport};

fn fast_config() -> ScraperConfig {
    ScraperConfig {
        interval_seconds: 60,
        rotation_delay_seconds: 0,
        sorting_methods: vec!["new".to_string(), "top".to_string()],
        ..ScraperConfig::default()
    }
}

fn record(id: &str, subreddits: Vec<&str>, config: ScraperConfig) -> ScraperRecord {
    ScraperRecord {
        id: id.to_string(),
        subreddits: subreddits.into_iter().map(String::from).collect(),
        pending_scrape: HashSet::new(),
        scraper_type: ScraperType::Posts,
        config,
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

/// First-run historical fetch with multi-sort dedup within one cycle: one
/// subreddit, posts returned under both `new` and `top`, overlapping by
/// id — the union must collapse to distinct posts.
#[tokio::test]
async fn first_cycle_upserts_deduped_posts_and_metadata() {
    let store = memory_store();
    store
        .scrapers
        .create(record("examplesub", vec!["examplesub"], fast_config()))
        .await
        .unwrap();

    let shared = sample_post("t3_shared", "examplesub", 5);
    let transport: Arc<dyn RedditTransport> = Arc::new(
        MockRedditTransport::new()
            .with_posts("examplesub", vec![shared.clone(), sample_post("t3_new_only", "examplesub", 1)])
            .with_about("examplesub", sample_metadata("examplesub")),
    );
    let oracle = Arc::new(RateLimitOracle::new(50));
    let worker = PostsWorker::new("examplesub".to_string(), store.clone(), transport, oracle);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    // One cycle easily completes well within this window since both sorts
    // hit the same in-memory fixture and rotation_delay_seconds is 0.
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(store.posts.posts_count("examplesub").await.unwrap(), 2);
    assert!(store.subreddit_metadata.get("examplesub").await.unwrap().is_some());
}

/// A subreddit added via the Queue Mutation API is visible to the
/// worker's next cycle without a process restart — the worker rebuilds
/// its cycle order from a fresh `load` every cycle.
#[tokio::test]
async fn pending_scrape_additions_are_picked_up_next_cycle() {
    let store = memory_store();
    let mut config = fast_config();
    config.interval_seconds = 1;
    store
        .scrapers
        .create(record("examplesub", vec!["examplesub"], config))
        .await
        .unwrap();

    let transport: Arc<dyn RedditTransport> = Arc::new(
        MockRedditTransport::new()
            .with_posts("examplesub", vec![sample_post("t3_a", "examplesub", 1)])
            .with_posts("newsub", vec![sample_post("t3_b", "newsub", 1)])
            .with_about("examplesub", sample_metadata("examplesub"))
            .with_about("newsub", sample_metadata("newsub")),
    );
    let oracle = Arc::new(RateLimitOracle::new(50));
    let worker = PostsWorker::new("examplesub".to_string(), store.clone(), transport, oracle);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    // Added while the first cycle's interval sleep is still in flight; the
    // second cycle's fresh load picks it up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    store
        .scrapers
        .add_subreddits("examplesub", vec!["newsub".to_string()])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(store.posts.posts_count("newsub").await.unwrap(), 1);
}
