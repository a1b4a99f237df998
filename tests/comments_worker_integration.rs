use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use reddit_fleet::db::memory::memory_store;
use reddit_fleet::models::{Post, ScraperConfig, ScraperMetrics, ScraperRecord, ScraperStatus, ScraperType};
use reddit_fleet::services::mock_transport::{sample_comment, sample_post, MockRedditTransport};
use reddit_fleet::services::{CommentsWorker, RateLimitOracle, RedditTransport};

fn fast_config() -> ScraperConfig {
    ScraperConfig {
        interval_seconds: 60,
        comment_batch: 10,
        ..ScraperConfig::default()
    }
}

fn record(id: &str, subreddits: Vec<&str>) -> ScraperRecord {
    ScraperRecord {
        id: id.to_string(),
        subreddits: subreddits.into_iter().map(String::from).collect(),
        pending_scrape: HashSet::new(),
        scraper_type: ScraperType::Comments,
        config: fast_config(),
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

async fn seed_post(store: &reddit_fleet::db::Store, post_id: &str, subreddit: &str, num_comments: i64) -> Post {
    let post = sample_post(post_id, subreddit, num_comments);
    store.posts.upsert_posts(vec![post.clone()]).await.unwrap();
    post
}

/// A freshly fetched tree is stored and, once `verify_comments_present`
/// confirms the rows landed, `comments_scraped`/`initial_comments_scraped`
/// flip true.
#[tokio::test]
async fn fetched_comments_are_verified_before_marking_scraped() {
    let store = memory_store();
    store.scrapers.create(record("examplesub", vec!["examplesub"])).await.unwrap();
    seed_post(&store, "t3_a", "examplesub", 2).await;

    let transport: Arc<dyn RedditTransport> = Arc::new(
        MockRedditTransport::new()
            .with_comments("t3_a", vec![sample_comment("t1_1", "t3_a"), sample_comment("t1_2", "t3_a")]),
    );
    let oracle = Arc::new(RateLimitOracle::new(50));
    let worker = CommentsWorker::new("examplesub".to_string(), store.clone(), transport, oracle);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(store.comments.verify_comments_present("t3_a").await.unwrap(), 2);
    let post = store.posts.get_post("t3_a").await.unwrap().unwrap();
    assert!(post.comments_scraped);
    assert!(post.initial_comments_scraped);
}

/// A 404 from the transport marks the post's comments vacuously scraped
/// rather than leaving it to retry forever.
#[tokio::test]
async fn not_found_post_is_marked_vacuously_scraped() {
    let store = memory_store();
    store.scrapers.create(record("examplesub", vec!["examplesub"])).await.unwrap();
    seed_post(&store, "t3_gone", "examplesub", 5).await;

    let transport: Arc<dyn RedditTransport> = Arc::new(MockRedditTransport::new().with_404("t3_gone"));
    let oracle = Arc::new(RateLimitOracle::new(50));
    let worker = CommentsWorker::new("examplesub".to_string(), store.clone(), transport, oracle);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let post = store.posts.get_post("t3_gone").await.unwrap().unwrap();
    assert!(post.comments_scraped);
    assert_eq!(store.comments.verify_comments_present("t3_gone").await.unwrap(), 0);
}

/// Comments already stored are excluded from the insert set, but newly
/// appearing siblings under the same post still land.
#[tokio::test]
async fn dedup_skips_existing_comment_ids() {
    let store = memory_store();
    store.scrapers.create(record("examplesub", vec!["examplesub"])).await.unwrap();
    seed_post(&store, "t3_b", "examplesub", 2).await;
    store
        .comments
        .upsert_comments(vec![sample_comment("t1_1", "t3_b")])
        .await
        .unwrap();

    let transport: Arc<dyn RedditTransport> = Arc::new(MockRedditTransport::new().with_comments(
        "t3_b",
        vec![sample_comment("t1_1", "t3_b"), sample_comment("t1_2", "t3_b")],
    ));
    let oracle = Arc::new(RateLimitOracle::new(50));
    let worker = CommentsWorker::new("examplesub".to_string(), store.clone(), transport, oracle);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(store.comments.verify_comments_present("t3_b").await.unwrap(), 2);
}
