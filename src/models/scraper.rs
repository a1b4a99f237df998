use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which rotation skeleton a scraper's worker process runs: the posts
/// listing rotation (§4.E) or the comment priority/depth pipeline
/// (§4.F). Two small implementations share the same queue-state and
/// rate-limit collaborators rather than one inheriting from the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScraperType {
    Posts,
    Comments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScraperStatus {
    Configured,
    Starting,
    Running,
    Stopped,
    Failed,
}

/// Per-scraper tunables; everything here is mutable at runtime without a
/// worker restart (it's read fresh on every `load`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub posts_limit: u32,
    pub sort_limits: std::collections::HashMap<String, u32>,
    pub sorting_methods: Vec<String>,
    pub interval_seconds: u64,
    pub rotation_delay_seconds: u64,
    pub comment_batch: u32,
    pub max_comment_depth: i32,
    /// 0 = skip "more comments" expansion entirely (the default).
    pub more_comments_limit: MoreCommentsLimit,
    pub max_retries: u32,
    pub retry_backoff_factor: u32,
    pub top_time_filter: String,
    pub initial_top_time_filter: String,
    pub verify_before_marking: bool,
    pub auto_restart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoreCommentsLimit {
    Skip,
    Count(u32),
    ExpandAll,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        let mut sort_limits = std::collections::HashMap::new();
        sort_limits.insert("new".to_string(), 100);
        sort_limits.insert("top".to_string(), 100);
        sort_limits.insert("rising".to_string(), 100);

        Self {
            posts_limit: 100,
            sort_limits,
            sorting_methods: vec!["new".to_string(), "top".to_string(), "rising".to_string()],
            interval_seconds: 300,
            rotation_delay_seconds: 2,
            comment_batch: 10,
            max_comment_depth: 3,
            more_comments_limit: MoreCommentsLimit::Skip,
            max_retries: 3,
            retry_backoff_factor: 2,
            top_time_filter: "day".to_string(),
            initial_top_time_filter: "month".to_string(),
            verify_before_marking: true,
            auto_restart: true,
        }
    }
}

/// Rolling metrics the control plane displays without querying raw data:
/// per-cycle counters folded into rolling windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScraperMetrics {
    pub total_cycles: u64,
    pub posts_per_hour: f64,
    pub comments_per_hour: f64,
    pub avg_cycle_duration_secs: f64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Durable per-scraper record. The primary subreddit is `subreddits[0]`
/// by convention and must always be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperRecord {
    pub id: String,
    pub subreddits: Vec<String>,
    pub pending_scrape: HashSet<String>,
    pub scraper_type: ScraperType,
    pub config: ScraperConfig,
    /// Opaque, sealed credential blob; only `auth::Sealer` may open it.
    pub sealed_credentials: Vec<u8>,
    pub account_name: Option<String>,
    pub status: ScraperStatus,
    pub auto_restart: bool,
    pub restart_count: u32,
    pub metrics: ScraperMetrics,
    pub last_error: Option<String>,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub last_updated: DateTime<Utc>,
}

pub const MAX_SUBREDDITS: usize = 100;

impl ScraperRecord {
    pub fn primary_subreddit(&self) -> &str {
        self.subreddits.first().map(String::as_str).unwrap_or(&self.id)
    }

    /// Invariant: `pending_scrape ⊆ subreddits` must hold at every
    /// observable moment.
    pub fn pending_subset_of_subreddits(&self) -> bool {
        self.pending_scrape.iter().all(|s| self.subreddits.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record() -> ScraperRecord {
        ScraperRecord {
            id: "examplesub".to_string(),
            subreddits: vec!["examplesub".to_string()],
            pending_scrape: HashSet::new(),
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

    #[test]
    fn primary_subreddit_is_first_entry() {
        let rec = base_record();
        assert_eq!(rec.primary_subreddit(), "examplesub");
    }

    #[test]
    fn pending_subset_invariant_holds_for_fresh_record() {
        let rec = base_record();
        assert!(rec.pending_subset_of_subreddits());
    }

    #[test]
    fn pending_subset_invariant_detects_violation() {
        let mut rec = base_record();
        rec.pending_scrape.insert("notinlist".to_string());
        assert!(!rec.pending_subset_of_subreddits());
    }
}
