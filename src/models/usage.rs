use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::scraper::ScraperType;

/// Per-flush-interval usage row. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRow {
    pub subreddit: String,
    pub scraper_type: ScraperType,
    pub timestamp: DateTime<Utc>,
    pub actual_http_requests: u64,
    pub estimated_cost_usd: f64,
    pub cycle_duration_seconds: f64,
    pub rate_limit_remaining: Option<u32>,
}

impl UsageRow {
    /// Cost invariant:
    /// `estimated_cost_usd = actual_http_requests * cost_per_1000 / 1000` (1e-6).
    pub fn compute_cost(actual_http_requests: u64, cost_per_1000_requests: f64) -> f64 {
        (actual_http_requests as f64) * cost_per_1000_requests / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_math_matches_expected_rate() {
        // 156 requests at $0.24/1000 -> $0.03744
        let cost = UsageRow::compute_cost(156, 0.24);
        assert!((cost - 0.03744).abs() < 1e-6);
    }
}
