//! HTTP Request Counter: a transport-layer interceptor. Every outbound
//! call to `oauth.reddit.com` passes through here so that pagination,
//! lazy expansions, and retries are all counted — counting above this
//! layer would undercount calls that fan out internally.

use reqwest::{Method, Response};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::db::store::scraper_type_label;
use crate::models::ScraperType;
use crate::services::rate_limiter::{RateLimitOracle, RateLimitSnapshot};
use crate::{AppError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct CounterTotals {
    pub requests: u64,
}

/// Labeled counters keyed `(subreddit, scraper_type)`, drained by the
/// Usage Recorder on each flush.
#[derive(Default)]
struct Counters {
    per_label: HashMap<(String, &'static str), CounterTotals>,
}

pub struct CountingTransport {
    client: reqwest::Client,
    oracle: Arc<RateLimitOracle>,
    counters: Mutex<Counters>,
    cost_per_1000_requests: f64,
}

impl CountingTransport {
    pub fn new(user_agent: &str, oracle: Arc<RateLimitOracle>, cost_per_1000_requests: f64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(AppError::from)?;

        Ok(Self {
            client,
            oracle,
            counters: Mutex::new(Counters::default()),
            cost_per_1000_requests,
        })
    }

    /// Issues one request, counting it against `(subreddit, scraper_type)`
    /// regardless of outcome — failures, retries, and token refreshes are
    /// all billable calls.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        subreddit: &str,
        scraper_type: ScraperType,
        bearer_token: Option<&str>,
    ) -> Result<Response> {
        let label = (subreddit.to_string(), scraper_type_label(scraper_type));
        {
            let mut guard = self.counters.lock().unwrap();
            guard.per_label.entry(label.clone()).or_default().requests += 1;
        }

        let mut req = self.client.request(method, url);
        if let Some(token) = bearer_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        self.observe_rate_limit_headers(&response);
        Ok(response)
    }

    fn observe_rate_limit_headers(&self, response: &Response) {
        let headers = response.headers();
        let parse = |name: &str| -> Option<f64> {
            headers.get(name)?.to_str().ok()?.parse::<f64>().ok()
        };

        let remaining = parse("x-ratelimit-remaining");
        let used = parse("x-ratelimit-used");
        let reset_secs = parse("x-ratelimit-reset");

        if let (Some(remaining), Some(used), Some(reset_secs)) = (remaining, used, reset_secs) {
            let snapshot = RateLimitSnapshot {
                remaining: remaining as u32,
                used: used as u32,
                reset_at: chrono::Utc::now() + chrono::Duration::seconds(reset_secs as i64),
            };
            self.oracle.observe(snapshot);
        }
    }

    /// Drains accumulated counters since the last flush, returning
    /// `(subreddit, scraper_type, request_count, cost_delta)` rows for
    /// the Usage Recorder to persist.
    pub fn drain_counters(&self) -> Vec<(String, &'static str, u64, f64)> {
        let mut guard = self.counters.lock().unwrap();
        let drained: Vec<_> = guard
            .per_label
            .drain()
            .map(|((subreddit, scraper_type), totals)| {
                let cost = totals.requests as f64 * self.cost_per_1000_requests / 1000.0;
                (subreddit, scraper_type, totals.requests, cost)
            })
            .collect();
        drained
    }

    pub fn rate_limit_snapshot(&self) -> RateLimitSnapshot {
        self.oracle.snapshot()
    }
}
