//! Usage Recorder. Buffers counts between flushes; every
//! `flush_interval` (default 60s) writes one row per `(subreddit,
//! scraper_type)` with totals since the last flush.

use std::sync::Arc;
use std::time::Duration;

use crate::db::store::UsageStore;
use crate::models::{ScraperType, UsageRow};
use crate::services::http_counter::CountingTransport;
use crate::Result;

pub struct UsageRecorder {
    usage_store: Arc<dyn UsageStore>,
    transport: Arc<CountingTransport>,
    flush_interval: Duration,
}

impl UsageRecorder {
    pub fn new(usage_store: Arc<dyn UsageStore>, transport: Arc<CountingTransport>, flush_interval_secs: u64) -> Self {
        Self {
            usage_store,
            transport,
            flush_interval: Duration::from_secs(flush_interval_secs),
        }
    }

    /// Drains the transport's counters and writes one `UsageRow` per
    /// label. `cycle_duration_seconds` is attributed to every row in this
    /// flush since the recorder doesn't track per-subreddit wall time
    /// independently of the worker's own cycle accounting.
    pub async fn flush_once(&self, cycle_duration_seconds: f64) -> Result<()> {
        let snapshot = self.transport.rate_limit_snapshot();
        for (subreddit, scraper_type_label, requests, cost) in self.transport.drain_counters() {
            let scraper_type = if scraper_type_label == "comments" { ScraperType::Comments } else { ScraperType::Posts };
            let row = UsageRow {
                subreddit,
                scraper_type,
                timestamp: chrono::Utc::now(),
                actual_http_requests: requests,
                estimated_cost_usd: cost,
                cycle_duration_seconds,
                rate_limit_remaining: Some(snapshot.remaining),
            };
            self.usage_store.append(row).await?;
        }
        Ok(())
    }

    /// Runs the periodic flush loop until `shutdown` fires. Intended to be
    /// spawned once per worker process alongside the rotation loop.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush_once(self.flush_interval.as_secs_f64()).await {
                        tracing::error!(error = %e, "usage flush failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = self.flush_once(self.flush_interval.as_secs_f64()).await;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::memory_store;
    use crate::services::rate_limiter::RateLimitOracle;
    use std::sync::Arc;

    #[tokio::test]
    async fn flush_produces_cost_row_matching_expected_rate() {
        let store = memory_store();
        let oracle = Arc::new(RateLimitOracle::new(50));
        let transport = Arc::new(CountingTransport::new("test-agent", oracle, 0.24).unwrap());

        for _ in 0..156 {
            let _ = transport
                .send(reqwest::Method::GET, "http://127.0.0.1:0/", "examplesub", ScraperType::Posts, None)
                .await;
        }

        let recorder = UsageRecorder::new(store.usage.clone(), transport, 60);
        recorder.flush_once(60.0).await.unwrap();

        let agg = store.usage.aggregate(chrono::Utc::now()).await.unwrap();
        assert!((agg.today_usd - 0.03744).abs() < 1e-6);
    }
}
