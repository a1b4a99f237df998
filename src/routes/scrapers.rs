//! Scraper lifecycle and queue-mutation HTTP surface. Response bodies
//! are operator-defined (not wire-critical) except for the cost
//! aggregation shape, which lives in `routes::usage`.

use axum::extract::{Path, State};
use axum::response::Json as ResponseJson;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::scraper::MAX_SUBREDDITS;
use crate::models::{RedditCredentials, ScraperConfig, ScraperMetrics, ScraperRecord, ScraperStatus, ScraperType};
use crate::services::queue_mutation::QueueMutationService;
use crate::{AppError, AppState, Result};

#[derive(Debug, Deserialize)]
pub struct StartScraperRequest {
    pub subreddits: Vec<String>,
    #[serde(default)]
    pub scraper_type: Option<ScraperType>,
    #[serde(default)]
    pub config: Option<ScraperConfig>,
    /// Either inline credentials or a reference to a saved Account.
    #[serde(default)]
    pub credentials: Option<RedditCredentials>,
    #[serde(default)]
    pub account_name: Option<String>,
}

pub async fn start(State(state): State<AppState>, Json(req): Json<StartScraperRequest>) -> Result<ResponseJson<Value>> {
    if req.subreddits.is_empty() {
        return Err(AppError::ValidationError("subreddits must not be empty".to_string()));
    }
    if req.subreddits.len() > MAX_SUBREDDITS {
        return Err(AppError::InvariantViolation(format!(
            "subreddit list exceeds max of {}",
            MAX_SUBREDDITS
        )));
    }

    let sealed_credentials = match (&req.credentials, &req.account_name) {
        (Some(creds), _) => state.sealer.seal_json(creds)?,
        (None, Some(account_name)) => {
            let account = state
                .store
                .accounts
                .get(account_name)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("account {} not found", account_name)))?;
            account.sealed_credentials
        }
        (None, None) => {
            return Err(AppError::ValidationError(
                "one of credentials or account_name is required".to_string(),
            ))
        }
    };

    let scraper_id = req.subreddits[0].clone();
    let record = ScraperRecord {
        id: scraper_id.clone(),
        subreddits: req.subreddits,
        pending_scrape: std::collections::HashSet::new(),
        scraper_type: req.scraper_type.unwrap_or(ScraperType::Posts),
        config: req.config.unwrap_or_default(),
        sealed_credentials,
        account_name: req.account_name,
        status: ScraperStatus::Configured,
        auto_restart: true,
        restart_count: 0,
        metrics: ScraperMetrics::default(),
        last_error: None,
        container_id: None,
        container_name: None,
        last_updated: chrono::Utc::now(),
    };

    state.store.scrapers.create(record).await?;
    state.supervisor.start(&scraper_id).await?;

    Ok(ResponseJson(json!({ "scraper_id": scraper_id, "status": "starting" })))
}

pub async fn stop(State(state): State<AppState>, Path(id): Path<String>) -> Result<ResponseJson<Value>> {
    state.supervisor.stop(&id).await?;
    Ok(ResponseJson(json!({ "scraper_id": id, "status": "stopped" })))
}

pub async fn restart(State(state): State<AppState>, Path(id): Path<String>) -> Result<ResponseJson<Value>> {
    state.supervisor.stop(&id).await?;
    state.supervisor.start(&id).await?;
    Ok(ResponseJson(json!({ "scraper_id": id, "status": "restarting" })))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<ResponseJson<Value>> {
    let _ = state.supervisor.stop(&id).await;
    state.store.scrapers.delete(&id).await?;
    Ok(ResponseJson(json!({ "scraper_id": id, "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct SubredditsRequest {
    pub subreddits: Vec<String>,
}

pub async fn add_subreddits(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubredditsRequest>,
) -> Result<ResponseJson<Value>> {
    let record = QueueMutationService::new(state.store.clone()).add(&id, req.subreddits).await?;
    Ok(ResponseJson(json!({ "scraper_id": id, "subreddits": record.subreddits, "pending_scrape": record.pending_scrape })))
}

pub async fn remove_subreddits(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubredditsRequest>,
) -> Result<ResponseJson<Value>> {
    let record = QueueMutationService::new(state.store.clone()).remove(&id, req.subreddits).await?;
    Ok(ResponseJson(json!({ "scraper_id": id, "subreddits": record.subreddits, "pending_scrape": record.pending_scrape })))
}

pub async fn replace_subreddits(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubredditsRequest>,
) -> Result<ResponseJson<Value>> {
    let record = QueueMutationService::new(state.store.clone()).replace(&id, req.subreddits).await?;
    Ok(ResponseJson(json!({ "scraper_id": id, "subreddits": record.subreddits, "pending_scrape": record.pending_scrape })))
}

pub async fn list(State(state): State<AppState>) -> Result<ResponseJson<Value>> {
    let records = state.store.scrapers.list().await?;
    Ok(ResponseJson(json!({ "scrapers": records.iter().map(summarize).collect::<Vec<_>>() })))
}

pub async fn status(State(state): State<AppState>, Path(id): Path<String>) -> Result<ResponseJson<Value>> {
    let record = state.store.scrapers.load(&id).await?;
    Ok(ResponseJson(summarize(&record)))
}

pub async fn stats(State(state): State<AppState>, Path(id): Path<String>) -> Result<ResponseJson<Value>> {
    let record = state.store.scrapers.load(&id).await?;
    Ok(ResponseJson(json!({ "scraper_id": record.id, "metrics": record.metrics })))
}

/// Since child stdio is inherited rather than captured to an in-process
/// ring buffer, this returns structured metadata (recent errors + cycle
/// metrics) in place of raw log tailing.
pub async fn logs(State(state): State<AppState>, Path(id): Path<String>) -> Result<ResponseJson<Value>> {
    let record = state.store.scrapers.load(&id).await?;
    let errors = state.store.errors.list(Some(false)).await?;
    let recent: Vec<_> = errors.into_iter().filter(|e| e.subreddit == id || record.subreddits.contains(&e.subreddit)).collect();
    Ok(ResponseJson(json!({
        "scraper_id": id,
        "metrics": record.metrics,
        "unresolved_errors": recent,
    })))
}

fn summarize(record: &ScraperRecord) -> Value {
    json!({
        "id": record.id,
        "subreddits": record.subreddits,
        "pending_scrape": record.pending_scrape,
        "scraper_type": record.scraper_type,
        "status": record.status,
        "restart_count": record.restart_count,
        "metrics": record.metrics,
        "last_error": record.last_error,
        "last_updated": record.last_updated,
    })
}

