use axum::extract::State;
use axum::response::Json as ResponseJson;
use serde_json::{json, Value};

use crate::{AppState, Result};

/// Returns `{today, last_hour, avg_7day, monthly_projection,
/// per_subreddit}` as pure reductions over Usage rows.
pub async fn cost(State(state): State<AppState>) -> Result<ResponseJson<Value>> {
    let agg = state.store.usage.aggregate(chrono::Utc::now()).await?;
    Ok(ResponseJson(json!({
        "today": agg.today_usd,
        "last_hour": agg.last_hour_usd,
        "avg_7day": agg.avg_7day_usd,
        "monthly_projection": agg.monthly_projection_usd,
        "per_subreddit": agg.per_subreddit,
    })))
}
