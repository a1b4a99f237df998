use axum::extract::State;
use axum::response::Json as ResponseJson;
use serde_json::{json, Value};

use crate::AppState;

/// `GET /health`: liveness plus store and supervisor state.
pub async fn health(State(state): State<AppState>) -> ResponseJson<Value> {
    let store_ok = state.store.scrapers.list().await.is_ok();
    ResponseJson(json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "store_reachable": store_ok,
    }))
}
