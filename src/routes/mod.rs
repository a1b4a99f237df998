pub mod health;
pub mod scrapers;
pub mod usage;

use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::AppState;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/scrapers/start", post(scrapers::start))
        .route("/scrapers", get(scrapers::list))
        .route("/scrapers/:id/stop", post(scrapers::stop))
        .route("/scrapers/:id/restart", post(scrapers::restart))
        .route("/scrapers/:id", delete(scrapers::delete))
        .route("/scrapers/:id/subreddits/add", post(scrapers::add_subreddits))
        .route("/scrapers/:id/subreddits/remove", post(scrapers::remove_subreddits))
        .route("/scrapers/:id/subreddits", patch(scrapers::replace_subreddits))
        .route("/scrapers/:id/status", get(scrapers::status))
        .route("/scrapers/:id/logs", get(scrapers::logs))
        .route("/scrapers/:id/stats", get(scrapers::stats))
        .route("/api/usage/cost", get(usage::cost))
        .route("/health", get(health::health))
}
