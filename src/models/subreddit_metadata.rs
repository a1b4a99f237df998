use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consumed by external collaborators (the embedding/semantic-search
/// pipeline) that this crate deliberately does not implement. The core
/// only ever writes `Pending` on first sighting and otherwise leaves
/// this field alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    Pending,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubredditMetadata {
    pub subreddit_name: String,
    pub title: String,
    pub subscribers: i64,
    pub active_user_count: Option<i64>,
    pub description: String,
    pub embedding_status: EmbeddingStatus,
    pub last_updated: DateTime<Utc>,
}
