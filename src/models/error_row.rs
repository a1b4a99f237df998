use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    CommentScrapeFailed,
    VerificationFailed,
    AuthFailed,
    TransportError,
}

/// Append-only error ledger row. Retries bump an in-memory counter in
/// the worker; only the final outcome is persisted here, with the final
/// `retry_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRow {
    pub subreddit: String,
    pub post_id: Option<String>,
    pub error_type: ErrorType,
    pub error_message: String,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}
