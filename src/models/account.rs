use serde::{Deserialize, Serialize};

/// A reusable named credential set. Scrapers either reference one by
/// `account_name` or carry inline sealed credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_name: String,
    pub sealed_credentials: Vec<u8>,
}

/// Plaintext shape sealed inside `Account::sealed_credentials` and
/// `ScraperRecord::sealed_credentials`. Never persisted unsealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}
