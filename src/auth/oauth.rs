//! Reddit OAuth token acquisition. `www.reddit.com/api/v1/access_token`
//! is a distinct host from `oauth.reddit.com`, so these calls are not
//! routed through the counting transport, which only tracks calls against
//! `oauth.reddit.com` — noted as an explicit interpretation in DESIGN.md.

use serde::Deserialize;
use std::sync::Mutex;

use crate::models::account::RedditCredentials;
use crate::{AppError, Result};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

pub struct OAuthTokenProvider {
    credentials: RedditCredentials,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthTokenProvider {
    pub fn new(credentials: RedditCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(AppError::from)?;
        Ok(Self { credentials, client, cached: Mutex::new(None) })
    }

    /// Returns a cached token if it has more than 60s left, otherwise
    /// authenticates with the password grant and caches the result.
    pub async fn token(&self) -> Result<String> {
        {
            let guard = self.cached.lock().unwrap();
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at - chrono::Utc::now() > chrono::Duration::seconds(60) {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let response = self
            .client
            .post("https://www.reddit.com/api/v1/access_token")
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", &self.credentials.username),
                ("password", &self.credentials.password),
            ])
            .send()
            .await?;

        if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
            return Err(AppError::AuthFailure(format!(
                "reddit oauth rejected credentials: {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(AppError::TransientTransport(format!(
                "reddit oauth token endpoint returned {}",
                response.status()
            )));
        }

        let parsed: TokenResponse = response.json().await?;
        let expires_at = chrono::Utc::now() + chrono::Duration::seconds(parsed.expires_in);
        let token = parsed.access_token.clone();
        *self.cached.lock().unwrap() = Some(CachedToken { access_token: parsed.access_token, expires_at });
        Ok(token)
    }
}
