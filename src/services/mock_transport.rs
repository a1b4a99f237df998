//! Fixture `RedditTransport` so the rotation loops can be exercised
//! without a live network or a Reddit OAuth app.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::models::subreddit_metadata::EmbeddingStatus;
use crate::models::{Comment, ParentType, Post, ScraperType, SubredditMetadata};
use crate::{AppError, Result};

/// Canned responses keyed by subreddit, plus a call log so tests can assert
/// on exactly what the worker asked for.
#[derive(Default)]
pub struct MockRedditTransport {
    posts: HashMap<String, Vec<Post>>,
    comments: HashMap<String, Vec<Comment>>,
    about: HashMap<String, SubredditMetadata>,
    not_found_posts: Mutex<Vec<String>>,
    list_calls: Mutex<Vec<(String, String)>>,
    comment_calls: Mutex<Vec<String>>,
}

impl MockRedditTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(mut self, subreddit: &str, posts: Vec<Post>) -> Self {
        self.posts.insert(subreddit.to_string(), posts);
        self
    }

    pub fn with_comments(mut self, post_id: &str, comments: Vec<Comment>) -> Self {
        self.comments.insert(post_id.to_string(), comments);
        self
    }

    pub fn with_about(mut self, subreddit: &str, metadata: SubredditMetadata) -> Self {
        self.about.insert(subreddit.to_string(), metadata);
        self
    }

    /// Makes `fetch_comment_tree` return `AppError::NotFound` for this
    /// post, exercising the vacuously-scraped-on-404 path.
    pub fn with_404(self, post_id: &str) -> Self {
        self.not_found_posts.try_lock().unwrap().push(post_id.to_string());
        self
    }

    pub async fn list_calls(&self) -> Vec<(String, String)> {
        self.list_calls.lock().await.clone()
    }

    pub async fn comment_calls(&self) -> Vec<String> {
        self.comment_calls.lock().await.clone()
    }
}

pub fn sample_post(post_id: &str, subreddit: &str, num_comments: i64) -> Post {
    Post {
        post_id: post_id.to_string(),
        subreddit: subreddit.to_string(),
        title: format!("title for {}", post_id),
        url: format!("https://reddit.com/{}", post_id),
        selftext: String::new(),
        author: "some_user".to_string(),
        score: 1,
        num_comments,
        created_at: Utc::now(),
        comments_scraped: false,
        initial_comments_scraped: false,
        last_comment_fetch_time: None,
        comments_scraped_at: None,
    }
}

pub fn sample_comment(comment_id: &str, post_id: &str) -> Comment {
    Comment {
        comment_id: comment_id.to_string(),
        post_id: post_id.to_string(),
        parent_id: None,
        parent_type: ParentType::Post,
        depth: 0,
        author: "some_user".to_string(),
        body: "a comment".to_string(),
        score: 1,
        created_at: Utc::now(),
    }
}

pub fn sample_metadata(subreddit: &str) -> SubredditMetadata {
    SubredditMetadata {
        subreddit_name: subreddit.to_string(),
        title: subreddit.to_string(),
        subscribers: 1000,
        active_user_count: Some(10),
        description: String::new(),
        embedding_status: EmbeddingStatus::Pending,
        last_updated: Utc::now(),
    }
}

#[async_trait]
impl super::RedditTransport for MockRedditTransport {
    async fn list_posts(
        &self,
        subreddit: &str,
        sort: &str,
        _time_filter: &str,
        limit: u32,
        _scraper_type: ScraperType,
    ) -> Result<Vec<Post>> {
        self.list_calls.lock().await.push((subreddit.to_string(), sort.to_string()));
        let posts = self.posts.get(subreddit).cloned().unwrap_or_default();
        Ok(posts.into_iter().take(limit as usize).collect())
    }

    async fn fetch_comment_tree(
        &self,
        _subreddit: &str,
        post_id: &str,
        _depth_cap: i32,
        _skip_more_comments: bool,
    ) -> Result<Vec<Comment>> {
        self.comment_calls.lock().await.push(post_id.to_string());
        if self.not_found_posts.lock().await.contains(&post_id.to_string()) {
            return Err(AppError::NotFound(format!("post {} not found", post_id)));
        }
        Ok(self.comments.get(post_id).cloned().unwrap_or_default())
    }

    async fn fetch_subreddit_about(&self, subreddit: &str) -> Result<SubredditMetadata> {
        self.about
            .get(subreddit)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no about fixture for {}", subreddit)))
    }
}
