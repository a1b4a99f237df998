use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A harvested Reddit post. `post_id` is Reddit's own id (e.g. `t3_abc123`)
/// and is the row's unique key — not a locally generated UUID, since
/// dedup across cycles and across sorts keys on exactly this value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub post_id: String,
    pub subreddit: String,
    pub title: String,
    pub url: String,
    pub selftext: String,
    pub author: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_at: DateTime<Utc>,

    // Tracking fields. Upserts must never regress these to false/null
    // once set.
    pub comments_scraped: bool,
    pub initial_comments_scraped: bool,
    pub last_comment_fetch_time: Option<DateTime<Utc>>,
    pub comments_scraped_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Merge freshly fetched content into an existing row, preserving
    /// tracking fields per the upsert contract. `self` is the existing
    /// row, `incoming` is the freshly fetched content.
    pub fn merge_preserving_tracking(&self, incoming: &Post) -> Post {
        Post {
            post_id: incoming.post_id.clone(),
            subreddit: incoming.subreddit.clone(),
            title: incoming.title.clone(),
            url: incoming.url.clone(),
            selftext: incoming.selftext.clone(),
            author: incoming.author.clone(),
            score: incoming.score,
            num_comments: incoming.num_comments,
            created_at: incoming.created_at,
            comments_scraped: self.comments_scraped || incoming.comments_scraped,
            initial_comments_scraped: self.initial_comments_scraped || incoming.initial_comments_scraped,
            last_comment_fetch_time: self.last_comment_fetch_time.or(incoming.last_comment_fetch_time),
            comments_scraped_at: self.comments_scraped_at.or(incoming.comments_scraped_at),
        }
    }

    /// Priority tier membership for the comments rotation. Returns `None`
    /// if the post isn't due for a comment refresh under any tier.
    pub fn priority_tier(&self, now: DateTime<Utc>) -> Option<CommentPriorityTier> {
        if !self.initial_comments_scraped {
            return Some(CommentPriorityTier::P0Initial);
        }

        let stale_for = |hours: i64| -> bool {
            match self.last_comment_fetch_time {
                None => true,
                Some(t) => (now - t).num_hours() >= hours,
            }
        };

        if self.num_comments > 100 && stale_for(2) {
            Some(CommentPriorityTier::P1Hot)
        } else if (20..=100).contains(&self.num_comments) && stale_for(6) {
            Some(CommentPriorityTier::P2Warm)
        } else if self.num_comments < 20 && stale_for(24) {
            Some(CommentPriorityTier::P3Cold)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommentPriorityTier {
    // Ord: higher tiers sort first when ascending is reversed by caller.
    P3Cold = 0,
    P2Warm = 1,
    P1Hot = 2,
    P0Initial = 3,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fresh_post(num_comments: i64) -> Post {
        Post {
            post_id: "t3_abc".to_string(),
            subreddit: "examplesub".to_string(),
            title: "title".to_string(),
            url: "https://reddit.com".to_string(),
            selftext: String::new(),
            author: "someone".to_string(),
            score: 10,
            num_comments,
            created_at: Utc::now(),
            comments_scraped: false,
            initial_comments_scraped: false,
            last_comment_fetch_time: None,
            comments_scraped_at: None,
        }
    }

    #[test]
    fn merge_never_regresses_tracking_fields() {
        let mut scraped = fresh_post(5);
        scraped.comments_scraped = true;
        scraped.initial_comments_scraped = true;
        let now = Utc::now();
        scraped.last_comment_fetch_time = Some(now);

        let incoming = fresh_post(5); // re-fetched listing content, flags false
        let merged = scraped.merge_preserving_tracking(&incoming);

        assert!(merged.comments_scraped);
        assert!(merged.initial_comments_scraped);
        assert_eq!(merged.last_comment_fetch_time, Some(now));
    }

    #[test]
    fn unscraped_post_is_p0() {
        let post = fresh_post(500);
        assert_eq!(post.priority_tier(Utc::now()), Some(CommentPriorityTier::P0Initial));
    }

    #[test]
    fn hot_post_tier_requires_staleness() {
        let mut post = fresh_post(200);
        post.initial_comments_scraped = true;
        post.last_comment_fetch_time = Some(Utc::now());
        assert_eq!(post.priority_tier(Utc::now()), None);

        post.last_comment_fetch_time = Some(Utc::now() - Duration::hours(3));
        assert_eq!(post.priority_tier(Utc::now()), Some(CommentPriorityTier::P1Hot));
    }

    #[test]
    fn cold_post_tier_at_low_comment_count() {
        let mut post = fresh_post(5);
        post.initial_comments_scraped = true;
        post.last_comment_fetch_time = Some(Utc::now() - Duration::hours(25));
        assert_eq!(post.priority_tier(Utc::now()), Some(CommentPriorityTier::P3Cold));
    }
}
