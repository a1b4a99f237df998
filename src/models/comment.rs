use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a comment replies to the post itself or to another comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentType {
    Post,
    Comment,
}

/// A single comment node. `depth` is 0 for top-level (direct reply to the
/// post). If `parent_type = Comment` then `parent_id` must reference a
/// stored comment with `depth = this.depth - 1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub comment_id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub parent_type: ParentType,
    pub depth: i32,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none() && self.depth == 0
    }

    /// Depth cap check: `depth <= max_comment_depth`.
    pub fn within_depth_cap(&self, max_comment_depth: i32) -> bool {
        self.depth <= max_comment_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(depth: i32) -> Comment {
        Comment {
            comment_id: "t1_a".to_string(),
            post_id: "t3_p".to_string(),
            parent_id: None,
            parent_type: ParentType::Post,
            depth,
            author: "someone".to_string(),
            body: "hi".to_string(),
            score: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn depth_cap_boundary() {
        assert!(comment(3).within_depth_cap(3));
        assert!(!comment(4).within_depth_cap(3));
    }

    #[test]
    fn top_level_detection() {
        assert!(comment(0).is_top_level());
    }
}
