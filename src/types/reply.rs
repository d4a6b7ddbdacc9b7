//! Comments: the nodes of the threaded reply graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AnswerId, CommentId, UserId};
use super::vote::Tally;

/// A comment under an answer; `parent == None` marks a root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Row id.
    pub id: CommentId,
    /// Answer the thread hangs off.
    pub answer: Option<AnswerId>,
    /// Comment replied to. Lookup only, never ownership.
    pub parent: Option<CommentId>,
    /// Author.
    pub author: Option<UserId>,
    /// Body.
    pub content: String,
    /// Number of direct replies.
    pub reply_cnt: u32,
    /// Vote aggregates.
    pub tally: Tally,
    /// Submission time.
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// True for a thread root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Fields supplied when posting a comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    /// Answer the comment belongs to.
    pub answer: AnswerId,
    /// Comment replied to, if any.
    pub parent: Option<CommentId>,
    /// Author.
    pub author: UserId,
    /// Body.
    pub content: String,
}

/// Offset/count window over an ordered sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Items skipped.
    pub offset: usize,
    /// Maximum items returned.
    pub count: usize,
}

impl Page {
    /// Create a window.
    pub fn new(offset: usize, count: usize) -> Self {
        Self { offset, count }
    }

    /// 1-based page number with a fixed page size. Page 0 is treated as 1.
    pub fn numbered(page: usize, per_page: usize) -> Self {
        Self {
            offset: page.saturating_sub(1).saturating_mul(per_page),
            count: per_page,
        }
    }

    /// Slice `items` to this window.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.count).collect()
    }
}

/// One window of a larger result plus the total size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    /// Size of the whole result.
    pub total: usize,
    /// Items in the window.
    pub items: Vec<T>,
}

/// A root comment with the head of its reply tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentThread {
    /// The root comment.
    pub root: Comment,
    /// First replies in breadth-first order.
    pub replies: Vec<Comment>,
}

/// One page of an answer's comment section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPage {
    /// Comments under the answer, roots and replies.
    pub comment_cnt: usize,
    /// Root comments under the answer.
    pub root_cnt: usize,
    /// Roots in the window, each with its brief replies.
    pub threads: Vec<CommentThread>,
}
