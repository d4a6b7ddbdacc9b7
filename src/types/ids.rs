//! Identifier types.
//!
//! Content rows use integer ids assigned by the store in insertion order,
//! so ordering by id is ordering by submission. Users are keyed by name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a user (the unique user name).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id from a user name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the user name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for UserId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw row id.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw row id.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

row_id!(
    /// Identifier of a question.
    QuestionId
);
row_id!(
    /// Identifier of an answer.
    AnswerId
);
row_id!(
    /// Identifier of a comment (a reply-graph node).
    CommentId
);
row_id!(
    /// Identifier of a post.
    PostId
);
row_id!(
    /// Identifier of a timeline message.
    MessageId
);
row_id!(
    /// Identifier of an ordered (handbook) item.
    ItemId
);
row_id!(
    /// Identifier of a moment.
    MomentId
);
row_id!(
    /// Identifier of a two-party chat.
    ChatId
);
row_id!(
    /// Identifier of a chat message.
    ChatMessageId
);
