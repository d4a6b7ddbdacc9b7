//! Timeline messages and their projected view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AnswerId, MessageId, PostId, QuestionId, UserId};

/// Content item a message was created for. Fixed at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MessageSource {
    /// A question.
    Question(QuestionId),
    /// An answer.
    Answer(AnswerId),
    /// A post.
    Post(PostId),
}

impl MessageSource {
    /// Kind tag of the source.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Question(_) => MessageKind::Question,
            Self::Answer(_) => MessageKind::Answer,
            Self::Post(_) => MessageKind::Post,
        }
    }
}

/// Kind of content behind a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Question (`Q`).
    #[serde(rename = "Q")]
    Question,
    /// Answer (`A`).
    #[serde(rename = "A")]
    Answer,
    /// Post (`N`).
    #[serde(rename = "N")]
    Post,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Question => write!(f, "Q"),
            Self::Answer => write!(f, "A"),
            Self::Post => write!(f, "N"),
        }
    }
}

/// A timeline entry, optionally replying to another message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageNode {
    /// Row id.
    pub id: MessageId,
    /// Content the message stands for.
    pub source: MessageSource,
    /// Message this one replies to.
    pub reply_to: Option<MessageId>,
    /// Text shown on the timeline.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Owner and quote resolved from a message's source entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Author of the source entity.
    pub owner: Option<UserId>,
    /// Quote attached to the source entity.
    pub quote: Option<String>,
}

/// Display identity of a message owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerIdentity {
    /// User name.
    pub user_id: UserId,
    /// Avatar URL.
    pub avatar: Option<String>,
}

/// Summary of the message a projected node replies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPreview {
    /// Replied message.
    pub message_id: MessageId,
    /// Its text.
    pub content: String,
    /// Kind of its source.
    pub kind: MessageKind,
    /// Its owner, if still resolvable.
    pub owner: Option<OwnerIdentity>,
    /// Its quote, if still resolvable.
    pub quote: Option<String>,
}

/// A message annotated for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedMessage {
    /// The stored message.
    pub message: MessageNode,
    /// Kind of its source.
    pub kind: MessageKind,
    /// Owner, `None` when the source entity or its author is gone.
    pub owner: Option<OwnerIdentity>,
    /// Quote, `None` when the source entity is gone.
    pub quote: Option<String>,
    /// The message replied to.
    pub re: Option<ReplyPreview>,
}
