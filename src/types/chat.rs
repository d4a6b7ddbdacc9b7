//! Two-party chats.
//!
//! A chat is keyed by its unordered pair of participants: opening a chat
//! between `a` and `b` returns the same row as opening one between `b`
//! and `a`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ChatId, ChatMessageId, UserId};

/// A conversation between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Row id.
    pub id: ChatId,
    /// Participant that opened the chat.
    pub user_a: Option<UserId>,
    /// The other participant.
    pub user_b: Option<UserId>,
}

impl Chat {
    /// Whether `user` takes part in the chat.
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.user_a.as_ref() == Some(user) || self.user_b.as_ref() == Some(user)
    }

    /// The participant that is not `user`.
    pub fn peer_of(&self, user: &UserId) -> Option<&UserId> {
        if self.user_a.as_ref() == Some(user) {
            self.user_b.as_ref()
        } else {
            self.user_a.as_ref()
        }
    }
}

/// One message inside a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Row id.
    pub id: ChatMessageId,
    /// Chat the message belongs to.
    pub chat: ChatId,
    /// Sender.
    pub from: Option<UserId>,
    /// Recipient.
    pub to: Option<UserId>,
    /// Body.
    pub content: Option<String>,
    /// Quoted excerpt.
    pub quote: Option<String>,
    /// Attached image.
    pub image_url: Option<String>,
    /// Send time.
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when sending a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChatMessage {
    /// Chat.
    pub chat: ChatId,
    /// Sender.
    pub from: UserId,
    /// Recipient.
    pub to: UserId,
    /// Body.
    pub content: Option<String>,
    /// Quoted excerpt.
    pub quote: Option<String>,
    /// Attached image.
    pub image_url: Option<String>,
}

/// A chat as listed for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// The chat.
    pub chat: Chat,
    /// The other participant.
    pub peer: Option<UserId>,
    /// Avatar of the other participant.
    pub peer_avatar: Option<String>,
    /// Newest message, if any was sent.
    pub last_message: Option<ChatMessage>,
}
