//! Two-party chats.
//!
//! Only the two participants of a chat can read or post in it. The
//! recipient of a message is always the sender's peer; a client cannot
//! address a message to anyone else.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::store::{ChatStore, UserStore};
use crate::types::{Caller, Chat, ChatId, ChatMessage, ChatMessageId, ChatSummary, NewChatMessage, UserId};

/// Chat rooms between pairs of users.
pub struct ChatRooms<S> {
    store: Arc<S>,
}

impl<S> Clone for ChatRooms<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

/// Fields of an outgoing chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outgoing {
    /// Body.
    pub content: Option<String>,
    /// Quoted excerpt.
    pub quote: Option<String>,
    /// Attached image.
    pub image_url: Option<String>,
}

impl<S: UserStore + ChatStore> ChatRooms<S> {
    /// Create a manager over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The chat between the caller and `peer`, created on first use.
    pub async fn open(&self, caller: &Caller, peer: &UserId) -> CoreResult<Chat> {
        if &caller.user == peer {
            return Err(CoreError::Validation("cannot chat with yourself".to_string()));
        }
        for user in [&caller.user, peer] {
            if self.store.get_user(user).await?.is_none() {
                return Err(CoreError::not_found("user", user));
            }
        }
        let chat = self.store.open_chat(&caller.user, peer).await?;
        tracing::debug!(chat_id = %chat.id, user = %caller.user, peer = %peer, "Chat opened");
        Ok(chat)
    }

    /// The caller's chats, most recently active first.
    pub async fn conversations(&self, caller: &Caller) -> CoreResult<Vec<ChatSummary>> {
        let mut chats = self.store.chats_of(&caller.user).await?;
        chats.sort_by(|(a, am), (b, bm)| {
            let at = am.as_ref().map(|m| m.id);
            let bt = bm.as_ref().map(|m| m.id);
            bt.cmp(&at).then_with(|| b.id.cmp(&a.id))
        });

        let mut out = Vec::with_capacity(chats.len());
        for (chat, last_message) in chats {
            let peer = chat.peer_of(&caller.user).cloned();
            let peer_avatar = match &peer {
                Some(peer) => self.store.get_user(peer).await?.and_then(|u| u.avatar),
                None => None,
            };
            out.push(ChatSummary {
                chat,
                peer,
                peer_avatar,
                last_message,
            });
        }
        Ok(out)
    }

    /// Send a message into a chat the caller takes part in.
    pub async fn send(&self, caller: &Caller, chat: ChatId, message: Outgoing) -> CoreResult<ChatMessage> {
        let chat = self.participant_chat(caller, chat).await?;
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        if blank(&message.content) && blank(&message.image_url) {
            return Err(CoreError::Validation(
                "a chat message needs content or an image".to_string(),
            ));
        }
        let to = chat
            .peer_of(&caller.user)
            .cloned()
            .ok_or_else(|| CoreError::Validation("chat peer no longer exists".to_string()))?;
        let sent = self
            .store
            .insert_chat_message(NewChatMessage {
                chat: chat.id,
                from: caller.user.clone(),
                to,
                content: message.content,
                quote: message.quote,
                image_url: message.image_url,
            })
            .await?;
        tracing::info!(chat_id = %chat.id, message_id = %sent.id, from = %caller.user, "Chat message sent");
        Ok(sent)
    }

    /// Messages of a chat, newest first.
    pub async fn messages(&self, caller: &Caller, chat: ChatId) -> CoreResult<Vec<ChatMessage>> {
        let chat = self.participant_chat(caller, chat).await?;
        Ok(self.store.chat_messages(chat.id).await?)
    }

    /// Delete one of the caller's own messages.
    pub async fn delete_message(&self, caller: &Caller, id: ChatMessageId) -> CoreResult<()> {
        let message = self
            .store
            .get_chat_message(id)
            .await?
            .ok_or_else(|| CoreError::not_found("chat message", id))?;
        if message.from.as_ref() != Some(&caller.user) {
            return Err(CoreError::Authorization(format!(
                "{} did not send message {}",
                caller.user, id
            )));
        }
        self.store.delete_chat_message(id).await?;
        tracing::info!(message_id = %id, chat_id = %message.chat, "Chat message deleted");
        Ok(())
    }

    async fn participant_chat(&self, caller: &Caller, id: ChatId) -> CoreResult<Chat> {
        let chat = self
            .store
            .get_chat(id)
            .await?
            .ok_or_else(|| CoreError::not_found("chat", id))?;
        if !chat.has_participant(&caller.user) {
            return Err(CoreError::Authorization(format!(
                "{} is not part of chat {}",
                caller.user, id
            )));
        }
        Ok(chat)
    }
}
