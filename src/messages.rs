//! Message thread projection.
//!
//! Every question, answer and post owns one timeline message whose
//! [`MessageSource`] names the content kind at write time. Projection
//! resolves owner and quote through that variant; a source entity that no
//! longer exists projects as an empty owner and quote instead of failing
//! the traversal.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::forest::{breadth_first, MessageIndex};
use crate::store::{MessageStore, UserStore};
use crate::types::{
    MessageId, MessageNode, MessageSource, OwnerIdentity, Page, ProjectedMessage, QuestionId,
    ReplyPreview,
};

type Resolved = (Option<OwnerIdentity>, Option<String>);

/// Read-side projection of the message timeline.
pub struct MessageThreads<S> {
    store: Arc<S>,
    config: CoreConfig,
}

impl<S> Clone for MessageThreads<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: MessageStore + UserStore> MessageThreads<S> {
    /// Create a projection with default paging.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CoreConfig::default())
    }

    /// Create a projection with explicit paging.
    pub fn with_config(store: Arc<S>, config: CoreConfig) -> Self {
        Self { store, config }
    }

    /// `root` followed by its reply chain in level order, projected.
    pub async fn thread_from(&self, root: MessageId) -> CoreResult<Vec<ProjectedMessage>> {
        let root = self
            .store
            .get_message(root)
            .await?
            .ok_or_else(|| CoreError::not_found("message", root))?;
        let replies = breadth_first(&MessageIndex(self.store.as_ref()), root.id, None).await?;

        let mut nodes = Vec::with_capacity(replies.len() + 1);
        nodes.push(root);
        nodes.extend(replies);
        self.project_all(nodes).await
    }

    /// Thread rooted at a question's message.
    pub async fn thread_for_question(&self, question: QuestionId) -> CoreResult<Vec<ProjectedMessage>> {
        let root = self
            .store
            .message_for(MessageSource::Question(question))
            .await?
            .ok_or_else(|| CoreError::not_found("question message", question))?;
        self.thread_from(root.id).await
    }

    /// Newest messages first; `page` is 1-based.
    pub async fn timeline(&self, page: usize) -> CoreResult<Vec<ProjectedMessage>> {
        let window = Page::numbered(page, self.config.timeline_page_size);
        let nodes = self.store.latest_messages(window).await?;
        self.project_all(nodes).await
    }

    async fn project_all(&self, nodes: Vec<MessageNode>) -> CoreResult<Vec<ProjectedMessage>> {
        let mut cache: HashMap<MessageSource, Resolved> = HashMap::new();
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            let (owner, quote) = self.resolve(node.source, &mut cache).await?;
            let re = match node.reply_to {
                Some(parent) => self.preview(parent, &mut cache).await?,
                None => None,
            };
            out.push(ProjectedMessage {
                kind: node.source.kind(),
                message: node,
                owner,
                quote,
                re,
            });
        }
        Ok(out)
    }

    async fn preview(
        &self,
        id: MessageId,
        cache: &mut HashMap<MessageSource, Resolved>,
    ) -> CoreResult<Option<ReplyPreview>> {
        let Some(parent) = self.store.get_message(id).await? else {
            return Ok(None);
        };
        let (owner, quote) = self.resolve(parent.source, cache).await?;
        Ok(Some(ReplyPreview {
            message_id: parent.id,
            kind: parent.source.kind(),
            content: parent.content,
            owner,
            quote,
        }))
    }

    async fn resolve(
        &self,
        source: MessageSource,
        cache: &mut HashMap<MessageSource, Resolved>,
    ) -> CoreResult<Resolved> {
        if let Some(hit) = cache.get(&source) {
            return Ok(hit.clone());
        }
        let resolved = match self.store.resolve_source(source).await? {
            None => {
                tracing::debug!(?source, "Message source no longer exists");
                (None, None)
            }
            Some(record) => {
                let owner = match record.owner {
                    Some(user_id) => self.store.get_user(&user_id).await?.map(|u| OwnerIdentity {
                        user_id: u.id,
                        avatar: u.avatar,
                    }),
                    None => None,
                };
                (owner, record.quote)
            }
        };
        cache.insert(source, resolved.clone());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ContentStore, InMemorySocialStore};
    use crate::types::{Dependents, MessageKind, NewAnswer, NewPost, NewQuestion, Role, User, UserId};

    async fn seeded() -> (MessageThreads<InMemorySocialStore>, Arc<InMemorySocialStore>, QuestionId) {
        let store = Arc::new(InMemorySocialStore::new());
        store.add_user(User::new("alice", Role::Student).with_avatar("https://img/alice.png"));
        store.add_user(User::new("bob", Role::Teacher));
        let (question, _) = store
            .insert_question(NewQuestion {
                author: UserId::new("alice"),
                content: "What is a rank?".into(),
                quote: Some("ranks".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        for text in ["first", "second"] {
            store
                .insert_answer(NewAnswer {
                    question: question.id,
                    author: UserId::new("bob"),
                    content: text.into(),
                    quote: Some(format!("q-{text}")),
                })
                .await
                .unwrap();
        }
        (MessageThreads::new(Arc::clone(&store)), store, question.id)
    }

    #[tokio::test]
    async fn test_thread_projects_owner_quote_and_re() {
        let (threads, _, question) = seeded().await;
        let thread = threads.thread_for_question(question).await.unwrap();
        assert_eq!(thread.len(), 3);

        let root = &thread[0];
        assert_eq!(root.kind, MessageKind::Question);
        let owner = root.owner.as_ref().unwrap();
        assert_eq!(owner.user_id, UserId::new("alice"));
        assert_eq!(owner.avatar.as_deref(), Some("https://img/alice.png"));
        assert!(root.re.is_none());

        let reply = &thread[1];
        assert_eq!(reply.kind, MessageKind::Answer);
        assert_eq!(reply.quote.as_deref(), Some("q-first"));
        let re = reply.re.as_ref().unwrap();
        assert_eq!(re.message_id, root.message.id);
        assert_eq!(re.quote.as_deref(), Some("ranks"));
    }

    #[tokio::test]
    async fn test_deleted_source_projects_empty() {
        let (threads, store, question) = seeded().await;
        store.delete_question(question, Dependents::Detach).await.unwrap();

        let thread = threads.thread_for_question(question).await.unwrap();
        assert_eq!(thread.len(), 3);
        assert!(thread[0].owner.is_none());
        assert!(thread[0].quote.is_none());
        assert_eq!(thread[0].kind, MessageKind::Question);

        // Replies still resolve their own source; the preview of the root is empty.
        assert!(thread[1].owner.is_some());
        let re = thread[1].re.as_ref().unwrap();
        assert!(re.owner.is_none() && re.quote.is_none());
    }

    #[tokio::test]
    async fn test_timeline_newest_first() {
        let (threads, store, _) = seeded().await;
        store
            .insert_post(NewPost {
                author: UserId::new("bob"),
                title: "news".into(),
                content: "hello".into(),
                image_url: None,
            })
            .await
            .unwrap();
        let timeline = threads.timeline(1).await.unwrap();
        assert_eq!(timeline.len(), 4);
        assert_eq!(timeline[0].kind, MessageKind::Post);
        assert!(timeline[0].quote.is_none());
        assert!(threads.timeline(2).await.unwrap().is_empty());
        assert!(threads.timeline(usize::MAX).await.unwrap().is_empty());
    }
}
