//! Threaded reply graph over answer comments.
//!
//! Pagination of [`ReplyGraph::all_replies`] slices a freshly materialised
//! traversal. Replies inserted between two page requests can shift later
//! pages; there is no snapshot isolation.

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::forest::{breadth_first, CommentIndex};
use crate::store::{ContentStore, ReplyStore};
use crate::types::{
    AnswerId, Caller, Comment, CommentId, CommentPage, CommentThread, Dependents, NewComment, Page,
    Paged,
};

/// Comment forest manager.
pub struct ReplyGraph<S> {
    store: Arc<S>,
    config: CoreConfig,
}

impl<S> Clone for ReplyGraph<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: ReplyStore + ContentStore> ReplyGraph<S> {
    /// Create a manager with default paging.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CoreConfig::default())
    }

    /// Create a manager with explicit paging.
    pub fn with_config(store: Arc<S>, config: CoreConfig) -> Self {
        Self { store, config }
    }

    /// Post a root comment on an answer, or a reply when `parent` is given.
    pub async fn post_reply(
        &self,
        caller: &Caller,
        answer: AnswerId,
        parent: Option<CommentId>,
        content: &str,
    ) -> CoreResult<Comment> {
        if !caller.role.can_author() {
            return Err(CoreError::Authorization(format!(
                "{} accounts cannot comment",
                caller.role
            )));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::Validation("comment must not be empty".to_string()));
        }
        if self.store.get_answer(answer).await?.is_none() {
            return Err(CoreError::not_found("answer", answer));
        }
        if let Some(parent_id) = parent {
            let parent = self.comment(parent_id).await?;
            if parent.answer != Some(answer) {
                return Err(CoreError::Validation(format!(
                    "comment {} does not belong to answer {}",
                    parent_id, answer
                )));
            }
        }

        let comment = self
            .store
            .insert_comment(NewComment {
                answer,
                parent,
                author: caller.user.clone(),
                content: content.to_string(),
            })
            .await?;
        tracing::info!(
            comment_id = %comment.id,
            answer_id = %answer,
            parent_id = ?parent.map(|p| p.get()),
            author = %caller.user,
            "Comment posted"
        );
        Ok(comment)
    }

    /// First `limit` descendants of `node` in level order.
    pub async fn brief_replies(&self, node: CommentId, limit: usize) -> CoreResult<Vec<Comment>> {
        self.comment(node).await?;
        Ok(breadth_first(&CommentIndex(self.store.as_ref()), node, Some(limit)).await?)
    }

    /// All descendants of `node` in level order, windowed by `page`.
    pub async fn all_replies(&self, node: CommentId, page: Page) -> CoreResult<Paged<Comment>> {
        self.comment(node).await?;
        let all = breadth_first(&CommentIndex(self.store.as_ref()), node, None).await?;
        Ok(Paged {
            total: all.len(),
            items: page.apply(all),
        })
    }

    /// Root comments of an answer with their brief replies.
    ///
    /// `page` is 1-based over the roots; `brief` defaults to the configured
    /// brief reply count.
    pub async fn answer_comments(
        &self,
        answer: AnswerId,
        page: usize,
        brief: Option<usize>,
    ) -> CoreResult<CommentPage> {
        if self.store.get_answer(answer).await?.is_none() {
            return Err(CoreError::not_found("answer", answer));
        }
        let brief = brief.unwrap_or(self.config.brief_replies);
        let roots = self.store.root_comments(answer).await?;
        let root_cnt = roots.len();
        let comment_cnt = self.store.comment_count(answer).await?;

        let mut threads = Vec::new();
        for root in Page::numbered(page, self.config.page_size).apply(roots) {
            let replies = breadth_first(&CommentIndex(self.store.as_ref()), root.id, Some(brief)).await?;
            threads.push(CommentThread { root, replies });
        }
        Ok(CommentPage {
            comment_cnt,
            root_cnt,
            threads,
        })
    }

    /// Delete a comment. Its replies become roots.
    ///
    /// A comment with replies can only be deleted by an admin.
    pub async fn delete_reply(&self, caller: &Caller, node: CommentId) -> CoreResult<()> {
        let comment = self.comment(node).await?;
        if !caller.owns_or_admin(comment.author.as_ref()) {
            return Err(CoreError::Authorization(format!(
                "{} may not delete comment {}",
                caller.user, node
            )));
        }
        if let Err(e) = self
            .store
            .delete_comment(node, Dependents::for_caller(caller))
            .await
        {
            let e = CoreError::from(e);
            if matches!(e, CoreError::DependencyExists(_)) {
                tracing::warn!(comment_id = %node, caller = %caller.user, "Delete blocked by replies");
            }
            return Err(e);
        }
        tracing::info!(comment_id = %node, caller = %caller.user, "Comment deleted");
        Ok(())
    }

    async fn comment(&self, id: CommentId) -> CoreResult<Comment> {
        self.store
            .get_comment(id)
            .await?
            .ok_or_else(|| CoreError::not_found("comment", id))
    }
}
