//! Follow graph maintenance.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::store::{FollowStore, UserStore};
use crate::types::{Caller, FollowEdge, UserId, UserTag};

/// Follow and unfollow operations feeding the pairing engine.
pub struct FollowGraph<S> {
    store: Arc<S>,
}

impl<S> Clone for FollowGraph<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: UserStore + FollowStore> FollowGraph<S> {
    /// Create a manager over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Make the caller follow `followee`.
    pub async fn follow(&self, caller: &Caller, followee: &UserId) -> CoreResult<FollowEdge> {
        if &caller.user == followee {
            return Err(CoreError::Validation("users cannot follow themselves".to_string()));
        }
        self.require_user(&caller.user).await?;
        self.require_user(followee).await?;
        let edge = self.store.insert_follow(&caller.user, followee).await?;
        tracing::info!(follower = %caller.user, followee = %followee, "Follow edge created");
        Ok(edge)
    }

    /// Remove the caller's edge to `followee`.
    pub async fn unfollow(&self, caller: &Caller, followee: &UserId) -> CoreResult<()> {
        self.store.delete_follow(&caller.user, followee).await?;
        tracing::info!(follower = %caller.user, followee = %followee, "Follow edge removed");
        Ok(())
    }

    /// Edges into `user`, newest first.
    pub async fn followers(&self, user: &UserId) -> CoreResult<Vec<FollowEdge>> {
        self.require_user(user).await?;
        Ok(self.store.followers(user).await?)
    }

    /// Edges out of `user`, newest first.
    pub async fn following(&self, user: &UserId) -> CoreResult<Vec<FollowEdge>> {
        self.require_user(user).await?;
        Ok(self.store.following(user).await?)
    }

    /// Number of users following `user`.
    pub async fn follower_count(&self, user: &UserId) -> CoreResult<usize> {
        Ok(self.followers(user).await?.len())
    }

    /// Attach an interest tag to the caller's profile.
    pub async fn add_tag(&self, caller: &Caller, tag: &str) -> CoreResult<UserTag> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(CoreError::Validation("tag must not be empty".to_string()));
        }
        self.require_user(&caller.user).await?;
        let tag = self.store.add_tag(&caller.user, tag).await?;
        tracing::info!(user = %caller.user, tag = %tag.tag, "Tag added");
        Ok(tag)
    }

    /// Tags of `user`, oldest first.
    pub async fn tags(&self, user: &UserId) -> CoreResult<Vec<UserTag>> {
        self.require_user(user).await?;
        Ok(self.store.user_tags(user).await?)
    }

    async fn require_user(&self, user: &UserId) -> CoreResult<()> {
        match self.store.get_user(user).await? {
            Some(_) => Ok(()),
            None => Err(CoreError::not_found("user", user)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::InMemorySocialStore;
    use crate::types::{Role, User};

    fn setup() -> FollowGraph<InMemorySocialStore> {
        let store = Arc::new(InMemorySocialStore::new());
        for name in ["alice", "bob", "carol"] {
            store.add_user(User::new(name, Role::Visitor));
        }
        FollowGraph::new(store)
    }

    #[tokio::test]
    async fn test_follow_rules() {
        let graph = setup();
        let alice = Caller::new("alice", Role::Visitor);
        let bob = UserId::new("bob");

        let err = graph.follow(&alice, &UserId::new("alice")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        graph.follow(&alice, &bob).await.unwrap();
        let err = graph.follow(&alice, &bob).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = graph.follow(&alice, &UserId::new("nobody")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_followers_newest_first() {
        let graph = setup();
        let carol = UserId::new("carol");
        graph.follow(&Caller::new("alice", Role::Visitor), &carol).await.unwrap();
        graph.follow(&Caller::new("bob", Role::Visitor), &carol).await.unwrap();

        let followers = graph.followers(&carol).await.unwrap();
        assert_eq!(followers[0].follower, UserId::new("bob"));
        assert_eq!(graph.follower_count(&carol).await.unwrap(), 2);

        graph.unfollow(&Caller::new("bob", Role::Visitor), &carol).await.unwrap();
        assert_eq!(graph.follower_count(&carol).await.unwrap(), 1);
        let err = graph
            .unfollow(&Caller::new("bob", Role::Visitor), &carol)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_tags_are_trimmed_and_unique() {
        let graph = setup();
        let alice = Caller::new("alice", Role::Visitor);

        let tag = graph.add_tag(&alice, "  rust ").await.unwrap();
        assert_eq!(tag.tag, "rust");
        let err = graph.add_tag(&alice, "rust").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = graph.add_tag(&alice, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        graph.add_tag(&alice, "sql").await.unwrap();
        let tags: Vec<String> = graph
            .tags(&UserId::new("alice"))
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.tag)
            .collect();
        assert_eq!(tags, vec!["rust", "sql"]);
        assert!(graph.tags(&UserId::new("bob")).await.unwrap().is_empty());
    }
}
