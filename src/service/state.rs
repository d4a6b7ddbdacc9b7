//! Service state management.
//!
//! One manager per core concern, all sharing the same store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CoreConfig;
use crate::chat::ChatRooms;
use crate::content::ContentBoard;
use crate::error::{CoreError, CoreResult};
use crate::follow::FollowGraph;
use crate::ledger::VoteLedger;
use crate::messages::MessageThreads;
use crate::moments::MomentFeed;
use crate::notify::{Notifier, TracingNotifier};
use crate::ordering::OrderedCollections;
use crate::pairing::PairingEngine;
use crate::replies::ReplyGraph;
use crate::store::postgres::PoolStats;
use crate::store::{InMemorySocialStore, PostgresSocialStore, SocialStore};
use crate::types::{Caller, UserId};

/// Backend liveness as seen by the readiness checks.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Whether the backend answers queries.
    async fn is_healthy(&self) -> bool;

    /// Connection pool statistics, for pooled backends.
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

#[async_trait]
impl HealthCheck for InMemorySocialStore {
    async fn is_healthy(&self) -> bool {
        true
    }
}

#[async_trait]
impl HealthCheck for PostgresSocialStore {
    async fn is_healthy(&self) -> bool {
        PostgresSocialStore::is_healthy(self).await
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(PostgresSocialStore::pool_stats(self))
    }
}

/// Shared service state.
pub struct ServiceState<S> {
    /// The backing store.
    pub store: Arc<S>,
    /// Paging defaults.
    pub config: CoreConfig,
    /// Vote ledger.
    pub votes: VoteLedger<S>,
    /// Handbook ranks.
    pub handbook: OrderedCollections<S>,
    /// Comment forest.
    pub replies: ReplyGraph<S>,
    /// Follow edges.
    pub follows: FollowGraph<S>,
    /// Pairing scores.
    pub pairing: PairingEngine<S>,
    /// Timeline projection.
    pub threads: MessageThreads<S>,
    /// Questions, answers and posts.
    pub content: ContentBoard<S>,
    /// Status updates.
    pub moments: MomentFeed<S>,
    /// Two-party chats.
    pub chats: ChatRooms<S>,
}

impl<S: SocialStore + HealthCheck + 'static> ServiceState<S> {
    /// Create service state that logs notifications.
    pub fn new(store: S, config: CoreConfig) -> Self {
        Self::with_notifier(store, config, Arc::new(TracingNotifier))
    }

    /// Create service state with a notification collaborator.
    pub fn with_notifier(store: S, config: CoreConfig, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(store);
        Self {
            votes: VoteLedger::new(Arc::clone(&store)),
            handbook: OrderedCollections::new(Arc::clone(&store)),
            replies: ReplyGraph::with_config(Arc::clone(&store), config),
            follows: FollowGraph::new(Arc::clone(&store)),
            pairing: PairingEngine::new(Arc::clone(&store)),
            threads: MessageThreads::with_config(Arc::clone(&store), config),
            content: ContentBoard::with_notifier(Arc::clone(&store), notifier),
            moments: MomentFeed::new(Arc::clone(&store)),
            chats: ChatRooms::new(Arc::clone(&store)),
            config,
            store,
        }
    }

    /// Create service state with configuration read from the environment.
    pub fn from_env(store: S) -> Self {
        Self::new(store, CoreConfig::from_env())
    }

    /// Resolve an authenticated user name to a caller.
    pub async fn caller(&self, user: &str) -> CoreResult<Caller> {
        let id = UserId::new(user);
        match self.store.get_user(&id).await? {
            Some(user) => Ok(Caller::of(&user)),
            None => Err(CoreError::Authorization(format!("unknown user {}", id))),
        }
    }
}

impl<S> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
            votes: self.votes.clone(),
            handbook: self.handbook.clone(),
            replies: self.replies.clone(),
            follows: self.follows.clone(),
            pairing: self.pairing.clone(),
            threads: self.threads.clone(),
            content: self.content.clone(),
            moments: self.moments.clone(),
            chats: self.chats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{Role, User};

    #[tokio::test]
    async fn test_caller_takes_stored_role() {
        let store = InMemorySocialStore::new();
        store.add_user(User::new("ada", Role::Admin));
        let state = ServiceState::new(store, CoreConfig::default());

        let caller = state.caller("ada").await.unwrap();
        assert_eq!(caller.role, Role::Admin);

        let err = state.caller("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationError);
    }

    #[tokio::test]
    async fn test_memory_store_is_always_ready() {
        let state = ServiceState::new(InMemorySocialStore::new(), CoreConfig::default());
        assert!(state.store.is_healthy().await);
        assert!(state.store.pool_stats().is_none());
    }
}
