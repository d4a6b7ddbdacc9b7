//! Moments feed.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::store::{MomentStore, UserStore};
use crate::types::{Caller, Moment, NewMoment, Page, Paged, UserId};

/// Short status updates, newest first.
pub struct MomentFeed<S> {
    store: Arc<S>,
}

impl<S> Clone for MomentFeed<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: UserStore + MomentStore> MomentFeed<S> {
    /// Create a feed over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Post a moment as the caller.
    pub async fn post(
        &self,
        caller: &Caller,
        content: &str,
        image_url: Option<String>,
        quote: Option<String>,
    ) -> CoreResult<Moment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::Validation("moment content must not be empty".to_string()));
        }
        let moment = self
            .store
            .insert_moment(NewMoment {
                author: caller.user.clone(),
                content: content.to_string(),
                image_url,
                quote,
            })
            .await?;
        tracing::info!(moment_id = %moment.id, author = %caller.user, "Moment posted");
        Ok(moment)
    }

    /// Every moment, newest first.
    pub async fn recent(&self, page: Page) -> CoreResult<Paged<Moment>> {
        Ok(self.store.moments(None, page).await?)
    }

    /// Moments of one author, newest first.
    pub async fn of_user(&self, user: &UserId, page: Page) -> CoreResult<Paged<Moment>> {
        if self.store.get_user(user).await?.is_none() {
            return Err(CoreError::not_found("user", user));
        }
        Ok(self.store.moments(Some(user), page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::InMemorySocialStore;
    use crate::types::{Role, User};

    #[tokio::test]
    async fn test_moments_newest_first_per_author() {
        let store = Arc::new(InMemorySocialStore::new());
        store.add_user(User::new("alice", Role::Visitor));
        store.add_user(User::new("bob", Role::Student));
        let feed = MomentFeed::new(store);
        let alice = Caller::new("alice", Role::Visitor);

        feed.post(&alice, "first", None, None).await.unwrap();
        feed.post(&Caller::new("bob", Role::Student), "hello", None, None)
            .await
            .unwrap();
        let last = feed.post(&alice, " second ", None, Some("quoted".into())).await.unwrap();
        assert_eq!(last.content, "second");

        let all = feed.recent(Page::new(0, 2)).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.items[0].id, last.id);

        let mine = feed.of_user(&UserId::new("alice"), Page::new(0, 10)).await.unwrap();
        let bodies: Vec<&str> = mine.items.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(bodies, vec!["second", "first"]);

        let err = feed.post(&alice, "  ", None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        let err = feed
            .of_user(&UserId::new("nobody"), Page::new(0, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
