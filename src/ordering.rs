//! Ordered collection manager.
//!
//! Items in a category carry the dense ranks `1..=N`. Each operation reads
//! the category sizes it depends on, builds a [`RankPlan`] with the pure
//! planners below, and hands the plan to the store, which re-checks the
//! guards and applies shifts and write in one transaction.
//!
//! ## Rank arithmetic
//!
//! | operation                    | shifts                                    |
//! |------------------------------|-------------------------------------------|
//! | insert at R                  | `[R, ..]` +1                              |
//! | move R0 -> R1, R1 < R0       | `[R1, R0-1]` +1                           |
//! | move R0 -> R1, R1 > R0       | `[R0+1, R1]` -1                           |
//! | move to other category at R1 | dest `[R1, ..]` +1, source `[R0+1, ..]` -1 |
//! | delete at R0                 | `[R0+1, ..]` -1                           |

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::store::RankStore;
use crate::types::{
    Caller, CategoryCount, CategoryGuard, Draft, DraftEdit, ItemContent, ItemEdit, ItemId, ItemWrite, OrderedItem,
    RankPlan, RankShift, Slot, UserId, DEFAULT_CATEGORY,
};

/// Plan an insert into a category currently holding `len` items.
///
/// `at` defaults to `len + 1` (append) and must lie in `1..=len + 1`.
pub fn plan_insert(
    category: &str,
    len: u32,
    at: Option<u32>,
    owner: UserId,
    content: ItemContent,
) -> CoreResult<RankPlan> {
    let rank = at.unwrap_or(len + 1);
    check_rank(rank, len + 1)?;
    let shifts = if rank <= len {
        vec![open_shift(category, rank, 1)]
    } else {
        Vec::new()
    };
    Ok(RankPlan {
        guards: vec![guard(category, len)],
        shifts,
        write: ItemWrite::Insert {
            slot: Slot::new(category, rank),
            owner,
            content,
        },
    })
}

/// Plan moving `item` to rank `to.order` of `to.category`.
///
/// `source_len` is the size of the item's category and `dest_len` the size
/// of the destination (ignored for a same-category move). Returns `None`
/// when nothing would change.
pub fn plan_move(
    item: &OrderedItem,
    source_len: u32,
    to: Slot,
    dest_len: u32,
    edit: ItemEdit,
) -> CoreResult<Option<RankPlan>> {
    let from = item.slot();

    if to.category == from.category {
        check_rank(to.order, source_len)?;
        if to.order == from.order && edit.is_empty() {
            return Ok(None);
        }
        let shifts = if to.order < from.order {
            vec![RankShift {
                category: from.category.clone(),
                from: to.order,
                to: Some(from.order - 1),
                delta: 1,
            }]
        } else if to.order > from.order {
            vec![RankShift {
                category: from.category.clone(),
                from: from.order + 1,
                to: Some(to.order),
                delta: -1,
            }]
        } else {
            Vec::new()
        };
        return Ok(Some(RankPlan {
            guards: vec![guard(&from.category, source_len)],
            shifts,
            write: ItemWrite::Relocate { id: item.id, from, to, edit },
        }));
    }

    check_rank(to.order, dest_len + 1)?;
    Ok(Some(RankPlan {
        guards: vec![guard(&from.category, source_len), guard(&to.category, dest_len)],
        shifts: vec![
            open_shift(&to.category, to.order, 1),
            open_shift(&from.category, from.order + 1, -1),
        ],
        write: ItemWrite::Relocate { id: item.id, from, to, edit },
    }))
}

/// Plan removing `item` from a category of `len` items.
pub fn plan_delete(item: &OrderedItem, len: u32) -> RankPlan {
    let from = item.slot();
    RankPlan {
        guards: vec![guard(&from.category, len)],
        shifts: vec![open_shift(&from.category, from.order + 1, -1)],
        write: ItemWrite::Remove { id: item.id, from },
    }
}

fn check_rank(rank: u32, max: u32) -> CoreResult<()> {
    if rank == 0 || rank > max {
        return Err(CoreError::Validation(format!(
            "rank {} out of range 1..={}",
            rank, max
        )));
    }
    Ok(())
}

fn guard(category: &str, len: u32) -> CategoryGuard {
    CategoryGuard {
        category: category.to_string(),
        len,
    }
}

fn open_shift(category: &str, from: u32, delta: i32) -> RankShift {
    RankShift {
        category: category.to_string(),
        from,
        to: None,
        delta,
    }
}

fn normalize_category(category: Option<&str>) -> CoreResult<String> {
    match category.map(str::trim) {
        None | Some("") => Ok(DEFAULT_CATEGORY.to_string()),
        Some(c) if c.len() > 100 => Err(CoreError::Validation(
            "category must be at most 100 characters".to_string(),
        )),
        Some(c) => Ok(c.to_string()),
    }
}

/// Handbook manager keeping every category densely ranked.
pub struct OrderedCollections<S> {
    store: Arc<S>,
}

impl<S> Clone for OrderedCollections<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RankStore> OrderedCollections<S> {
    /// Create a manager over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Insert an item, appending when `at_rank` is `None`.
    pub async fn insert(
        &self,
        caller: &Caller,
        category: Option<&str>,
        at_rank: Option<u32>,
        content: ItemContent,
    ) -> CoreResult<OrderedItem> {
        if !caller.role.can_author() {
            return Err(CoreError::Authorization(format!(
                "{} accounts cannot create handbook items",
                caller.role
            )));
        }
        let category = normalize_category(category)?;
        let len = self.store.category_len(&category).await?;
        let plan = plan_insert(&category, len, at_rank, caller.user.clone(), content)?;
        let item = self.apply(plan).await?.ok_or_else(|| {
            CoreError::Unknown("store returned no item for an insert".to_string())
        })?;
        tracing::info!(
            item_id = %item.id,
            category = %item.category,
            order = item.order,
            owner = %caller.user,
            "Handbook item inserted"
        );
        Ok(item)
    }

    /// Move an item to `rank` of `category` (the item's own category when `None`).
    pub async fn move_item(
        &self,
        caller: &Caller,
        id: ItemId,
        category: Option<&str>,
        rank: u32,
    ) -> CoreResult<OrderedItem> {
        self.relocate(caller, id, category, Some(rank), ItemEdit::default())
            .await
    }

    /// Change an item's payload in place.
    pub async fn edit(&self, caller: &Caller, id: ItemId, edit: ItemEdit) -> CoreResult<OrderedItem> {
        self.relocate(caller, id, None, None, edit).await
    }

    async fn relocate(
        &self,
        caller: &Caller,
        id: ItemId,
        category: Option<&str>,
        rank: Option<u32>,
        edit: ItemEdit,
    ) -> CoreResult<OrderedItem> {
        let item = self.get(id).await?;
        self.authorize(caller, &item)?;

        let dest = match category {
            Some(_) => normalize_category(category)?,
            None => item.category.clone(),
        };
        let to = Slot::new(dest, rank.unwrap_or(item.order));
        let source_len = self.store.category_len(&item.category).await?;
        let dest_len = if to.category == item.category {
            source_len
        } else {
            self.store.category_len(&to.category).await?
        };

        let Some(plan) = plan_move(&item, source_len, to, dest_len, edit)? else {
            tracing::debug!(item_id = %id, "Move to current slot ignored");
            return Ok(item);
        };
        let moved = self.apply(plan).await?.ok_or_else(|| {
            CoreError::Unknown("store returned no item for a move".to_string())
        })?;
        tracing::info!(
            item_id = %id,
            from_category = %item.category,
            from_order = item.order,
            to_category = %moved.category,
            to_order = moved.order,
            "Handbook item relocated"
        );
        Ok(moved)
    }

    /// Delete an item and close the gap it leaves.
    pub async fn delete(&self, caller: &Caller, id: ItemId) -> CoreResult<()> {
        let item = self.get(id).await?;
        self.authorize(caller, &item)?;
        let len = self.store.category_len(&item.category).await?;
        self.apply(plan_delete(&item, len)).await?;
        tracing::info!(item_id = %id, category = %item.category, order = item.order, "Handbook item deleted");
        Ok(())
    }

    /// Fetch an item.
    pub async fn get(&self, id: ItemId) -> CoreResult<OrderedItem> {
        self.store
            .get_item(id)
            .await?
            .ok_or_else(|| CoreError::not_found("item", id))
    }

    /// Fetch the item at a rank.
    pub async fn find(&self, category: &str, order: u32) -> CoreResult<OrderedItem> {
        self.store
            .find_item(category, order)
            .await?
            .ok_or_else(|| CoreError::not_found("item", format!("{}#{}", category, order)))
    }

    /// Items of a category in rank order.
    pub async fn list(&self, category: &str) -> CoreResult<Vec<OrderedItem>> {
        Ok(self.store.list_category(category).await?)
    }

    /// Categories with published items, largest first.
    pub async fn categories(&self) -> CoreResult<Vec<CategoryCount>> {
        Ok(self.store.published_categories().await?)
    }

    /// Next published item after `id` in its category.
    pub async fn next_published(&self, id: ItemId) -> CoreResult<Option<OrderedItem>> {
        let item = self.get(id).await?;
        let items = self.store.list_category(&item.category).await?;
        Ok(items
            .into_iter()
            .find(|i| i.published && i.order > item.order))
    }

    /// Previous published item before `id` in its category.
    pub async fn prev_published(&self, id: ItemId) -> CoreResult<Option<OrderedItem>> {
        let item = self.get(id).await?;
        let items = self.store.list_category(&item.category).await?;
        Ok(items
            .into_iter()
            .rev()
            .find(|i| i.published && i.order < item.order))
    }

    /// The caller's working draft of an item.
    pub async fn draft(&self, caller: &Caller, id: ItemId) -> CoreResult<Draft> {
        self.owned_draft(caller, id).await
    }

    /// Save edits to the draft without touching the published item.
    pub async fn save_draft(&self, caller: &Caller, id: ItemId, edit: DraftEdit) -> CoreResult<Draft> {
        self.owned_draft(caller, id).await?;
        let draft = self.store.save_draft(id, edit).await?;
        tracing::info!(item_id = %id, owner = %caller.user, "Draft saved");
        Ok(draft)
    }

    /// Copy the draft onto the item and mark the item published.
    pub async fn publish_draft(&self, caller: &Caller, id: ItemId) -> CoreResult<OrderedItem> {
        self.owned_draft(caller, id).await?;
        let item = self.store.publish_draft(id).await.map_err(|e| {
            tracing::warn!(item_id = %id, error = %e, "Draft publish rejected");
            CoreError::from(e)
        })?;
        tracing::info!(item_id = %id, owner = %caller.user, "Draft published");
        Ok(item)
    }

    /// Discard a draft. The item itself stays.
    pub async fn delete_draft(&self, caller: &Caller, id: ItemId) -> CoreResult<()> {
        let draft = self
            .store
            .get_draft(id)
            .await?
            .ok_or_else(|| CoreError::not_found("draft", id))?;
        if !caller.owns_or_admin(draft.owner.as_ref()) {
            return Err(CoreError::Authorization(format!(
                "{} does not own draft {}",
                caller.user, id
            )));
        }
        self.store.delete_draft(id).await?;
        tracing::info!(item_id = %id, "Draft deleted");
        Ok(())
    }

    async fn owned_draft(&self, caller: &Caller, id: ItemId) -> CoreResult<Draft> {
        let draft = self
            .store
            .get_draft(id)
            .await?
            .ok_or_else(|| CoreError::not_found("draft", id))?;
        if draft.owner.as_ref() != Some(&caller.user) {
            return Err(CoreError::Authorization(format!(
                "draft {} belongs to another author",
                id
            )));
        }
        Ok(draft)
    }

    fn authorize(&self, caller: &Caller, item: &OrderedItem) -> CoreResult<()> {
        if caller.owns_or_admin(item.owner.as_ref()) {
            Ok(())
        } else {
            Err(CoreError::Authorization(format!(
                "{} does not own item {}",
                caller.user, item.id
            )))
        }
    }

    async fn apply(&self, plan: RankPlan) -> CoreResult<Option<OrderedItem>> {
        self.store.apply_rank_plan(plan).await.map_err(|e| {
            tracing::warn!(error = %e, "Rank plan rejected");
            CoreError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::InMemorySocialStore;
    use crate::types::{Role, User};
    use chrono::Utc;

    fn item(category: &str, order: u32) -> OrderedItem {
        OrderedItem {
            id: ItemId::new(1),
            category: category.into(),
            order,
            owner: None,
            title: None,
            content: None,
            label: None,
            published: true,
            updated_at: Utc::now(),
        }
    }

    fn titled(title: &str) -> ItemContent {
        ItemContent {
            title: Some(title.into()),
            published: true,
            ..Default::default()
        }
    }

    fn setup() -> (OrderedCollections<InMemorySocialStore>, Caller) {
        let store = Arc::new(InMemorySocialStore::new());
        store.add_user(User::new("alice", Role::Teacher));
        (OrderedCollections::new(store), Caller::new("alice", Role::Teacher))
    }

    async fn titles(manager: &OrderedCollections<InMemorySocialStore>, category: &str) -> Vec<String> {
        manager
            .list(category)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title.unwrap_or_default())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Planner
    // ------------------------------------------------------------------------

    #[test]
    fn test_insert_bounds() {
        let owner = UserId::new("alice");
        assert!(plan_insert("faq", 3, Some(4), owner.clone(), ItemContent::default()).is_ok());
        assert!(plan_insert("faq", 3, Some(0), owner.clone(), ItemContent::default()).is_err());
        assert!(plan_insert("faq", 3, Some(5), owner.clone(), ItemContent::default()).is_err());

        let append = plan_insert("faq", 3, None, owner, ItemContent::default()).unwrap();
        assert!(append.shifts.is_empty());
        assert!(matches!(append.write, ItemWrite::Insert { ref slot, .. } if slot.order == 4));
    }

    #[test]
    fn test_move_up_shifts_closed_range() {
        let plan = plan_move(&item("faq", 4), 5, Slot::new("faq", 2), 5, ItemEdit::default())
            .unwrap()
            .unwrap();
        assert_eq!(
            plan.shifts,
            vec![RankShift { category: "faq".into(), from: 2, to: Some(3), delta: 1 }]
        );
    }

    #[test]
    fn test_move_down_shifts_closed_range() {
        let plan = plan_move(&item("faq", 2), 5, Slot::new("faq", 4), 5, ItemEdit::default())
            .unwrap()
            .unwrap();
        assert_eq!(
            plan.shifts,
            vec![RankShift { category: "faq".into(), from: 3, to: Some(4), delta: -1 }]
        );
    }

    #[test]
    fn test_move_to_same_slot_is_noop() {
        let plan = plan_move(&item("faq", 2), 3, Slot::new("faq", 2), 3, ItemEdit::default()).unwrap();
        assert!(plan.is_none());
    }

    #[test]
    fn test_cross_category_move_closes_source_gap() {
        let plan = plan_move(&item("faq", 2), 3, Slot::new("howto", 1), 0, ItemEdit::default())
            .unwrap()
            .unwrap();
        assert_eq!(plan.guards.len(), 2);
        assert_eq!(plan.shifts[0].category, "howto");
        assert_eq!(plan.shifts[1], RankShift { category: "faq".into(), from: 3, to: None, delta: -1 });
        // Destination may only be appended to at M + 1.
        assert!(plan_move(&item("faq", 2), 3, Slot::new("howto", 2), 0, ItemEdit::default()).is_err());
    }

    // ------------------------------------------------------------------------
    // Manager
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_insert_at_rank_shifts_tail() {
        let (manager, alice) = setup();
        for t in ["one", "two", "three"] {
            manager.insert(&alice, Some("faq"), None, titled(t)).await.unwrap();
        }
        let new = manager.insert(&alice, Some("faq"), Some(2), titled("new")).await.unwrap();
        assert_eq!(new.order, 2);
        assert_eq!(titles(&manager, "faq").await, vec!["one", "new", "two", "three"]);
    }

    #[tokio::test]
    async fn test_move_across_categories_keeps_both_dense() {
        let (manager, alice) = setup();
        let mut ids = Vec::new();
        for t in ["a", "b", "c"] {
            ids.push(manager.insert(&alice, Some("faq"), None, titled(t)).await.unwrap().id);
        }
        manager.insert(&alice, Some("howto"), None, titled("x")).await.unwrap();

        let moved = manager.move_item(&alice, ids[0], Some("howto"), 1).await.unwrap();
        assert_eq!(moved.slot(), Slot::new("howto", 1));
        assert_eq!(titles(&manager, "faq").await, vec!["b", "c"]);
        assert_eq!(titles(&manager, "howto").await, vec!["a", "x"]);
        let orders: Vec<u32> = manager.list("faq").await.unwrap().iter().map(|i| i.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_delete_closes_gap() {
        let (manager, alice) = setup();
        let mut ids = Vec::new();
        for t in ["a", "b", "c"] {
            ids.push(manager.insert(&alice, None, None, titled(t)).await.unwrap().id);
        }
        manager.delete(&alice, ids[0]).await.unwrap();
        let items = manager.list(DEFAULT_CATEGORY).await.unwrap();
        assert_eq!(items.iter().map(|i| i.order).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(items[0].title.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_non_owner_cannot_move() {
        let (manager, alice) = setup();
        let item = manager.insert(&alice, Some("faq"), None, titled("a")).await.unwrap();
        let mallory = Caller::new("mallory", Role::Student);
        let err = manager.move_item(&mallory, item.id, None, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationError);

        let visitor = Caller::new("vic", Role::Visitor);
        let err = manager.insert(&visitor, Some("faq"), None, titled("b")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationError);
    }

    #[tokio::test]
    async fn test_duplicate_title_is_conflict() {
        let (manager, alice) = setup();
        manager.insert(&alice, Some("faq"), None, titled("same")).await.unwrap();
        let err = manager.insert(&alice, Some("faq"), None, titled("same")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(manager.list("faq").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_published_navigation() {
        let (manager, alice) = setup();
        let a = manager.insert(&alice, Some("faq"), None, titled("a")).await.unwrap();
        let draft = ItemContent { title: Some("draft".into()), ..Default::default() };
        manager.insert(&alice, Some("faq"), None, draft).await.unwrap();
        let c = manager.insert(&alice, Some("faq"), None, titled("c")).await.unwrap();

        assert_eq!(manager.next_published(a.id).await.unwrap().map(|i| i.id), Some(c.id));
        assert_eq!(manager.prev_published(c.id).await.unwrap().map(|i| i.id), Some(a.id));
        assert!(manager.prev_published(a.id).await.unwrap().is_none());

        let cats = manager.categories().await.unwrap();
        assert_eq!(cats, vec![CategoryCount { category: "faq".into(), count: 2 }]);
    }

    #[tokio::test]
    async fn test_edit_keeps_rank() {
        let (manager, alice) = setup();
        let item = manager.insert(&alice, Some("faq"), None, titled("a")).await.unwrap();
        let edited = manager
            .edit(&alice, item.id, ItemEdit { label: Some("intro".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(edited.order, 1);
        assert_eq!(edited.label.as_deref(), Some("intro"));
    }

    #[tokio::test]
    async fn test_draft_publish_is_owner_only() {
        let (manager, alice) = setup();
        let bob = Caller::new("bob", Role::Teacher);
        let admin = Caller::new("root", Role::Admin);
        let item = manager
            .insert(&alice, Some("faq"), None, ItemContent { title: Some("v1".into()), ..Default::default() })
            .await
            .unwrap();
        assert!(!item.published);

        let draft = manager.draft(&alice, item.id).await.unwrap();
        assert_eq!(draft.title.as_deref(), Some("v1"));
        assert!(!draft.pending);

        let edit = DraftEdit {
            title: Some("v2".into()),
            ..Default::default()
        };
        let saved = manager.save_draft(&alice, item.id, edit.clone()).await.unwrap();
        assert!(saved.pending);
        assert_eq!(manager.get(item.id).await.unwrap().title.as_deref(), Some("v1"));

        let err = manager.save_draft(&bob, item.id, edit).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationError);
        let err = manager.publish_draft(&admin, item.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationError);

        let published = manager.publish_draft(&alice, item.id).await.unwrap();
        assert_eq!(published.title.as_deref(), Some("v2"));
        assert!(published.published);
        assert!(!manager.draft(&alice, item.id).await.unwrap().pending);

        manager.delete_draft(&admin, item.id).await.unwrap();
        let err = manager.draft(&alice, item.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(manager.get(item.id).await.unwrap().title.as_deref(), Some("v2"));
    }
}
