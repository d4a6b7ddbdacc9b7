//! Ordered (handbook) items and rank-change plans.
//!
//! Within a category the `order` values of the items form the dense
//! sequence `1..=N`. Every mutation is expressed as a [`RankPlan`] that a
//! store applies in a single transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ItemId, UserId};

/// Category assigned when none is given.
pub const DEFAULT_CATEGORY: &str = "uncategorized";

/// An item with a dense rank inside its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedItem {
    /// Row id.
    pub id: ItemId,
    /// Category bucket.
    pub category: String,
    /// 1-based rank within the category.
    pub order: u32,
    /// Owner.
    pub owner: Option<UserId>,
    /// Title; unique across all items when present.
    pub title: Option<String>,
    /// Body.
    pub content: Option<String>,
    /// Free-form label.
    pub label: Option<String>,
    /// Whether readers can see the item.
    pub published: bool,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl OrderedItem {
    /// Current position of the item.
    pub fn slot(&self) -> Slot {
        Slot::new(self.category.clone(), self.order)
    }
}

/// Position of an item: category and rank.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    /// Category bucket.
    pub category: String,
    /// 1-based rank.
    pub order: u32,
}

impl Slot {
    /// Create a slot.
    pub fn new(category: impl Into<String>, order: u32) -> Self {
        Self {
            category: category.into(),
            order,
        }
    }
}

/// Payload of an item; everything except its placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemContent {
    /// Title.
    pub title: Option<String>,
    /// Body.
    pub content: Option<String>,
    /// Free-form label.
    pub label: Option<String>,
    /// Whether readers can see the item.
    pub published: bool,
}

/// Partial update of an item's payload. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemEdit {
    /// New title.
    pub title: Option<String>,
    /// New body.
    pub content: Option<String>,
    /// New label.
    pub label: Option<String>,
    /// New visibility.
    pub published: Option<bool>,
}

impl ItemEdit {
    /// True when the edit changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.label.is_none()
            && self.published.is_none()
    }
}

/// Working copy of an item's payload, edited before publication.
///
/// Created together with its item. Publishing copies the draft onto the
/// item and marks the item published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// Item the draft belongs to.
    pub item: ItemId,
    /// Author of the draft.
    pub owner: Option<UserId>,
    /// Draft title.
    pub title: Option<String>,
    /// Draft body.
    pub content: Option<String>,
    /// Draft label.
    pub label: Option<String>,
    /// True while the draft holds edits the item does not show yet.
    pub pending: bool,
    /// Last save time.
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a draft. `None` fields keep their saved value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftEdit {
    /// New title.
    pub title: Option<String>,
    /// New body.
    pub content: Option<String>,
    /// New label.
    pub label: Option<String>,
}

/// Shift of every rank in `from..=to` (or `from..` when `to` is `None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankShift {
    /// Category the shift applies to.
    pub category: String,
    /// Lowest rank shifted.
    pub from: u32,
    /// Highest rank shifted, open-ended when `None`.
    pub to: Option<u32>,
    /// +1 or -1.
    pub delta: i32,
}

impl RankShift {
    /// Whether `order` falls in the shifted range.
    pub fn covers(&self, order: u32) -> bool {
        order >= self.from && self.to.map_or(true, |to| order <= to)
    }

    /// Rank after applying the shift to a covered `order`.
    pub fn shifted(&self, order: u32) -> u32 {
        (i64::from(order) + i64::from(self.delta)) as u32
    }
}

/// Size a category must still have when the plan is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryGuard {
    /// Category.
    pub category: String,
    /// Item count observed when the plan was built.
    pub len: u32,
}

/// The item mutation carried by a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemWrite {
    /// Create a new item at `slot`.
    Insert {
        /// Target position.
        slot: Slot,
        /// Owner.
        owner: UserId,
        /// Payload.
        content: ItemContent,
    },
    /// Move an existing item and optionally edit it.
    Relocate {
        /// Item.
        id: ItemId,
        /// Position observed when the plan was built.
        from: Slot,
        /// New position.
        to: Slot,
        /// Payload changes.
        edit: ItemEdit,
    },
    /// Remove an item.
    Remove {
        /// Item.
        id: ItemId,
        /// Position observed when the plan was built.
        from: Slot,
    },
}

/// Atomic batch: guards, rank shifts, then the item write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankPlan {
    /// Category sizes that must be unchanged.
    pub guards: Vec<CategoryGuard>,
    /// Shifts applied before the write. Never touch the written item.
    pub shifts: Vec<RankShift>,
    /// The item mutation.
    pub write: ItemWrite,
}

/// Published item count per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    /// Category.
    pub category: String,
    /// Number of published items.
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_ranges() {
        let closed = RankShift {
            category: "faq".into(),
            from: 2,
            to: Some(4),
            delta: 1,
        };
        assert!(!closed.covers(1));
        assert!(closed.covers(2) && closed.covers(4));
        assert!(!closed.covers(5));
        assert_eq!(closed.shifted(3), 4);

        let open = RankShift {
            category: "faq".into(),
            from: 3,
            to: None,
            delta: -1,
        };
        assert!(open.covers(300));
        assert_eq!(open.shifted(3), 2);
    }
}
