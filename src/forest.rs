//! Breadth-first traversal over parent references.
//!
//! Reply forests are stored as child -> parent lookups only. Traversal
//! walks an explicit queue over a child index, never recursion, and keeps
//! a visited set so a corrupted parent chain cannot loop forever.

use std::collections::{HashSet, VecDeque};
use std::fmt::Display;
use std::hash::Hash;

use async_trait::async_trait;

use crate::store::{MessageStore, ReplyStore, StoreResult};
use crate::types::{Comment, CommentId, MessageId, MessageNode};

/// Index from a node to its direct children.
#[async_trait]
pub trait ChildIndex: Send + Sync {
    /// Node key.
    type Id: Copy + Eq + Hash + Display + Send + Sync;
    /// Node payload.
    type Node: Send;

    /// Key of a node.
    fn node_id(node: &Self::Node) -> Self::Id;

    /// Direct children in stable order.
    async fn children(&self, id: Self::Id) -> StoreResult<Vec<Self::Node>>;
}

/// Descendants of `root` in level order, excluding `root` itself.
///
/// With `limit`, traversal stops as soon as `limit` nodes have been
/// collected; the cap is global across the whole traversal.
pub async fn breadth_first<I: ChildIndex>(
    index: &I,
    root: I::Id,
    limit: Option<usize>,
) -> StoreResult<Vec<I::Node>> {
    let mut out = Vec::new();
    if limit == Some(0) {
        return Ok(out);
    }
    let mut visited: HashSet<I::Id> = HashSet::new();
    let mut queue: VecDeque<I::Id> = VecDeque::new();
    visited.insert(root);
    queue.push_back(root);

    while let Some(id) = queue.pop_front() {
        for child in index.children(id).await? {
            let child_id = I::node_id(&child);
            if !visited.insert(child_id) {
                tracing::warn!(node = %child_id, parent = %id, "Cycle in reply chain, node skipped");
                continue;
            }
            queue.push_back(child_id);
            out.push(child);
            if limit.map_or(false, |l| out.len() >= l) {
                return Ok(out);
            }
        }
    }
    Ok(out)
}

/// Comment replies keyed by parent comment.
pub struct CommentIndex<'a, S>(pub &'a S);

#[async_trait]
impl<S: ReplyStore> ChildIndex for CommentIndex<'_, S> {
    type Id = CommentId;
    type Node = Comment;

    fn node_id(node: &Comment) -> CommentId {
        node.id
    }

    async fn children(&self, id: CommentId) -> StoreResult<Vec<Comment>> {
        self.0.replies_to(id).await
    }
}

/// Timeline messages keyed by `reply_to`.
pub struct MessageIndex<'a, S>(pub &'a S);

#[async_trait]
impl<S: MessageStore> ChildIndex for MessageIndex<'_, S> {
    type Id = MessageId;
    type Node = MessageNode;

    fn node_id(node: &MessageNode) -> MessageId {
        node.id
    }

    async fn children(&self, id: MessageId) -> StoreResult<Vec<MessageNode>> {
        self.0.replies_to_message(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Adjacency list over plain integers.
    struct Graph(BTreeMap<u32, Vec<u32>>);

    #[async_trait]
    impl ChildIndex for Graph {
        type Id = u32;
        type Node = u32;

        fn node_id(node: &u32) -> u32 {
            *node
        }

        async fn children(&self, id: u32) -> StoreResult<Vec<u32>> {
            Ok(self.0.get(&id).cloned().unwrap_or_default())
        }
    }

    fn tree() -> Graph {
        // 1 -> {2, 3}, 2 -> {4, 5}, 3 -> {6}
        Graph(BTreeMap::from([(1, vec![2, 3]), (2, vec![4, 5]), (3, vec![6])]))
    }

    #[tokio::test]
    async fn test_level_order() {
        let all = breadth_first(&tree(), 1, None).await.unwrap();
        assert_eq!(all, vec![2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_limit_is_global() {
        let brief = breadth_first(&tree(), 1, Some(3)).await.unwrap();
        assert_eq!(brief, vec![2, 3, 4]);
        assert!(breadth_first(&tree(), 1, Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let cyclic = Graph(BTreeMap::from([(1, vec![2]), (2, vec![3]), (3, vec![1, 2])]));
        let all = breadth_first(&cyclic, 1, None).await.unwrap();
        assert_eq!(all, vec![2, 3]);
    }
}
