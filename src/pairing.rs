//! Follow-graph pairing scores.
//!
//! The degree between a subject `a` and another user `b` is a weighted
//! Jaccard similarity of the sets of users they follow:
//!
//! ```text
//! I = F(a) ∩ F(b)        U = F(a) ∪ F(b)
//! jaccard = |I| / |U|
//! weight  = Σ_{f ∈ I, pop(f) > 1} 1 / log2(pop(f))
//! degree  = weight · jaccard
//! ```
//!
//! `pop(f)` is the number of users following `f` across the whole graph.
//! A shared followee has at least two followers, so `pop(f) ≤ 1` never
//! contributes. An empty union leaves the degree undefined; the pair is
//! skipped and no row is written for it.
//!
//! Scores are recomputed wholesale per subject and are stale until the
//! next recomputation. A recomputation for `a` replaces every stored row
//! involving `a`, whichever side wrote it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::canonical::scores_fingerprint;
use crate::error::{CoreError, CoreResult};
use crate::store::{FollowStore, UserStore};
use crate::types::{FollowEdge, Match, MatchSource, PairScore, UserId};

/// Weighted-Jaccard degree of two follow sets, `None` when both are empty.
pub fn pair_degree<P>(a: &BTreeSet<UserId>, b: &BTreeSet<UserId>, popularity: P) -> Option<f64>
where
    P: Fn(&UserId) -> u32,
{
    let union = a.union(b).count();
    if union == 0 {
        return None;
    }
    let mut shared = 0usize;
    let mut weight = 0.0f64;
    for f in a.intersection(b) {
        shared += 1;
        let pop = popularity(f);
        if pop > 1 {
            weight += 1.0 / f64::from(pop).log2();
        }
    }
    let jaccard = shared as f64 / union as f64;
    Some(weight * jaccard)
}

/// Number of (subject tag, candidate tag) pairs where the candidate tag
/// contains the subject tag, ignoring case.
pub fn tag_overlap(subject: &[String], candidate: &[String]) -> u32 {
    let candidate: Vec<String> = candidate.iter().map(|t| t.to_lowercase()).collect();
    let mut overlap = 0u32;
    for tag in subject {
        let tag = tag.to_lowercase();
        overlap += candidate.iter().filter(|c| c.contains(&tag)).count() as u32;
    }
    overlap
}

/// Adjacency snapshot of the follow graph.
#[derive(Debug, Clone, Default)]
pub struct FollowIndex {
    following: BTreeMap<UserId, BTreeSet<UserId>>,
    follower_cnt: BTreeMap<UserId, u32>,
}

impl FollowIndex {
    /// Build the index from every edge of the graph.
    pub fn from_edges(edges: &[FollowEdge]) -> Self {
        let mut index = Self::default();
        for edge in edges {
            if index
                .following
                .entry(edge.follower.clone())
                .or_default()
                .insert(edge.followee.clone())
            {
                *index.follower_cnt.entry(edge.followee.clone()).or_default() += 1;
            }
        }
        index
    }

    /// Users followed by `user`.
    pub fn following(&self, user: &UserId) -> &BTreeSet<UserId> {
        static EMPTY: BTreeSet<UserId> = BTreeSet::new();
        self.following.get(user).unwrap_or(&EMPTY)
    }

    /// Number of users following `user`.
    pub fn follower_cnt(&self, user: &UserId) -> u32 {
        self.follower_cnt.get(user).copied().unwrap_or(0)
    }

    /// Degree between `a` and `b` over this snapshot.
    pub fn degree(&self, a: &UserId, b: &UserId) -> Option<f64> {
        pair_degree(self.following(a), self.following(b), |f| self.follower_cnt(f))
    }
}

/// Outcome of one recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingReport {
    /// Subject user.
    pub user: UserId,
    /// Rows written.
    pub scored: usize,
    /// Pairs skipped for an empty union.
    pub skipped: usize,
    /// Fingerprint of the rows written.
    pub scores_hash: String,
}

/// Pairing score computation and match serving.
pub struct PairingEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for PairingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: UserStore + FollowStore> PairingEngine<S> {
    /// Create an engine over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Recompute and replace every score of `user`.
    pub async fn recompute_all_pairs(&self, user: &UserId) -> CoreResult<PairingReport> {
        if self.store.get_user(user).await?.is_none() {
            return Err(CoreError::not_found("user", user));
        }
        let users = self.store.list_users().await?;
        let index = FollowIndex::from_edges(&self.store.follow_edges().await?);

        let mut scores = Vec::new();
        let mut skipped = 0usize;
        for other in users.iter().filter(|u| &u.id != user) {
            match index.degree(user, &other.id) {
                Some(degree) => scores.push(PairScore {
                    user_a: user.clone(),
                    user_b: other.id.clone(),
                    degree,
                }),
                None => skipped += 1,
            }
        }

        let scores_hash = scores_fingerprint(&scores);
        let scored = scores.len();
        self.store.replace_pair_scores(user, scores).await?;
        tracing::info!(user = %user, scored, skipped, scores_hash = %scores_hash, "Pair scores recomputed");

        Ok(PairingReport {
            user: user.clone(),
            scored,
            skipped,
            scores_hash,
        })
    }

    /// Top `k` matches for `user`, most similar first.
    ///
    /// Before any score exists for the user, falls back to the users whose
    /// tags overlap the subject's most, then to the most followed.
    pub async fn top_matches(&self, user: &UserId, k: usize) -> CoreResult<Vec<Match>> {
        if self.store.get_user(user).await?.is_none() {
            return Err(CoreError::not_found("user", user));
        }
        let index = FollowIndex::from_edges(&self.store.follow_edges().await?);
        let rows = self.store.pair_scores_involving(user).await?;

        if rows.is_empty() {
            tracing::debug!(user = %user, "No pair scores, serving cold start");
            let mut tags: BTreeMap<UserId, Vec<String>> = BTreeMap::new();
            for tag in self.store.all_tags().await? {
                tags.entry(tag.user).or_default().push(tag.tag);
            }
            let own = tags.get(user).cloned().unwrap_or_default();
            let mut users: Vec<(UserId, u32)> = self
                .store
                .list_users()
                .await?
                .into_iter()
                .map(|u| u.id)
                .filter(|id| id != user)
                .map(|id| {
                    let shared = tags.get(&id).map_or(0, |theirs| tag_overlap(&own, theirs));
                    (id, shared)
                })
                .collect();
            users.sort_by(|(x, xs), (y, ys)| {
                ys.cmp(xs)
                    .then_with(|| index.follower_cnt(y).cmp(&index.follower_cnt(x)))
                    .then_with(|| x.cmp(y))
            });
            return Ok(users
                .into_iter()
                .take(k)
                .map(|(id, shared_tags)| Match {
                    follower_cnt: index.follower_cnt(&id),
                    user: id,
                    degree: None,
                    shared_tags,
                    source: MatchSource::ColdStart,
                })
                .collect());
        }

        // One row per unordered pair: the side that recomputed last.
        let mut ranked: Vec<(UserId, f64)> = rows
            .iter()
            .map(|row| (row.other(user).clone(), row.degree))
            .collect();
        ranked.sort_by(|(xa, xd), (ya, yd)| yd.total_cmp(xd).then_with(|| xa.cmp(ya)));

        Ok(ranked
            .into_iter()
            .take(k)
            .map(|(id, degree)| Match {
                follower_cnt: index.follower_cnt(&id),
                user: id,
                degree: Some(degree),
                shared_tags: 0,
                source: MatchSource::Computed,
            })
            .collect())
    }
}

impl<S: UserStore + FollowStore + 'static> PairingEngine<S> {
    /// Run [`recompute_all_pairs`](Self::recompute_all_pairs) as a background task.
    ///
    /// Reads keep serving the previous rows until the task commits.
    pub fn spawn_recompute(&self, user: UserId) -> JoinHandle<CoreResult<PairingReport>> {
        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.recompute_all_pairs(&user).await;
            if let Err(ref e) = result {
                tracing::warn!(user = %user, error = %e, "Background pairing recompute failed");
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySocialStore;
    use crate::types::{Role, User};
    use chrono::Utc;

    fn set(names: &[&str]) -> BTreeSet<UserId> {
        names.iter().map(|n| UserId::new(*n)).collect()
    }

    fn edge(a: &str, b: &str) -> FollowEdge {
        FollowEdge {
            follower: UserId::new(a),
            followee: UserId::new(b),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_weighted_jaccard_example() {
        let a = set(&["x", "y", "z"]);
        let b = set(&["y", "z", "w"]);
        let pop = |f: &UserId| match f.as_str() {
            "y" => 4,
            "z" => 2,
            _ => 1,
        };
        let degree = pair_degree(&a, &b, pop).unwrap();
        assert!((degree - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_union_is_undefined() {
        assert_eq!(pair_degree(&set(&[]), &set(&[]), |_| 2), None);
    }

    #[test]
    fn test_disjoint_sets_score_zero() {
        assert_eq!(pair_degree(&set(&["x"]), &set(&["y"]), |_| 2), Some(0.0));
    }

    #[test]
    fn test_popularity_one_contributes_nothing() {
        let degree = pair_degree(&set(&["x"]), &set(&["x"]), |_| 1).unwrap();
        assert_eq!(degree, 0.0);
        assert!(degree.is_finite());
    }

    #[test]
    fn test_tag_overlap_matches_substrings_case_insensitively() {
        let subject = vec!["Rust".to_string(), "db".to_string()];
        let candidate = vec!["rustacean".to_string(), "DB admin".to_string(), "go".to_string()];
        assert_eq!(tag_overlap(&subject, &candidate), 2);
        assert_eq!(tag_overlap(&[], &candidate), 0);
    }

    #[test]
    fn test_index_counts_followers_once() {
        let index = FollowIndex::from_edges(&[edge("a", "x"), edge("a", "x"), edge("b", "x")]);
        assert_eq!(index.follower_cnt(&UserId::new("x")), 2);
        assert_eq!(index.following(&UserId::new("a")).len(), 1);
        assert!(index.following(&UserId::new("nobody")).is_empty());
    }

    async fn engine(users: &[&str], edges: &[(&str, &str)]) -> PairingEngine<InMemorySocialStore> {
        let store = Arc::new(InMemorySocialStore::new());
        for name in users {
            store.add_user(User::new(*name, Role::Student));
        }
        for (a, b) in edges {
            store
                .insert_follow(&UserId::new(*a), &UserId::new(*b))
                .await
                .unwrap();
        }
        PairingEngine::new(store)
    }

    #[tokio::test]
    async fn test_cold_start_then_computed() {
        let pairing = engine(
            &["a", "b", "c", "x"],
            &[("a", "x"), ("b", "x"), ("c", "x"), ("c", "a")],
        )
        .await;
        let a = UserId::new("a");

        let cold = pairing.top_matches(&a, 2).await.unwrap();
        assert_eq!(cold[0].user, UserId::new("x"));
        assert!(cold.iter().all(|m| m.source == MatchSource::ColdStart));
        assert!(cold.iter().all(|m| m.user != a));

        let report = pairing.recompute_all_pairs(&a).await.unwrap();
        // a follows x, so every union is non-empty.
        assert_eq!(report.scored, 3);
        let matches = pairing.top_matches(&a, 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.source == MatchSource::Computed));
        assert!(matches[0].degree >= matches[1].degree);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let pairing = engine(&["a", "b", "x", "y"], &[("a", "x"), ("b", "x"), ("a", "y"), ("b", "y")]).await;
        let a = UserId::new("a");
        let first = pairing.recompute_all_pairs(&a).await.unwrap();
        let second = pairing.recompute_all_pairs(&a).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_union_pairs_are_skipped() {
        let pairing = engine(&["a", "b", "c"], &[]).await;
        let report = pairing.recompute_all_pairs(&UserId::new("a")).await.unwrap();
        assert_eq!(report.scored, 0);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn test_recompute_replaces_rows_written_by_the_other_side() {
        let pairing = engine(
            &["a", "b", "c", "x"],
            &[("a", "x"), ("b", "x"), ("c", "x")],
        )
        .await;
        let (a, b, c, x) = (UserId::new("a"), UserId::new("b"), UserId::new("c"), UserId::new("x"));
        pairing.recompute_all_pairs(&b).await.unwrap();
        let stale = pairing.top_matches(&a, 3).await.unwrap();
        assert_eq!(stale[0].user, b);
        assert!(stale[0].degree.unwrap() > 0.0);

        pairing.store.delete_follow(&a, &x).await.unwrap();
        pairing.store.insert_follow(&a, &c).await.unwrap();
        pairing.recompute_all_pairs(&a).await.unwrap();

        let rows = pairing.store.pair_scores_involving(&a).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.user_a == a));
        let matches = pairing.top_matches(&a, 3).await.unwrap();
        assert!(matches.iter().all(|m| m.degree == Some(0.0)));
        // b still sees its pair with a through a's fresh row.
        let from_b = pairing.top_matches(&b, 3).await.unwrap();
        let with_a = from_b.iter().find(|m| m.user == a).unwrap();
        assert_eq!(with_a.degree, Some(0.0));
    }

    #[tokio::test]
    async fn test_spawned_recompute_completes() {
        let pairing = engine(&["a", "b", "x"], &[("a", "x"), ("b", "x")]).await;
        let handle = pairing.spawn_recompute(UserId::new("a"));
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.scored, 2);
    }

    #[tokio::test]
    async fn test_cold_start_prefers_shared_tags_over_followers() {
        let pairing = engine(&["a", "b", "c", "x"], &[("b", "x"), ("c", "x"), ("a", "c")]).await;
        let store = &pairing.store;
        store.add_tag(&UserId::new("a"), "rust").await.unwrap();
        store.add_tag(&UserId::new("b"), "Rust async").await.unwrap();
        store.add_tag(&UserId::new("x"), "cooking").await.unwrap();

        let cold = pairing.top_matches(&UserId::new("a"), 3).await.unwrap();
        let order: Vec<&str> = cold.iter().map(|m| m.user.as_str()).collect();
        // b shares a tag; x outranks c on followers.
        assert_eq!(order, vec!["b", "x", "c"]);
        assert_eq!(cold[0].shared_tags, 1);
        assert_eq!(cold[1].shared_tags, 0);
    }
}
