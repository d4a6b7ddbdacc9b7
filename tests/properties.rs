//! Property tests for the derived-state invariants.

use std::sync::Arc;

use proptest::prelude::*;
use qa_social_core::store::{ContentStore, FollowStore, InMemorySocialStore, VoteStore};
use qa_social_core::types::{NewAnswer, NewQuestion, User, VoteValue};
use qa_social_core::{
    AnswerId, Caller, CommentId, ItemContent, OrderedCollections, Page, PairingEngine, ReplyGraph,
    Role, UserId, VoteLedger, VoteTarget,
};

const CATEGORIES: [&str; 2] = ["faq", "guide"];
const VOTERS: [&str; 4] = ["v0", "v1", "v2", "v3"];

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

#[derive(Debug, Clone)]
enum RankOp {
    Insert { category: usize, at: Option<u32> },
    Move { pick: usize, category: usize, rank: u32 },
    Delete { pick: usize },
}

fn rank_op() -> impl Strategy<Value = RankOp> {
    prop_oneof![
        (0..2usize, proptest::option::of(1..6u32))
            .prop_map(|(category, at)| RankOp::Insert { category, at }),
        (0..16usize, 0..2usize, 1..6u32)
            .prop_map(|(pick, category, rank)| RankOp::Move { pick, category, rank }),
        (0..16usize).prop_map(|pick| RankOp::Delete { pick }),
    ]
}

async fn assert_dense(handbook: &OrderedCollections<InMemorySocialStore>) {
    for category in CATEGORIES {
        let orders: Vec<u32> = handbook
            .list(category)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.order)
            .collect();
        let expected: Vec<u32> = (1..=orders.len() as u32).collect();
        assert_eq!(orders, expected, "ranks of {category} not dense");
    }
}

async fn answer_fixture(store: &Arc<InMemorySocialStore>) -> AnswerId {
    let (question, _) = store
        .insert_question(NewQuestion {
            author: UserId::new("author"),
            content: "q".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let (answer, _) = store
        .insert_answer(NewAnswer {
            question: question.id,
            author: UserId::new("author"),
            content: "a".into(),
            quote: None,
        })
        .await
        .unwrap();
    answer.id
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_ranks_stay_dense(ops in proptest::collection::vec(rank_op(), 1..24)) {
        block_on(async {
            let store = Arc::new(InMemorySocialStore::new());
            store.add_user(User::new("tess", Role::Teacher));
            let handbook = OrderedCollections::new(Arc::clone(&store));
            let tess = Caller::new("tess", Role::Teacher);

            for op in ops {
                let mut items = Vec::new();
                for category in CATEGORIES {
                    items.extend(handbook.list(category).await.unwrap());
                }
                match op {
                    RankOp::Insert { category, at } => {
                        let _ = handbook
                            .insert(&tess, Some(CATEGORIES[category]), at, ItemContent::default())
                            .await;
                    }
                    RankOp::Move { pick, category, rank } if !items.is_empty() => {
                        let item = &items[pick % items.len()];
                        let _ = handbook
                            .move_item(&tess, item.id, Some(CATEGORIES[category]), rank)
                            .await;
                    }
                    RankOp::Delete { pick } if !items.is_empty() => {
                        let item = &items[pick % items.len()];
                        handbook.delete(&tess, item.id).await.unwrap();
                    }
                    _ => {}
                }
                assert_dense(&handbook).await;
            }
        });
    }

    #[test]
    fn prop_vote_counters_match_rows(
        votes in proptest::collection::vec((0..VOTERS.len(), -1..=1i64), 1..40)
    ) {
        block_on(async {
            let store = Arc::new(InMemorySocialStore::new());
            store.add_user(User::new("author", Role::Teacher));
            for voter in VOTERS {
                store.add_user(User::new(voter, Role::Visitor));
            }
            let target = VoteTarget::Answer(answer_fixture(&store).await);
            let ledger = VoteLedger::new(Arc::clone(&store));

            for (voter, value) in votes {
                let caller = Caller::new(VOTERS[voter], Role::Visitor);
                let first = ledger.cast_vote(&caller, target, value).await.unwrap();
                let again = ledger.cast_vote(&caller, target, value).await.unwrap();
                assert_eq!(first, again);
            }

            let rows = store.votes_for(target).await.unwrap();
            let likes = rows.iter().filter(|v| v.value == VoteValue::Like).count() as u32;
            let dislikes = rows.iter().filter(|v| v.value == VoteValue::Dislike).count() as u32;
            let tally = ledger.tally(target).await.unwrap();
            assert_eq!((tally.like_cnt, tally.dislike_cnt), (likes, dislikes));
        });
    }

    #[test]
    fn prop_brief_is_prefix_of_all(
        parents in proptest::collection::vec(proptest::option::of(0..32usize), 1..24),
        limit in 0..6usize,
    ) {
        block_on(async {
            let store = Arc::new(InMemorySocialStore::new());
            store.add_user(User::new("author", Role::Teacher));
            let answer = answer_fixture(&store).await;
            let graph = ReplyGraph::new(Arc::clone(&store));
            let author = Caller::new("author", Role::Teacher);

            let mut ids: Vec<CommentId> = Vec::new();
            for parent in parents {
                let parent = match parent {
                    Some(p) if !ids.is_empty() => Some(ids[p % ids.len()]),
                    _ => None,
                };
                let comment = graph.post_reply(&author, answer, parent, "c").await.unwrap();
                ids.push(comment.id);
            }

            for id in &ids {
                let all = graph.all_replies(*id, Page::new(0, usize::MAX)).await.unwrap();
                let brief = graph.brief_replies(*id, limit).await.unwrap();
                let cut = limit.min(all.items.len());
                assert_eq!(brief, all.items[..cut].to_vec());
                assert_eq!(all.total, all.items.len());
            }
        });
    }

    #[test]
    fn prop_recompute_is_idempotent(
        edges in proptest::collection::vec((0..6usize, 0..6usize), 0..20)
    ) {
        block_on(async {
            let store = Arc::new(InMemorySocialStore::new());
            let users: Vec<UserId> = (0..6).map(|n| UserId::new(format!("u{n}"))).collect();
            for user in &users {
                store.add_user(User::new(user.clone(), Role::Student));
            }
            for (a, b) in edges {
                if a != b {
                    let _ = store.insert_follow(&users[a], &users[b]).await;
                }
            }
            let pairing = PairingEngine::new(Arc::clone(&store));

            let first = pairing.recompute_all_pairs(&users[0]).await.unwrap();
            let rows_first = store.pair_scores_involving(&users[0]).await.unwrap();
            let second = pairing.recompute_all_pairs(&users[0]).await.unwrap();
            let rows_second = store.pair_scores_involving(&users[0]).await.unwrap();

            assert_eq!(first, second);
            assert_eq!(rows_first, rows_second);
            assert_eq!(first.scored + first.skipped, users.len() - 1);
            assert!(rows_second.iter().all(|r| r.degree >= 0.0 && r.degree.is_finite()));
        });
    }
}
