//! End-to-end scenarios against the in-memory store.
//!
//! Each test drives the public managers the way the service does and checks
//! the derived state they leave behind.

use std::sync::Arc;

use qa_social_core::store::{ContentStore, InMemorySocialStore, VoteStore};
use qa_social_core::types::{NewQuestion, User};
use qa_social_core::{
    Caller, ContentBoard, ErrorKind, FollowGraph, ItemContent, MatchSource, MessageKind,
    MessageThreads, OrderedCollections, PairingEngine, ReplyGraph, Role, UserId, VoteLedger,
    VoteTarget,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn store_with(users: &[(&str, Role)]) -> Arc<InMemorySocialStore> {
    let store = Arc::new(InMemorySocialStore::new());
    for (name, role) in users {
        store.add_user(User::new(*name, *role));
    }
    store
}

fn titled(title: &str) -> ItemContent {
    ItemContent {
        title: Some(title.to_string()),
        published: true,
        ..Default::default()
    }
}

fn ask(content: &str) -> NewQuestion {
    NewQuestion {
        content: content.to_string(),
        ..Default::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handbook ranks
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_insert_in_middle_shifts_tail() {
    let store = store_with(&[("tess", Role::Teacher)]);
    let handbook = OrderedCollections::new(Arc::clone(&store));
    let tess = Caller::new("tess", Role::Teacher);

    let one = handbook.insert(&tess, Some("faq"), None, titled("one")).await.unwrap();
    let two = handbook.insert(&tess, Some("faq"), None, titled("two")).await.unwrap();
    let three = handbook.insert(&tess, Some("faq"), None, titled("three")).await.unwrap();
    let new = handbook.insert(&tess, Some("faq"), Some(2), titled("new")).await.unwrap();

    let orders: Vec<_> = handbook
        .list("faq")
        .await
        .unwrap()
        .into_iter()
        .map(|i| (i.id, i.order))
        .collect();
    assert_eq!(
        orders,
        vec![(one.id, 1), (new.id, 2), (two.id, 3), (three.id, 4)]
    );
}

#[tokio::test]
async fn test_move_across_categories_closes_gap() {
    let store = store_with(&[("tess", Role::Teacher)]);
    let handbook = OrderedCollections::new(Arc::clone(&store));
    let tess = Caller::new("tess", Role::Teacher);

    let a = handbook.insert(&tess, Some("faq"), None, titled("a")).await.unwrap();
    let b = handbook.insert(&tess, Some("faq"), None, titled("b")).await.unwrap();
    let c = handbook.insert(&tess, Some("guide"), None, titled("c")).await.unwrap();

    let moved = handbook.move_item(&tess, a.id, Some("guide"), 1).await.unwrap();
    assert_eq!((moved.category.as_str(), moved.order), ("guide", 1));

    let faq = handbook.list("faq").await.unwrap();
    assert_eq!(faq.len(), 1);
    assert_eq!((faq[0].id, faq[0].order), (b.id, 1));
    let guide = handbook.list("guide").await.unwrap();
    assert_eq!(
        guide.iter().map(|i| (i.id, i.order)).collect::<Vec<_>>(),
        vec![(a.id, 1), (c.id, 2)]
    );
}

#[tokio::test]
async fn test_handbook_rejects_bad_ranks_and_strangers() {
    let store = store_with(&[("tess", Role::Teacher), ("sam", Role::Student), ("vic", Role::Visitor)]);
    let handbook = OrderedCollections::new(Arc::clone(&store));
    let tess = Caller::new("tess", Role::Teacher);

    let item = handbook.insert(&tess, Some("faq"), None, titled("a")).await.unwrap();

    let err = handbook
        .insert(&tess, Some("faq"), Some(5), titled("b"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    let err = handbook
        .insert(&Caller::new("vic", Role::Visitor), Some("faq"), None, titled("c"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthorizationError);

    let err = handbook
        .delete(&Caller::new("sam", Role::Student), item.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthorizationError);

    let err = handbook
        .insert(&tess, Some("faq"), None, titled("a"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(handbook.list("faq").await.unwrap().len(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Votes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_vote_lifecycle_keeps_counters_consistent() {
    let store = store_with(&[("alice", Role::Student), ("bob", Role::Teacher), ("vic", Role::Visitor)]);
    let board = ContentBoard::new(Arc::clone(&store));
    let ledger = VoteLedger::new(Arc::clone(&store));

    let q = board
        .post_question(&Caller::new("alice", Role::Student), ask("why?"))
        .await
        .unwrap();
    let answer = board
        .post_answer(&Caller::new("bob", Role::Teacher), q.id, "because", None)
        .await
        .unwrap();
    let target = VoteTarget::Answer(answer.id);
    let vic = Caller::new("vic", Role::Visitor);
    let alice = Caller::new("alice", Role::Student);

    assert_eq!(ledger.cast_vote(&vic, target, 1).await.unwrap().like_cnt, 1);
    assert_eq!(ledger.cast_vote(&vic, target, 1).await.unwrap().like_cnt, 1);
    let tally = ledger.cast_vote(&alice, target, -1).await.unwrap();
    assert_eq!((tally.like_cnt, tally.dislike_cnt), (1, 1));
    let tally = ledger.cast_vote(&vic, target, -1).await.unwrap();
    assert_eq!((tally.like_cnt, tally.dislike_cnt), (0, 2));
    let tally = ledger.cast_vote(&alice, target, 0).await.unwrap();
    assert_eq!((tally.like_cnt, tally.dislike_cnt), (0, 1));

    let rows = store.votes_for(target).await.unwrap();
    assert_eq!(rows.len(), 2);
    let stored = store.get_answer(answer.id).await.unwrap().unwrap();
    assert_eq!(stored.tally, tally);
}

#[tokio::test]
async fn test_vote_on_missing_target_is_not_found() {
    let store = store_with(&[("vic", Role::Visitor)]);
    let ledger = VoteLedger::new(Arc::clone(&store));
    let err = ledger
        .cast_vote(
            &Caller::new("vic", Role::Visitor),
            VoteTarget::Answer(qa_social_core::AnswerId::new(404)),
            1,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─────────────────────────────────────────────────────────────────────────────
// Replies
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reply_delete_blocked_until_admin() {
    let store = store_with(&[("alice", Role::Student), ("bob", Role::Teacher)]);
    let board = ContentBoard::new(Arc::clone(&store));
    let replies = ReplyGraph::new(Arc::clone(&store));
    let alice = Caller::new("alice", Role::Student);
    let bob = Caller::new("bob", Role::Teacher);

    let q = board.post_question(&alice, ask("why?")).await.unwrap();
    let answer = board.post_answer(&bob, q.id, "because", None).await.unwrap();
    let root = replies.post_reply(&alice, answer.id, None, "thanks").await.unwrap();
    let child = replies.post_reply(&bob, answer.id, Some(root.id), "welcome").await.unwrap();

    let err = replies.delete_reply(&alice, root.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyExists);

    // Leaves go first; then the root is free to go.
    replies.delete_reply(&bob, child.id).await.unwrap();
    replies.delete_reply(&alice, root.id).await.unwrap();
    let page = replies.answer_comments(answer.id, 1, None).await.unwrap();
    assert_eq!(page.comment_cnt, 0);
    assert!(page.threads.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Pairing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pairing_degree_example() {
    let names = ["a", "b", "c", "d", "x", "y", "z", "w"];
    let users: Vec<(&str, Role)> = names.iter().map(|n| (*n, Role::Student)).collect();
    let store = store_with(&users);
    let follows = FollowGraph::new(Arc::clone(&store));
    let pairing = PairingEngine::new(Arc::clone(&store));

    for (who, whom) in [
        ("a", "x"),
        ("a", "y"),
        ("a", "z"),
        ("b", "y"),
        ("b", "z"),
        ("b", "w"),
        ("c", "y"),
        ("d", "y"),
    ] {
        follows
            .follow(&Caller::new(who, Role::Student), &UserId::new(whom))
            .await
            .unwrap();
    }

    let a = UserId::new("a");
    let cold = pairing.top_matches(&a, 1).await.unwrap();
    assert_eq!(cold[0].user, UserId::new("y"));
    assert_eq!(cold[0].source, MatchSource::ColdStart);

    let report = pairing.recompute_all_pairs(&a).await.unwrap();
    assert_eq!(report.scored, names.len() - 1);

    let top = pairing.top_matches(&a, 4).await.unwrap();
    assert_eq!(top[0].user, UserId::new("b"));
    let degree = top[0].degree.unwrap();
    assert!((degree - 0.75).abs() < 1e-12);
    assert!(top.iter().all(|m| m.source == MatchSource::Computed));
    assert!(top.windows(2).all(|w| w[0].degree >= w[1].degree));
}

#[tokio::test]
async fn test_matches_read_other_side_of_pair() {
    let store = store_with(&[("a", Role::Student), ("b", Role::Student), ("x", Role::Student)]);
    let follows = FollowGraph::new(Arc::clone(&store));
    let pairing = PairingEngine::new(Arc::clone(&store));
    for who in ["a", "b"] {
        follows
            .follow(&Caller::new(who, Role::Student), &UserId::new("x"))
            .await
            .unwrap();
    }

    pairing.recompute_all_pairs(&UserId::new("a")).await.unwrap();
    let matches = pairing.top_matches(&UserId::new("b"), 4).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].user, UserId::new("a"));
    assert_eq!(matches[0].source, MatchSource::Computed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_thread_survives_deleted_answer() {
    let store = store_with(&[("alice", Role::Student), ("bob", Role::Teacher)]);
    let board = ContentBoard::new(Arc::clone(&store));
    let threads = MessageThreads::new(Arc::clone(&store));
    let alice = Caller::new("alice", Role::Student);
    let bob = Caller::new("bob", Role::Teacher);

    let q = board.post_question(&alice, ask("why?")).await.unwrap();
    let answer = board
        .post_answer(&bob, q.id, "because", Some("see ch. 2".into()))
        .await
        .unwrap();
    board.post_answer(&alice, q.id, "also", None).await.unwrap();
    board.delete_answer(&bob, answer.id).await.unwrap();

    let thread = threads.thread_for_question(q.id).await.unwrap();
    assert_eq!(thread.len(), 3);
    assert_eq!(thread[0].kind, MessageKind::Question);
    assert_eq!(thread[0].owner.as_ref().unwrap().user_id, UserId::new("alice"));

    let orphan = &thread[1];
    assert_eq!(orphan.kind, MessageKind::Answer);
    assert!(orphan.owner.is_none());
    assert!(orphan.quote.is_none());
    assert_eq!(orphan.re.as_ref().unwrap().message_id, thread[0].message.id);

    assert_eq!(thread[2].owner.as_ref().unwrap().user_id, UserId::new("alice"));
}

#[tokio::test]
async fn test_timeline_pages() {
    let store = store_with(&[("alice", Role::Student)]);
    let board = ContentBoard::new(Arc::clone(&store));
    let threads = MessageThreads::with_config(
        Arc::clone(&store),
        qa_social_core::CoreConfig {
            timeline_page_size: 2,
            ..Default::default()
        },
    );
    let alice = Caller::new("alice", Role::Student);
    for n in 0..3 {
        board.post_question(&alice, ask(&format!("q{n}"))).await.unwrap();
    }

    let first = threads.timeline(1).await.unwrap();
    let second = threads.timeline(2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].message.content, "q2");
    assert_eq!(second[0].message.content, "q0");
}
