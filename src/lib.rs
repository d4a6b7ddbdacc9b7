//! # qa-social-core
//!
//! Consistency core of a Q&A social platform.
//!
//! The crate owns the parts of the platform where concurrent writers can
//! corrupt derived state:
//!
//! - a **vote ledger** keeping per-target like/dislike counters equal to
//!   the vote rows behind them,
//! - **ordered collections** (the handbook) with dense 1-based ranks per
//!   category under insert, move and delete,
//! - a **threaded reply graph** over answer comments with level-order
//!   previews and paging,
//! - **pairing scores** derived from the follow graph,
//! - the **message timeline** projecting each question, answer and post
//!   with its owner, quote and reply preview.
//!
//! Around that core sit the plainer social surfaces: handbook drafts,
//! question listings, interest tags, moments and two-party chats.
//!
//! ## Architecture
//!
//! ```text
//! Caller → manager (VoteLedger, OrderedCollections, ReplyGraph, ...)
//!              ↓ plan / compare-and-set
//!          SocialStore (Postgres or Memory)
//! ```
//!
//! Managers validate and plan; stores apply each plan atomically. No
//! manager holds state of its own beyond an `Arc` to the store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod config;
pub mod store;
pub mod canonical;
pub mod ledger;
pub mod ordering;
pub mod forest;
pub mod replies;
pub mod pairing;
pub mod follow;
pub mod messages;
pub mod notify;
pub mod content;
pub mod moments;
pub mod chat;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    Answer, AnswerId, Caller, Chat, ChatId, ChatMessage, ChatMessageId, ChatSummary, Comment,
    CommentId, CommentPage, Draft, DraftEdit, FollowEdge, ItemContent, ItemEdit, ItemId, Match,
    MatchSource, MessageId, MessageKind, MessageSource, Moment, MomentId, OrderedItem, Page, Paged,
    PairScore, Post, PostId, ProjectedMessage, Question, QuestionId, QuestionSummary, Role, Tally,
    TopicSummary, User, UserId, UserTag, VoteTarget, VoteValue,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use config::CoreConfig;
pub use store::{InMemorySocialStore, SocialStore, StoreError, StoreResult};
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresSocialStore};
pub use canonical::{canonical_hash, canonical_hash_hex, scores_fingerprint, to_canonical_bytes};
pub use ledger::VoteLedger;
pub use ordering::OrderedCollections;
pub use forest::{breadth_first, ChildIndex};
pub use replies::ReplyGraph;
pub use pairing::{pair_degree, tag_overlap, FollowIndex, PairingEngine, PairingReport};
pub use follow::FollowGraph;
pub use messages::MessageThreads;
pub use notify::{NoopNotifier, Notifier, NotifyError, TracingNotifier};
pub use content::ContentBoard;
pub use moments::MomentFeed;
pub use chat::{ChatRooms, Outgoing};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};
