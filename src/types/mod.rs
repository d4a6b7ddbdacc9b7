//! Core types.

pub mod ids;
pub mod user;
pub mod vote;
pub mod content;
pub mod ordered;
pub mod reply;
pub mod follow;
pub mod message;
pub mod moment;
pub mod chat;

pub use ids::{
    AnswerId, ChatId, ChatMessageId, CommentId, ItemId, MessageId, MomentId, PostId, QuestionId,
    UserId,
};
pub use user::{Caller, Role, User, UserTag};
pub use vote::{InvalidVoteValue, Tally, TallyDelta, Vote, VoteCommit, VoteTarget, VoteValue};
pub use content::{
    Answer, Dependents, NewAnswer, NewPost, NewQuestion, Post, Question, QuestionFilter,
    QuestionSummary, TopicSummary,
};
pub use ordered::{
    CategoryCount, CategoryGuard, Draft, DraftEdit, ItemContent, ItemEdit, ItemWrite, OrderedItem,
    RankPlan, RankShift, Slot, DEFAULT_CATEGORY,
};
pub use reply::{Comment, CommentPage, CommentThread, NewComment, Page, Paged};
pub use follow::{FollowEdge, Match, MatchSource, PairScore};
pub use message::{
    MessageKind, MessageNode, MessageSource, OwnerIdentity, ProjectedMessage, ReplyPreview,
    SourceRecord,
};
pub use moment::{Moment, NewMoment};
pub use chat::{Chat, ChatMessage, ChatSummary, NewChatMessage};
