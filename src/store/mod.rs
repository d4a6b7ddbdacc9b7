//! Persistence backends.
//!
//! The core never mutates counters or ranks itself: every read-then-write
//! section is handed to the store as one request (a vote compare-and-set,
//! a rank plan, a comment insert with its counter bumps) which the backend
//! applies atomically.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod schema;

use async_trait::async_trait;

use crate::types::{
    Answer, AnswerId, CategoryCount, Chat, ChatId, ChatMessage, ChatMessageId, Comment, CommentId,
    Dependents, Draft, DraftEdit, FollowEdge, ItemId, MessageId, MessageNode, MessageSource,
    Moment, NewAnswer, NewChatMessage, NewComment, NewMoment, NewPost, NewQuestion, OrderedItem,
    Page, Paged, PairScore, Post, PostId, Question, QuestionFilter, QuestionId, RankPlan,
    SourceRecord, Tally, User, UserId, UserTag, Vote, VoteCommit, VoteTarget, VoteValue,
};

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Identifier looked up.
        id: String,
    },
    /// Unique constraint violated or a guard no longer holds.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Dependent rows block a delete.
    #[error("dependency exists: {0}")]
    DependencyExists(String),
    /// Backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Not-found error for an entity kind and id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// User accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user.
    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>>;

    /// All users ordered by id.
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// Insert or replace a user.
    async fn put_user(&self, user: User) -> StoreResult<()>;

    /// Attach a tag to a user. A tag the user already carries is a conflict.
    async fn add_tag(&self, user: &UserId, tag: &str) -> StoreResult<UserTag>;

    /// Tags of one user in insertion order.
    async fn user_tags(&self, user: &UserId) -> StoreResult<Vec<UserTag>>;

    /// Every tag of every user.
    async fn all_tags(&self) -> StoreResult<Vec<UserTag>>;
}

/// Questions, answers and posts together with their timeline messages.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a question.
    async fn get_question(&self, id: QuestionId) -> StoreResult<Option<Question>>;

    /// Questions passing `filter`, most recently updated first.
    async fn list_questions(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>>;

    /// Create a question and its root message.
    async fn insert_question(&self, new: NewQuestion) -> StoreResult<(Question, MessageNode)>;

    /// Delete a question. Answers keep a null question and its message
    /// stays on the timeline with a dangling source.
    ///
    /// With [`Dependents::Refuse`] a question that has answers fails with
    /// [`StoreError::DependencyExists`], checked under the same lock or
    /// transaction as the delete.
    async fn delete_question(&self, id: QuestionId, dependents: Dependents) -> StoreResult<()>;

    /// Fetch an answer.
    async fn get_answer(&self, id: AnswerId) -> StoreResult<Option<Answer>>;

    /// Answers of a question, most liked first, then most recent.
    async fn answers_for(&self, question: QuestionId) -> StoreResult<Vec<Answer>>;

    /// Create an answer, bump the question's `answer_cnt` and add a message
    /// replying to the question's message.
    async fn insert_answer(&self, new: NewAnswer) -> StoreResult<(Answer, MessageNode)>;

    /// Delete an answer, decrementing the question's `answer_cnt`. Comments
    /// keep a null answer; the message stays with a dangling source.
    /// [`Dependents::Refuse`] fails while the answer has comments.
    async fn delete_answer(&self, id: AnswerId, dependents: Dependents) -> StoreResult<()>;

    /// Fetch a post.
    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>>;

    /// Create a post and its message.
    async fn insert_post(&self, new: NewPost) -> StoreResult<(Post, MessageNode)>;
}

/// Vote rows and the aggregates they drive.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Current aggregates of a target, `None` if the target does not exist.
    async fn get_tally(&self, target: VoteTarget) -> StoreResult<Option<Tally>>;

    /// The voter's current vote on a target.
    async fn get_vote(&self, voter: &UserId, target: VoteTarget) -> StoreResult<Option<VoteValue>>;

    /// Atomically write the vote row and apply the counter delta.
    ///
    /// Fails with [`StoreError::Conflict`] if the stored vote differs from
    /// `commit.expected` or a counter would become negative.
    async fn commit_vote(&self, commit: VoteCommit) -> StoreResult<Tally>;

    /// All vote rows of a target ordered by voter.
    async fn votes_for(&self, target: VoteTarget) -> StoreResult<Vec<Vote>>;
}

/// Ordered items with dense per-category ranks.
#[async_trait]
pub trait RankStore: Send + Sync {
    /// Fetch an item.
    async fn get_item(&self, id: ItemId) -> StoreResult<Option<OrderedItem>>;

    /// Fetch the item at a rank.
    async fn find_item(&self, category: &str, order: u32) -> StoreResult<Option<OrderedItem>>;

    /// Items of a category ordered by rank.
    async fn list_category(&self, category: &str) -> StoreResult<Vec<OrderedItem>>;

    /// Number of items in a category.
    async fn category_len(&self, category: &str) -> StoreResult<u32>;

    /// Published item counts per category, largest first.
    async fn published_categories(&self) -> StoreResult<Vec<CategoryCount>>;

    /// Apply guards, shifts and the item write as one transaction.
    ///
    /// Returns the written item, or `None` for a removal. An insert also
    /// creates the item's draft from the same payload; a removal drops it.
    async fn apply_rank_plan(&self, plan: RankPlan) -> StoreResult<Option<OrderedItem>>;

    /// The draft of an item.
    async fn get_draft(&self, item: ItemId) -> StoreResult<Option<Draft>>;

    /// Apply an edit to an item's draft and mark it pending.
    async fn save_draft(&self, item: ItemId, edit: DraftEdit) -> StoreResult<Draft>;

    /// Copy the draft onto its item and publish the item, atomically.
    ///
    /// A draft title held by another item is a conflict.
    async fn publish_draft(&self, item: ItemId) -> StoreResult<OrderedItem>;

    /// Remove an item's draft.
    async fn delete_draft(&self, item: ItemId) -> StoreResult<()>;
}

/// Comment forest.
#[async_trait]
pub trait ReplyStore: Send + Sync {
    /// Fetch a comment.
    async fn get_comment(&self, id: CommentId) -> StoreResult<Option<Comment>>;

    /// Direct replies ordered by id.
    async fn replies_to(&self, parent: CommentId) -> StoreResult<Vec<Comment>>;

    /// Root comments of an answer ordered by id.
    async fn root_comments(&self, answer: AnswerId) -> StoreResult<Vec<Comment>>;

    /// Number of comments (roots and replies) under an answer.
    async fn comment_count(&self, answer: AnswerId) -> StoreResult<usize>;

    /// Insert a comment, bumping the parent's `reply_cnt` and the answer's
    /// `comment_cnt` in the same transaction.
    async fn insert_comment(&self, new: NewComment) -> StoreResult<Comment>;

    /// Delete a comment. Children become roots; the parent's `reply_cnt` and
    /// the answer's `comment_cnt` are decremented.
    /// [`Dependents::Refuse`] fails while the comment has replies.
    async fn delete_comment(&self, id: CommentId, dependents: Dependents) -> StoreResult<()>;
}

/// Follow graph and persisted pair scores.
#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Create an edge. Duplicate edges are a conflict.
    async fn insert_follow(&self, follower: &UserId, followee: &UserId) -> StoreResult<FollowEdge>;

    /// Remove an edge.
    async fn delete_follow(&self, follower: &UserId, followee: &UserId) -> StoreResult<()>;

    /// Edges from `user`, newest first.
    async fn following(&self, user: &UserId) -> StoreResult<Vec<FollowEdge>>;

    /// Edges to `user`, newest first.
    async fn followers(&self, user: &UserId) -> StoreResult<Vec<FollowEdge>>;

    /// The whole follow graph.
    async fn follow_edges(&self) -> StoreResult<Vec<FollowEdge>>;

    /// Replace every score involving `user` with `scores`.
    ///
    /// Rows where `user` is either side are dropped, including those another
    /// user's recomputation wrote, so each unordered pair keeps one row.
    async fn replace_pair_scores(&self, user: &UserId, scores: Vec<PairScore>) -> StoreResult<()>;

    /// Scores where `user` is either side.
    async fn pair_scores_involving(&self, user: &UserId) -> StoreResult<Vec<PairScore>>;
}

/// Timeline messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch a message.
    async fn get_message(&self, id: MessageId) -> StoreResult<Option<MessageNode>>;

    /// The message created for a content item.
    async fn message_for(&self, source: MessageSource) -> StoreResult<Option<MessageNode>>;

    /// Messages replying to `id`, ordered by id.
    async fn replies_to_message(&self, id: MessageId) -> StoreResult<Vec<MessageNode>>;

    /// Newest messages first, windowed.
    async fn latest_messages(&self, page: Page) -> StoreResult<Vec<MessageNode>>;

    /// Owner and quote of a message's source, `None` if the entity is gone.
    async fn resolve_source(&self, source: MessageSource) -> StoreResult<Option<SourceRecord>>;
}

/// Moments.
#[async_trait]
pub trait MomentStore: Send + Sync {
    /// Create a moment.
    async fn insert_moment(&self, new: NewMoment) -> StoreResult<Moment>;

    /// Moments of `author` (all moments when `None`), newest first, windowed.
    async fn moments(&self, author: Option<&UserId>, page: Page) -> StoreResult<Paged<Moment>>;
}

/// Two-party chats and their messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Return the chat between `a` and `b`, creating it when absent.
    ///
    /// Lookup and creation are atomic, so concurrent opens of the same pair
    /// yield one chat.
    async fn open_chat(&self, a: &UserId, b: &UserId) -> StoreResult<Chat>;

    /// Fetch a chat.
    async fn get_chat(&self, id: ChatId) -> StoreResult<Option<Chat>>;

    /// Chats `user` takes part in with their newest message.
    async fn chats_of(&self, user: &UserId) -> StoreResult<Vec<(Chat, Option<ChatMessage>)>>;

    /// Append a message to a chat.
    async fn insert_chat_message(&self, new: NewChatMessage) -> StoreResult<ChatMessage>;

    /// Messages of a chat, newest first.
    async fn chat_messages(&self, chat: ChatId) -> StoreResult<Vec<ChatMessage>>;

    /// Fetch a chat message.
    async fn get_chat_message(&self, id: ChatMessageId) -> StoreResult<Option<ChatMessage>>;

    /// Delete a chat message.
    async fn delete_chat_message(&self, id: ChatMessageId) -> StoreResult<()>;
}

/// Every store capability the core needs.
pub trait SocialStore:
    UserStore
    + ContentStore
    + VoteStore
    + RankStore
    + ReplyStore
    + FollowStore
    + MessageStore
    + MomentStore
    + ChatStore
{
}

impl<T> SocialStore for T where
    T: UserStore
        + ContentStore
        + VoteStore
        + RankStore
        + ReplyStore
        + FollowStore
        + MessageStore
        + MomentStore
        + ChatStore
{
}

pub use memory::InMemorySocialStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresSocialStore};
