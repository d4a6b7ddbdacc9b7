//! PostgreSQL social store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Atomicity
//!
//! Every multi-row write runs in one transaction. Rank plans additionally
//! take a transaction-scoped advisory lock per touched category, so two
//! plans on the same category serialize even when it is empty.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

use super::schema::{SCHEMA_STATEMENTS, SCHEMA_VERSION};
use super::{
    ChatStore, ContentStore, FollowStore, MessageStore, MomentStore, RankStore, ReplyStore,
    StoreError, StoreResult, UserStore, VoteStore,
};
use crate::types::{
    Answer, AnswerId, CategoryCount, Chat, ChatId, ChatMessage, ChatMessageId, Comment, CommentId,
    Dependents, Draft, DraftEdit, FollowEdge, ItemId, ItemWrite, MessageId, MessageNode,
    MessageSource, Moment, MomentId, NewAnswer, NewChatMessage, NewComment, NewMoment, NewPost,
    NewQuestion, OrderedItem, Page, Paged, PairScore, Post, PostId, Question, QuestionFilter,
    QuestionId, RankPlan, Role, SourceRecord, Tally, User, UserId, UserTag, Vote, VoteCommit,
    VoteTarget, VoteValue, DEFAULT_CATEGORY,
};

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/qa_social".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) | Some(CHECK_VIOLATION) => {
                    return StoreError::Conflict(db.message().to_string());
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    return StoreError::not_found(
                        "referenced row",
                        db.constraint().unwrap_or("unknown"),
                    );
                }
                _ => {}
            }
        }
        StoreError::Backend(err.to_string())
    }
}

/// PostgreSQL social store.
pub struct PostgresSocialStore {
    pool: PgPool,
}

impl PostgresSocialStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Apply the schema. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for stmt in SCHEMA_STATEMENTS {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO qa_schema_version (version) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(SCHEMA_VERSION)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(version = SCHEMA_VERSION, "Schema applied");
        Ok(())
    }

    /// Get the connection pool for health checks.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

const QUESTION_COLUMNS: &str =
    "id, author, description, topic, content, answer_cnt, quote, updated_at";
const ANSWER_COLUMNS: &str =
    "id, question_id, author, content, comment_cnt, like_cnt, dislike_cnt, quote, updated_at";
const POST_COLUMNS: &str = "id, author, title, content, image_url, updated_at";
const COMMENT_COLUMNS: &str =
    "id, answer_id, parent_id, author, content, reply_cnt, like_cnt, dislike_cnt, created_at";
const ITEM_COLUMNS: &str =
    "id, category, position, owner, title, content, label, published, updated_at";
const MESSAGE_COLUMNS: &str = "id, source_kind, source_id, reply_to, content, created_at";
const DRAFT_COLUMNS: &str = "item_id, owner, title, content, label, pending, updated_at";
const MOMENT_COLUMNS: &str = "id, author, content, image_url, quote, created_at";
const CHAT_MESSAGE_COLUMNS: &str =
    "id, chat_id, from_user, to_user, content, quote, image_url, created_at";

fn count(row: &PgRow, column: &str) -> Result<u32, sqlx::Error> {
    let value: i32 = row.try_get(column)?;
    Ok(value.max(0) as u32)
}

fn tally(row: &PgRow) -> Result<Tally, sqlx::Error> {
    Ok(Tally {
        like_cnt: count(row, "like_cnt")?,
        dislike_cnt: count(row, "dislike_cnt")?,
    })
}

fn user_id(row: &PgRow, column: &str) -> Result<Option<UserId>, sqlx::Error> {
    let value: Option<String> = row.try_get(column)?;
    Ok(value.map(UserId::from))
}

fn parse_user(row: &PgRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: UserId::from(row.try_get::<String, _>("user_id")?),
        email: row.try_get("email")?,
        avatar: row.try_get("avatar")?,
        role: Role::from_str(&role).unwrap_or_default(),
    })
}

fn parse_question(row: &PgRow) -> Result<Question, sqlx::Error> {
    Ok(Question {
        id: QuestionId::new(row.try_get("id")?),
        author: user_id(row, "author")?,
        description: row.try_get("description")?,
        topic: row.try_get("topic")?,
        content: row.try_get("content")?,
        answer_cnt: count(row, "answer_cnt")?,
        quote: row.try_get("quote")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_answer(row: &PgRow) -> Result<Answer, sqlx::Error> {
    let question: Option<i64> = row.try_get("question_id")?;
    Ok(Answer {
        id: AnswerId::new(row.try_get("id")?),
        question: question.map(QuestionId::new),
        author: user_id(row, "author")?,
        content: row.try_get("content")?,
        comment_cnt: count(row, "comment_cnt")?,
        tally: tally(row)?,
        quote: row.try_get("quote")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_post(row: &PgRow) -> Result<Post, sqlx::Error> {
    Ok(Post {
        id: PostId::new(row.try_get("id")?),
        author: user_id(row, "author")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        image_url: row.try_get("image_url")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_comment(row: &PgRow) -> Result<Comment, sqlx::Error> {
    let answer: Option<i64> = row.try_get("answer_id")?;
    let parent: Option<i64> = row.try_get("parent_id")?;
    Ok(Comment {
        id: CommentId::new(row.try_get("id")?),
        answer: answer.map(AnswerId::new),
        parent: parent.map(CommentId::new),
        author: user_id(row, "author")?,
        content: row.try_get("content")?,
        reply_cnt: count(row, "reply_cnt")?,
        tally: tally(row)?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_item(row: &PgRow) -> Result<OrderedItem, sqlx::Error> {
    Ok(OrderedItem {
        id: ItemId::new(row.try_get("id")?),
        category: row.try_get("category")?,
        order: count(row, "position")?,
        owner: user_id(row, "owner")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        label: row.try_get("label")?,
        published: row.try_get("published")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_draft(row: &PgRow) -> Result<Draft, sqlx::Error> {
    Ok(Draft {
        item: ItemId::new(row.try_get("item_id")?),
        owner: user_id(row, "owner")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        label: row.try_get("label")?,
        pending: row.try_get("pending")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_tag(row: &PgRow) -> Result<UserTag, sqlx::Error> {
    Ok(UserTag {
        user: UserId::from(row.try_get::<String, _>("user_id")?),
        tag: row.try_get("tag")?,
    })
}

fn parse_moment(row: &PgRow) -> Result<Moment, sqlx::Error> {
    Ok(Moment {
        id: MomentId::new(row.try_get("id")?),
        author: user_id(row, "author")?,
        content: row.try_get("content")?,
        image_url: row.try_get("image_url")?,
        quote: row.try_get("quote")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_chat(row: &PgRow) -> Result<Chat, sqlx::Error> {
    Ok(Chat {
        id: ChatId::new(row.try_get("id")?),
        user_a: user_id(row, "user_a")?,
        user_b: user_id(row, "user_b")?,
    })
}

fn parse_chat_message(row: &PgRow) -> Result<ChatMessage, sqlx::Error> {
    Ok(ChatMessage {
        id: ChatMessageId::new(row.try_get("id")?),
        chat: ChatId::new(row.try_get("chat_id")?),
        from: user_id(row, "from_user")?,
        to: user_id(row, "to_user")?,
        content: row.try_get("content")?,
        quote: row.try_get("quote")?,
        image_url: row.try_get("image_url")?,
        created_at: row.try_get("created_at")?,
    })
}

fn source_parts(source: MessageSource) -> (&'static str, i64) {
    match source {
        MessageSource::Question(id) => ("question", id.get()),
        MessageSource::Answer(id) => ("answer", id.get()),
        MessageSource::Post(id) => ("post", id.get()),
    }
}

fn parse_message(row: &PgRow) -> StoreResult<MessageNode> {
    let kind: String = row.try_get("source_kind")?;
    let source_id: i64 = row.try_get("source_id")?;
    let source = match kind.as_str() {
        "question" => MessageSource::Question(QuestionId::new(source_id)),
        "answer" => MessageSource::Answer(AnswerId::new(source_id)),
        "post" => MessageSource::Post(PostId::new(source_id)),
        other => return Err(StoreError::Backend(format!("unknown message source kind: {other}"))),
    };
    let reply_to: Option<i64> = row.try_get("reply_to")?;
    Ok(MessageNode {
        id: MessageId::new(row.try_get("id")?),
        source,
        reply_to: reply_to.map(MessageId::new),
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_edge(row: &PgRow) -> Result<FollowEdge, sqlx::Error> {
    Ok(FollowEdge {
        follower: UserId::from(row.try_get::<String, _>("follower")?),
        followee: UserId::from(row.try_get::<String, _>("followee")?),
        created_at: row.try_get("created_at")?,
    })
}

fn collect<T>(rows: &[PgRow], parse: fn(&PgRow) -> Result<T, sqlx::Error>) -> StoreResult<Vec<T>> {
    rows.iter()
        .map(parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(StoreError::from)
}

/// Window bound as a SQL bigint, saturating at `i64::MAX`.
fn sql_bound(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn tally_table(target: VoteTarget) -> &'static str {
    match target {
        VoteTarget::Answer(_) => "qa_answer",
        VoteTarget::Comment(_) => "qa_comment",
    }
}

async fn insert_message(
    conn: &mut sqlx::PgConnection,
    source: MessageSource,
    reply_to: Option<MessageId>,
    content: &str,
) -> StoreResult<MessageNode> {
    let (kind, id) = source_parts(source);
    let row = sqlx::query(&format!(
        "INSERT INTO qa_message (source_kind, source_id, reply_to, content) \
         VALUES ($1, $2, $3, $4) RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(kind)
    .bind(id)
    .bind(reply_to.map(|m| m.get()))
    .bind(content)
    .fetch_one(conn)
    .await?;
    parse_message(&row)
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl UserStore for PostgresSocialStore {
    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT user_id, email, avatar, role FROM qa_user WHERE user_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(parse_user).transpose()?)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query("SELECT user_id, email, avatar, role FROM qa_user ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, parse_user)
    }

    async fn put_user(&self, user: User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO qa_user (user_id, email, avatar, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET email = EXCLUDED.email, avatar = EXCLUDED.avatar, role = EXCLUDED.role
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.avatar)
        .bind(user.role.code())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_tag(&self, user: &UserId, tag: &str) -> StoreResult<UserTag> {
        let row = sqlx::query(
            "INSERT INTO qa_user_tag (user_id, tag) VALUES ($1, $2) RETURNING user_id, tag",
        )
        .bind(user.as_str())
        .bind(tag)
        .fetch_one(&self.pool)
        .await?;
        Ok(parse_tag(&row)?)
    }

    async fn user_tags(&self, user: &UserId) -> StoreResult<Vec<UserTag>> {
        let rows = sqlx::query("SELECT user_id, tag FROM qa_user_tag WHERE user_id = $1 ORDER BY id")
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, parse_tag)
    }

    async fn all_tags(&self) -> StoreResult<Vec<UserTag>> {
        let rows = sqlx::query("SELECT user_id, tag FROM qa_user_tag ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, parse_tag)
    }
}

#[async_trait]
impl ContentStore for PostgresSocialStore {
    async fn get_question(&self, id: QuestionId) -> StoreResult<Option<Question>> {
        let row = sqlx::query(&format!("SELECT {QUESTION_COLUMNS} FROM qa_question WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(parse_question).transpose()?)
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUESTION_COLUMNS} FROM qa_question \
             WHERE ($1::TEXT IS NULL OR author = $1) AND ($2::TEXT IS NULL OR topic = $2) \
             ORDER BY updated_at DESC, id DESC"
        ))
        .bind(filter.author.as_ref().map(UserId::as_str))
        .bind(&filter.topic)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_question)
    }

    async fn insert_question(&self, new: NewQuestion) -> StoreResult<(Question, MessageNode)> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO qa_question (author, description, topic, content, quote) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {QUESTION_COLUMNS}"
        ))
        .bind(new.author.as_str())
        .bind(&new.description)
        .bind(&new.topic)
        .bind(&new.content)
        .bind(&new.quote)
        .fetch_one(&mut *tx)
        .await?;
        let question = parse_question(&row)?;
        let message =
            insert_message(&mut *tx, MessageSource::Question(question.id), None, &question.content)
                .await?;
        tx.commit().await?;
        Ok((question, message))
    }

    async fn delete_question(&self, id: QuestionId, dependents: Dependents) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        // Answer inserts bump answer_cnt on this row, so the lock orders them.
        let answer_cnt: i32 =
            sqlx::query_scalar("SELECT answer_cnt FROM qa_question WHERE id = $1 FOR UPDATE")
                .bind(id.get())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::not_found("question", id))?;
        if dependents.refuses() && answer_cnt > 0 {
            return Err(StoreError::DependencyExists(format!(
                "question {} has {} answers",
                id, answer_cnt
            )));
        }
        sqlx::query("DELETE FROM qa_question WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_answer(&self, id: AnswerId) -> StoreResult<Option<Answer>> {
        let row = sqlx::query(&format!("SELECT {ANSWER_COLUMNS} FROM qa_answer WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(parse_answer).transpose()?)
    }

    async fn answers_for(&self, question: QuestionId) -> StoreResult<Vec<Answer>> {
        let rows = sqlx::query(&format!(
            "SELECT {ANSWER_COLUMNS} FROM qa_answer WHERE question_id = $1 \
             ORDER BY like_cnt DESC, updated_at DESC, id DESC"
        ))
        .bind(question.get())
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_answer)
    }

    async fn insert_answer(&self, new: NewAnswer) -> StoreResult<(Answer, MessageNode)> {
        let mut tx = self.pool.begin().await?;
        let bumped = sqlx::query("UPDATE qa_question SET answer_cnt = answer_cnt + 1 WHERE id = $1")
            .bind(new.question.get())
            .execute(&mut *tx)
            .await?;
        if bumped.rows_affected() == 0 {
            return Err(StoreError::not_found("question", new.question));
        }
        let row = sqlx::query(&format!(
            "INSERT INTO qa_answer (question_id, author, content, quote) \
             VALUES ($1, $2, $3, $4) RETURNING {ANSWER_COLUMNS}"
        ))
        .bind(new.question.get())
        .bind(new.author.as_str())
        .bind(&new.content)
        .bind(&new.quote)
        .fetch_one(&mut *tx)
        .await?;
        let answer = parse_answer(&row)?;
        let reply_to: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM qa_message WHERE source_kind = 'question' AND source_id = $1",
        )
        .bind(new.question.get())
        .fetch_optional(&mut *tx)
        .await?;
        let message = insert_message(
            &mut *tx,
            MessageSource::Answer(answer.id),
            reply_to.map(MessageId::new),
            &answer.content,
        )
        .await?;
        tx.commit().await?;
        Ok((answer, message))
    }

    async fn delete_answer(&self, id: AnswerId, dependents: Dependents) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let has_comments: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM qa_comment WHERE answer_id = a.id) \
             FROM qa_answer a WHERE a.id = $1 FOR UPDATE OF a",
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("answer", id))?;
        if dependents.refuses() && has_comments {
            return Err(StoreError::DependencyExists(format!("answer {} has comments", id)));
        }
        let question: Option<Option<i64>> =
            sqlx::query_scalar("DELETE FROM qa_answer WHERE id = $1 RETURNING question_id")
                .bind(id.get())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(question) = question else {
            return Err(StoreError::not_found("answer", id));
        };
        if let Some(question) = question {
            sqlx::query(
                "UPDATE qa_question SET answer_cnt = GREATEST(answer_cnt - 1, 0) WHERE id = $1",
            )
            .bind(question)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("DELETE FROM qa_vote WHERE target_kind = 'answer' AND target_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM qa_post WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(parse_post).transpose()?)
    }

    async fn insert_post(&self, new: NewPost) -> StoreResult<(Post, MessageNode)> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO qa_post (author, title, content, image_url) \
             VALUES ($1, $2, $3, $4) RETURNING {POST_COLUMNS}"
        ))
        .bind(new.author.as_str())
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.image_url)
        .fetch_one(&mut *tx)
        .await?;
        let post = parse_post(&row)?;
        let message =
            insert_message(&mut *tx, MessageSource::Post(post.id), None, &post.content).await?;
        tx.commit().await?;
        Ok((post, message))
    }
}

#[async_trait]
impl VoteStore for PostgresSocialStore {
    async fn get_tally(&self, target: VoteTarget) -> StoreResult<Option<Tally>> {
        let row = sqlx::query(&format!(
            "SELECT like_cnt, dislike_cnt FROM {} WHERE id = $1",
            tally_table(target)
        ))
        .bind(target.raw_id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(tally).transpose()?)
    }

    async fn get_vote(&self, voter: &UserId, target: VoteTarget) -> StoreResult<Option<VoteValue>> {
        let value: Option<i16> = sqlx::query_scalar(
            "SELECT value FROM qa_vote WHERE target_kind = $1 AND target_id = $2 AND voter = $3",
        )
        .bind(target.kind())
        .bind(target.raw_id())
        .bind(voter.as_str())
        .fetch_optional(&self.pool)
        .await?;
        value
            .map(|v| VoteValue::try_from(i64::from(v)))
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn commit_vote(&self, commit: VoteCommit) -> StoreResult<Tally> {
        let target = commit.target;
        let mut tx = self.pool.begin().await?;

        let current: Option<i16> = sqlx::query_scalar(
            "SELECT value FROM qa_vote \
             WHERE target_kind = $1 AND target_id = $2 AND voter = $3 FOR UPDATE",
        )
        .bind(target.kind())
        .bind(target.raw_id())
        .bind(commit.voter.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if current != commit.expected.map(|v| i16::from(v.as_i8())) {
            return Err(StoreError::Conflict(format!(
                "vote of {} on {} changed concurrently",
                commit.voter, target
            )));
        }

        // CHECK (>= 0) on the counters turns an underflow into a conflict.
        let row = sqlx::query(&format!(
            "UPDATE {} SET like_cnt = like_cnt + $1, dislike_cnt = dislike_cnt + $2 \
             WHERE id = $3 RETURNING like_cnt, dislike_cnt",
            tally_table(target)
        ))
        .bind(commit.delta.like)
        .bind(commit.delta.dislike)
        .bind(target.raw_id())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found(target.kind(), target.raw_id()))?;
        let updated = tally(&row)?;

        let value = i16::from(commit.value.as_i8());
        if commit.expected.is_some() {
            sqlx::query(
                "UPDATE qa_vote SET value = $4 \
                 WHERE target_kind = $1 AND target_id = $2 AND voter = $3",
            )
            .bind(target.kind())
            .bind(target.raw_id())
            .bind(commit.voter.as_str())
            .bind(value)
            .execute(&mut *tx)
            .await?;
        } else {
            // A concurrent first vote hits the primary key and surfaces as a conflict.
            sqlx::query(
                "INSERT INTO qa_vote (target_kind, target_id, voter, value) VALUES ($1, $2, $3, $4)",
            )
            .bind(target.kind())
            .bind(target.raw_id())
            .bind(commit.voter.as_str())
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn votes_for(&self, target: VoteTarget) -> StoreResult<Vec<Vote>> {
        let rows = sqlx::query(
            "SELECT voter, value FROM qa_vote WHERE target_kind = $1 AND target_id = $2 ORDER BY voter",
        )
        .bind(target.kind())
        .bind(target.raw_id())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> StoreResult<Vote> {
                let voter: String = row.try_get("voter")?;
                let value: i16 = row.try_get("value")?;
                let value = VoteValue::try_from(i64::from(value))
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(Vote {
                    voter: UserId::from(voter),
                    target,
                    value,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RankStore for PostgresSocialStore {
    async fn get_item(&self, id: ItemId) -> StoreResult<Option<OrderedItem>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM qa_handbook WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(parse_item).transpose()?)
    }

    async fn find_item(&self, category: &str, order: u32) -> StoreResult<Option<OrderedItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM qa_handbook WHERE category = $1 AND position = $2"
        ))
        .bind(category)
        .bind(order as i32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(parse_item).transpose()?)
    }

    async fn list_category(&self, category: &str) -> StoreResult<Vec<OrderedItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM qa_handbook WHERE category = $1 ORDER BY position"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_item)
    }

    async fn category_len(&self, category: &str) -> StoreResult<u32> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qa_handbook WHERE category = $1")
            .bind(category)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u32)
    }

    async fn published_categories(&self) -> StoreResult<Vec<CategoryCount>> {
        let rows = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS cnt
            FROM qa_handbook
            WHERE published AND category <> $1
            GROUP BY category
            ORDER BY cnt DESC, category
            "#,
        )
        .bind(DEFAULT_CATEGORY)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> StoreResult<CategoryCount> {
                let cnt: i64 = row.try_get("cnt")?;
                Ok(CategoryCount {
                    category: row.try_get("category")?,
                    count: cnt as u32,
                })
            })
            .collect()
    }

    async fn apply_rank_plan(&self, plan: RankPlan) -> StoreResult<Option<OrderedItem>> {
        let mut categories: Vec<&str> = plan
            .guards
            .iter()
            .map(|g| g.category.as_str())
            .chain(plan.shifts.iter().map(|s| s.category.as_str()))
            .chain(match &plan.write {
                ItemWrite::Insert { slot, .. } => vec![slot.category.as_str()],
                ItemWrite::Relocate { from, to, .. } => {
                    vec![from.category.as_str(), to.category.as_str()]
                }
                ItemWrite::Remove { from, .. } => vec![from.category.as_str()],
            })
            .collect();
        // Sorted lock order keeps concurrent plans deadlock-free.
        categories.sort_unstable();
        categories.dedup();

        let mut tx = self.pool.begin().await?;
        for category in &categories {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext('qa_handbook:' || $1))")
                .bind(*category)
                .execute(&mut *tx)
                .await?;
        }

        for guard in &plan.guards {
            let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qa_handbook WHERE category = $1")
                .bind(&guard.category)
                .fetch_one(&mut *tx)
                .await?;
            if len != i64::from(guard.len) {
                return Err(StoreError::Conflict(format!(
                    "category {} changed size ({} -> {})",
                    guard.category, guard.len, len
                )));
            }
        }

        let written = match &plan.write {
            ItemWrite::Insert { .. } => None,
            ItemWrite::Relocate { id, from, .. } | ItemWrite::Remove { id, from } => {
                let row = sqlx::query("SELECT category, position FROM qa_handbook WHERE id = $1")
                    .bind(id.get())
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| StoreError::not_found("item", id))?;
                let category: String = row.try_get("category")?;
                let position: i32 = row.try_get("position")?;
                if category != from.category || position != from.order as i32 {
                    return Err(StoreError::Conflict(format!("item {} moved concurrently", id)));
                }
                Some(id.get())
            }
        };

        for shift in &plan.shifts {
            sqlx::query(
                r#"
                UPDATE qa_handbook SET position = position + $1
                WHERE category = $2
                  AND position >= $3
                  AND ($4::INTEGER IS NULL OR position <= $4)
                  AND ($5::BIGINT IS NULL OR id <> $5)
                "#,
            )
            .bind(shift.delta)
            .bind(&shift.category)
            .bind(shift.from as i32)
            .bind(shift.to.map(|t| t as i32))
            .bind(written)
            .execute(&mut *tx)
            .await?;
        }

        let result = match plan.write {
            ItemWrite::Insert { slot, owner, content } => {
                let row = sqlx::query(&format!(
                    "INSERT INTO qa_handbook (category, position, owner, title, content, label, published) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ITEM_COLUMNS}"
                ))
                .bind(&slot.category)
                .bind(slot.order as i32)
                .bind(owner.as_str())
                .bind(&content.title)
                .bind(&content.content)
                .bind(&content.label)
                .bind(content.published)
                .fetch_one(&mut *tx)
                .await?;
                let item = parse_item(&row)?;
                sqlx::query(
                    "INSERT INTO qa_handbook_draft (item_id, owner, title, content, label) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(item.id.get())
                .bind(owner.as_str())
                .bind(&item.title)
                .bind(&item.content)
                .bind(&item.label)
                .execute(&mut *tx)
                .await?;
                Some(item)
            }
            ItemWrite::Relocate { id, to, edit, .. } => {
                let row = sqlx::query(&format!(
                    r#"
                    UPDATE qa_handbook
                    SET category = $2, position = $3,
                        title = COALESCE($4, title),
                        content = COALESCE($5, content),
                        label = COALESCE($6, label),
                        published = COALESCE($7, published),
                        updated_at = now()
                    WHERE id = $1
                    RETURNING {ITEM_COLUMNS}
                    "#
                ))
                .bind(id.get())
                .bind(&to.category)
                .bind(to.order as i32)
                .bind(&edit.title)
                .bind(&edit.content)
                .bind(&edit.label)
                .bind(edit.published)
                .fetch_one(&mut *tx)
                .await?;
                Some(parse_item(&row)?)
            }
            ItemWrite::Remove { id, .. } => {
                sqlx::query("DELETE FROM qa_handbook WHERE id = $1")
                    .bind(id.get())
                    .execute(&mut *tx)
                    .await?;
                None
            }
        };

        // Deferred slot uniqueness is checked here.
        tx.commit().await?;
        Ok(result)
    }

    async fn get_draft(&self, item: ItemId) -> StoreResult<Option<Draft>> {
        let row = sqlx::query(&format!(
            "SELECT {DRAFT_COLUMNS} FROM qa_handbook_draft WHERE item_id = $1"
        ))
        .bind(item.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(parse_draft).transpose()?)
    }

    async fn save_draft(&self, item: ItemId, edit: DraftEdit) -> StoreResult<Draft> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE qa_handbook_draft
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                label = COALESCE($4, label),
                pending = TRUE,
                updated_at = now()
            WHERE item_id = $1
            RETURNING {DRAFT_COLUMNS}
            "#
        ))
        .bind(item.get())
        .bind(&edit.title)
        .bind(&edit.content)
        .bind(&edit.label)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("draft", item))?;
        Ok(parse_draft(&row)?)
    }

    async fn publish_draft(&self, item: ItemId) -> StoreResult<OrderedItem> {
        let mut tx = self.pool.begin().await?;
        let draft = sqlx::query(&format!(
            "SELECT {DRAFT_COLUMNS} FROM qa_handbook_draft WHERE item_id = $1 FOR UPDATE"
        ))
        .bind(item.get())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("draft", item))?;
        let draft = parse_draft(&draft)?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE qa_handbook
            SET title = $2, content = $3, label = $4, published = TRUE, updated_at = now()
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item.get())
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(&draft.label)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("item", item))?;
        let published = parse_item(&row)?;
        sqlx::query("UPDATE qa_handbook_draft SET pending = FALSE, updated_at = now() WHERE item_id = $1")
            .bind(item.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(published)
    }

    async fn delete_draft(&self, item: ItemId) -> StoreResult<()> {
        let deleted = sqlx::query("DELETE FROM qa_handbook_draft WHERE item_id = $1")
            .bind(item.get())
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found("draft", item));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyStore for PostgresSocialStore {
    async fn get_comment(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        let row = sqlx::query(&format!("SELECT {COMMENT_COLUMNS} FROM qa_comment WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(parse_comment).transpose()?)
    }

    async fn replies_to(&self, parent: CommentId) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM qa_comment WHERE parent_id = $1 ORDER BY id"
        ))
        .bind(parent.get())
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_comment)
    }

    async fn root_comments(&self, answer: AnswerId) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM qa_comment \
             WHERE answer_id = $1 AND parent_id IS NULL ORDER BY id"
        ))
        .bind(answer.get())
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_comment)
    }

    async fn comment_count(&self, answer: AnswerId) -> StoreResult<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qa_comment WHERE answer_id = $1")
            .bind(answer.get())
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn insert_comment(&self, new: NewComment) -> StoreResult<Comment> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO qa_comment (answer_id, parent_id, author, content) \
             VALUES ($1, $2, $3, $4) RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(new.answer.get())
        .bind(new.parent.map(|p| p.get()))
        .bind(new.author.as_str())
        .bind(&new.content)
        .fetch_one(&mut *tx)
        .await?;
        let comment = parse_comment(&row)?;
        if let Some(parent) = new.parent {
            sqlx::query("UPDATE qa_comment SET reply_cnt = reply_cnt + 1 WHERE id = $1")
                .bind(parent.get())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("UPDATE qa_answer SET comment_cnt = comment_cnt + 1 WHERE id = $1")
            .bind(new.answer.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: CommentId, dependents: Dependents) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let has_replies: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM qa_comment r WHERE r.parent_id = c.id) \
             FROM qa_comment c WHERE c.id = $1 FOR UPDATE OF c",
        )
        .bind(id.get())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("comment", id))?;
        if dependents.refuses() && has_replies {
            return Err(StoreError::DependencyExists(format!("comment {} has replies", id)));
        }
        let row = sqlx::query("DELETE FROM qa_comment WHERE id = $1 RETURNING answer_id, parent_id")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("comment", id))?;
        let answer: Option<i64> = row.try_get("answer_id")?;
        let parent: Option<i64> = row.try_get("parent_id")?;
        if let Some(parent) = parent {
            sqlx::query("UPDATE qa_comment SET reply_cnt = GREATEST(reply_cnt - 1, 0) WHERE id = $1")
                .bind(parent)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(answer) = answer {
            sqlx::query(
                "UPDATE qa_answer SET comment_cnt = GREATEST(comment_cnt - 1, 0) WHERE id = $1",
            )
            .bind(answer)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("DELETE FROM qa_vote WHERE target_kind = 'comment' AND target_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl FollowStore for PostgresSocialStore {
    async fn insert_follow(&self, follower: &UserId, followee: &UserId) -> StoreResult<FollowEdge> {
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            "INSERT INTO qa_follow (follower, followee) VALUES ($1, $2) RETURNING created_at",
        )
        .bind(follower.as_str())
        .bind(followee.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(FollowEdge {
            follower: follower.clone(),
            followee: followee.clone(),
            created_at,
        })
    }

    async fn delete_follow(&self, follower: &UserId, followee: &UserId) -> StoreResult<()> {
        let deleted = sqlx::query("DELETE FROM qa_follow WHERE follower = $1 AND followee = $2")
            .bind(follower.as_str())
            .bind(followee.as_str())
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found(
                "follow edge",
                format!("{} -> {}", follower, followee),
            ));
        }
        Ok(())
    }

    async fn following(&self, user: &UserId) -> StoreResult<Vec<FollowEdge>> {
        let rows = sqlx::query(
            "SELECT follower, followee, created_at FROM qa_follow \
             WHERE follower = $1 ORDER BY created_at DESC, followee",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_edge)
    }

    async fn followers(&self, user: &UserId) -> StoreResult<Vec<FollowEdge>> {
        let rows = sqlx::query(
            "SELECT follower, followee, created_at FROM qa_follow \
             WHERE followee = $1 ORDER BY created_at DESC, follower",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_edge)
    }

    async fn follow_edges(&self) -> StoreResult<Vec<FollowEdge>> {
        let rows = sqlx::query(
            "SELECT follower, followee, created_at FROM qa_follow ORDER BY created_at, follower, followee",
        )
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_edge)
    }

    async fn replace_pair_scores(&self, user: &UserId, scores: Vec<PairScore>) -> StoreResult<()> {
        let (others, degrees): (Vec<String>, Vec<f64>) = scores
            .into_iter()
            .map(|s| (s.user_b.as_str().to_string(), s.degree))
            .unzip();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM qa_pair_score WHERE user_a = $1 OR user_b = $1")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO qa_pair_score (user_a, user_b, degree)
            SELECT $1, other, degree FROM UNNEST($2::TEXT[], $3::FLOAT8[]) AS t(other, degree)
            "#,
        )
        .bind(user.as_str())
        .bind(&others)
        .bind(&degrees)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn pair_scores_involving(&self, user: &UserId) -> StoreResult<Vec<PairScore>> {
        let rows = sqlx::query(
            "SELECT user_a, user_b, degree FROM qa_pair_score WHERE user_a = $1 OR user_b = $1",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> StoreResult<PairScore> {
                Ok(PairScore {
                    user_a: UserId::from(row.try_get::<String, _>("user_a")?),
                    user_b: UserId::from(row.try_get::<String, _>("user_b")?),
                    degree: row.try_get("degree")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MessageStore for PostgresSocialStore {
    async fn get_message(&self, id: MessageId) -> StoreResult<Option<MessageNode>> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM qa_message WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_message).transpose()
    }

    async fn message_for(&self, source: MessageSource) -> StoreResult<Option<MessageNode>> {
        let (kind, id) = source_parts(source);
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM qa_message WHERE source_kind = $1 AND source_id = $2"
        ))
        .bind(kind)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_message).transpose()
    }

    async fn replies_to_message(&self, id: MessageId) -> StoreResult<Vec<MessageNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM qa_message WHERE reply_to = $1 ORDER BY id"
        ))
        .bind(id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_message).collect()
    }

    async fn latest_messages(&self, page: Page) -> StoreResult<Vec<MessageNode>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM qa_message \
             ORDER BY created_at DESC, id DESC OFFSET $1 LIMIT $2"
        ))
        .bind(sql_bound(page.offset))
        .bind(sql_bound(page.count))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_message).collect()
    }

    async fn resolve_source(&self, source: MessageSource) -> StoreResult<Option<SourceRecord>> {
        let (table, quote) = match source {
            MessageSource::Question(_) => ("qa_question", "quote"),
            MessageSource::Answer(_) => ("qa_answer", "quote"),
            MessageSource::Post(_) => ("qa_post", "NULL::TEXT AS quote"),
        };
        let (_, id) = source_parts(source);
        let row = sqlx::query(&format!("SELECT author, {quote} FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(SourceRecord {
                owner: user_id(&row, "author")?,
                quote: row.try_get("quote")?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MomentStore for PostgresSocialStore {
    async fn insert_moment(&self, new: NewMoment) -> StoreResult<Moment> {
        let row = sqlx::query(&format!(
            "INSERT INTO qa_moment (author, content, image_url, quote) \
             VALUES ($1, $2, $3, $4) RETURNING {MOMENT_COLUMNS}"
        ))
        .bind(new.author.as_str())
        .bind(&new.content)
        .bind(&new.image_url)
        .bind(&new.quote)
        .fetch_one(&self.pool)
        .await?;
        Ok(parse_moment(&row)?)
    }

    async fn moments(&self, author: Option<&UserId>, page: Page) -> StoreResult<Paged<Moment>> {
        let author = author.map(UserId::as_str);
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM qa_moment WHERE ($1::TEXT IS NULL OR author = $1)")
                .bind(author)
                .fetch_one(&self.pool)
                .await?;
        let rows = sqlx::query(&format!(
            "SELECT {MOMENT_COLUMNS} FROM qa_moment WHERE ($1::TEXT IS NULL OR author = $1) \
             ORDER BY id DESC OFFSET $2 LIMIT $3"
        ))
        .bind(author)
        .bind(sql_bound(page.offset))
        .bind(sql_bound(page.count))
        .fetch_all(&self.pool)
        .await?;
        Ok(Paged {
            total: usize::try_from(total).unwrap_or(0),
            items: collect(&rows, parse_moment)?,
        })
    }
}

#[async_trait]
impl ChatStore for PostgresSocialStore {
    async fn open_chat(&self, a: &UserId, b: &UserId) -> StoreResult<Chat> {
        // The unordered-pair index turns a racing insert into a no-op.
        sqlx::query("INSERT INTO qa_chat (user_a, user_b) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(a.as_str())
            .bind(b.as_str())
            .execute(&self.pool)
            .await?;
        let row = sqlx::query(
            "SELECT id, user_a, user_b FROM qa_chat \
             WHERE LEAST(user_a, user_b) = LEAST($1, $2) AND GREATEST(user_a, user_b) = GREATEST($1, $2)",
        )
        .bind(a.as_str())
        .bind(b.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(parse_chat(&row)?)
    }

    async fn get_chat(&self, id: ChatId) -> StoreResult<Option<Chat>> {
        let row = sqlx::query("SELECT id, user_a, user_b FROM qa_chat WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(parse_chat).transpose()?)
    }

    async fn chats_of(&self, user: &UserId) -> StoreResult<Vec<(Chat, Option<ChatMessage>)>> {
        let chats = sqlx::query(
            "SELECT id, user_a, user_b FROM qa_chat WHERE user_a = $1 OR user_b = $1 ORDER BY id",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;
        let chats = collect(&chats, parse_chat)?;
        let ids: Vec<i64> = chats.iter().map(|c| c.id.get()).collect();
        let latest = sqlx::query(&format!(
            "SELECT DISTINCT ON (chat_id) {CHAT_MESSAGE_COLUMNS} FROM qa_chat_message \
             WHERE chat_id = ANY($1) ORDER BY chat_id, id DESC"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let latest = collect(&latest, parse_chat_message)?;
        Ok(chats
            .into_iter()
            .map(|chat| {
                let last = latest.iter().find(|m| m.chat == chat.id).cloned();
                (chat, last)
            })
            .collect())
    }

    async fn insert_chat_message(&self, new: NewChatMessage) -> StoreResult<ChatMessage> {
        let row = sqlx::query(&format!(
            "INSERT INTO qa_chat_message (chat_id, from_user, to_user, content, quote, image_url) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {CHAT_MESSAGE_COLUMNS}"
        ))
        .bind(new.chat.get())
        .bind(new.from.as_str())
        .bind(new.to.as_str())
        .bind(&new.content)
        .bind(&new.quote)
        .bind(&new.image_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(parse_chat_message(&row)?)
    }

    async fn chat_messages(&self, chat: ChatId) -> StoreResult<Vec<ChatMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHAT_MESSAGE_COLUMNS} FROM qa_chat_message WHERE chat_id = $1 ORDER BY id DESC"
        ))
        .bind(chat.get())
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, parse_chat_message)
    }

    async fn get_chat_message(&self, id: ChatMessageId) -> StoreResult<Option<ChatMessage>> {
        let row = sqlx::query(&format!(
            "SELECT {CHAT_MESSAGE_COLUMNS} FROM qa_chat_message WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(parse_chat_message).transpose()?)
    }

    async fn delete_chat_message(&self, id: ChatMessageId) -> StoreResult<()> {
        let deleted = sqlx::query("DELETE FROM qa_chat_message WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::not_found("chat message", id));
        }
        Ok(())
    }
}
