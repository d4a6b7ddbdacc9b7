//! Axum routes for the Q&A social service.

use axum::{
    extract::{Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chat::Outgoing;
use crate::error::{CoreError, ErrorKind};
use crate::store::SocialStore;
use crate::types::{
    Answer, AnswerId, Caller, CategoryCount, Chat, ChatId, ChatMessage, ChatMessageId,
    ChatSummary, Comment, CommentId, CommentPage, Draft, DraftEdit, FollowEdge, ItemContent,
    ItemEdit, ItemId, Match, MessageId, Moment, NewPost, NewQuestion, OrderedItem, Page, Paged,
    Post, ProjectedMessage, Question, QuestionId, QuestionSummary, Tally, TopicSummary, UserId,
    UserTag, VoteTarget,
};

use super::middleware::record_pairing_scheduled;
use super::state::{HealthCheck, ServiceState};

/// Header carrying the authenticated user name.
pub const USER_HEADER: &str = "x-user-id";

type AppState<S> = Arc<ServiceState<S>>;
type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to cast, change or retract a vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    /// Voted entity.
    pub target: VoteTarget,
    /// -1, 0 or 1.
    pub value: i64,
}

/// Request to create a handbook item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertItemRequest {
    /// Category; the default category when absent.
    pub category: Option<String>,
    /// Rank to insert at; appended when absent.
    pub rank: Option<u32>,
    /// Item payload.
    #[serde(flatten)]
    pub content: ItemContent,
}

/// Request to move a handbook item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveItemRequest {
    /// Destination category; the item's own when absent.
    pub category: Option<String>,
    /// Destination rank.
    pub rank: u32,
}

/// Request to post a comment on an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRequest {
    /// Comment replied to; a root comment when absent.
    pub parent: Option<CommentId>,
    /// Body.
    pub content: String,
}

/// Request to open a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    /// Short description.
    pub description: Option<String>,
    /// Topic bucket.
    pub topic: Option<String>,
    /// Body.
    pub content: String,
    /// Quoted excerpt.
    pub quote: Option<String>,
}

/// Request to answer a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Body.
    pub content: String,
    /// Quoted excerpt.
    pub quote: Option<String>,
}

/// Request to publish a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRequest {
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Body.
    pub content: String,
    /// Attached image.
    pub image_url: Option<String>,
}

/// Request to tag the caller's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRequest {
    /// Tag text.
    pub tag: String,
}

/// Request to post a moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentRequest {
    /// Body.
    pub content: String,
    /// Attached image.
    pub image_url: Option<String>,
    /// Quoted excerpt.
    pub quote: Option<String>,
}

/// Request to open a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenChatRequest {
    /// The other participant.
    pub peer: UserId,
}

/// 1-based page number.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    page: Option<usize>,
    brief: Option<usize>,
}

/// Offset window over a traversal.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WindowQuery {
    offset: Option<usize>,
    count: Option<usize>,
    limit: Option<usize>,
}

/// Number of questions requested.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TopQuery {
    k: Option<usize>,
}

/// Number of matches requested.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MatchQuery {
    k: Option<usize>,
}

/// Background recomputation accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeAccepted {
    /// Subject user.
    pub user: UserId,
    /// Always `"scheduled"`.
    pub status: String,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"healthy"` or `"degraded"`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
}

/// Database health information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHealth {
    /// Whether a health query succeeded.
    pub connected: bool,
    /// Open connections.
    pub pool_size: u32,
    /// Idle connections.
    pub pool_idle: usize,
    /// Pool ceiling.
    pub pool_max: u32,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always `"alive"`.
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether the service accepts traffic.
    pub ready: bool,
    /// Whether the store answered.
    pub database: bool,
    /// Reason when not ready.
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A core failure on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.0.kind();
        let status =
            StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = ErrorResponse::new(kind.code(), self.0.to_string());
        if let CoreError::NotFound { entity, id } = &self.0 {
            body = body.with_details(format!("{entity}:{id}"));
        }
        if kind == ErrorKind::Unknown {
            tracing::error!(code = %body.code, error = %body.error, "Request failed");
        } else {
            tracing::warn!(code = %body.code, error = %body.error, "Request error");
        }
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn caller<S: SocialStore + HealthCheck + 'static>(
    state: &ServiceState<S>,
    headers: &HeaderMap,
) -> ApiResult<Caller> {
    let user = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::Authorization(format!("missing {USER_HEADER} header")))?;
    Ok(state.caller(user).await?)
}

fn vote_target(kind: &str, id: i64) -> ApiResult<VoteTarget> {
    match kind {
        "answer" => Ok(VoteTarget::Answer(AnswerId::new(id))),
        "comment" => Ok(VoteTarget::Comment(CommentId::new(id))),
        other => Err(CoreError::Validation(format!("unknown vote target {other}")).into()),
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn cast_vote_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<VoteRequest>,
) -> ApiResult<Json<Tally>> {
    let caller = caller(&state, &headers).await?;
    let tally = state.votes.cast_vote(&caller, request.target, request.value).await?;
    Ok(Json(tally))
}

async fn tally_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Json<Tally>> {
    let target = vote_target(&kind, id)?;
    Ok(Json(state.votes.tally(target).await?))
}

async fn insert_item_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<InsertItemRequest>,
) -> ApiResult<(StatusCode, Json<OrderedItem>)> {
    let caller = caller(&state, &headers).await?;
    let item = state
        .handbook
        .insert(&caller, request.category.as_deref(), request.rank, request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn categories_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<Vec<CategoryCount>>> {
    Ok(Json(state.handbook.categories().await?))
}

async fn category_items_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(category): Path<String>,
) -> ApiResult<Json<Vec<OrderedItem>>> {
    Ok(Json(state.handbook.list(&category).await?))
}

async fn get_item_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<OrderedItem>> {
    Ok(Json(state.handbook.get(ItemId::new(id)).await?))
}

async fn edit_item_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(edit): Json<ItemEdit>,
) -> ApiResult<Json<OrderedItem>> {
    let caller = caller(&state, &headers).await?;
    Ok(Json(state.handbook.edit(&caller, ItemId::new(id), edit).await?))
}

async fn move_item_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(request): Json<MoveItemRequest>,
) -> ApiResult<Json<OrderedItem>> {
    let caller = caller(&state, &headers).await?;
    let item = state
        .handbook
        .move_item(&caller, ItemId::new(id), request.category.as_deref(), request.rank)
        .await?;
    Ok(Json(item))
}

async fn delete_item_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    state.handbook.delete(&caller, ItemId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn next_item_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Option<OrderedItem>>> {
    Ok(Json(state.handbook.next_published(ItemId::new(id)).await?))
}

async fn prev_item_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Option<OrderedItem>>> {
    Ok(Json(state.handbook.prev_published(ItemId::new(id)).await?))
}

async fn post_comment_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(answer): Path<i64>,
    Json(request): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let caller = caller(&state, &headers).await?;
    let comment = state
        .replies
        .post_reply(&caller, AnswerId::new(answer), request.parent, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn answer_comments_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(answer): Path<i64>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<CommentPage>> {
    let page = state
        .replies
        .answer_comments(AnswerId::new(answer), query.page.unwrap_or(1), query.brief)
        .await?;
    Ok(Json(page))
}

async fn brief_replies_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<Vec<Comment>>> {
    let limit = query.limit.unwrap_or(state.config.brief_replies);
    Ok(Json(state.replies.brief_replies(CommentId::new(id), limit).await?))
}

async fn all_replies_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<Json<Paged<Comment>>> {
    let page = Page::new(
        query.offset.unwrap_or(0),
        query.count.unwrap_or(state.config.page_size),
    );
    Ok(Json(state.replies.all_replies(CommentId::new(id), page).await?))
}

async fn delete_comment_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    state.replies.delete_reply(&caller, CommentId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn follow_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(user): Path<String>,
) -> ApiResult<(StatusCode, Json<FollowEdge>)> {
    let caller = caller(&state, &headers).await?;
    let edge = state.follows.follow(&caller, &UserId::new(user)).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn unfollow_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(user): Path<String>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    state.follows.unfollow(&caller, &UserId::new(user)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn followers_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(user): Path<String>,
) -> ApiResult<Json<Vec<FollowEdge>>> {
    Ok(Json(state.follows.followers(&UserId::new(user)).await?))
}

async fn following_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(user): Path<String>,
) -> ApiResult<Json<Vec<FollowEdge>>> {
    Ok(Json(state.follows.following(&UserId::new(user)).await?))
}

/// Schedule a recomputation of the user's pair scores.
///
/// Only the user or an admin may trigger it. Answers before the work runs.
async fn recompute_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(user): Path<String>,
) -> ApiResult<(StatusCode, Json<RecomputeAccepted>)> {
    let caller = caller(&state, &headers).await?;
    let user = UserId::new(user);
    if !caller.owns_or_admin(Some(&user)) {
        return Err(CoreError::Authorization(format!(
            "{} may not recompute scores of {}",
            caller.user, user
        ))
        .into());
    }
    if state.store.get_user(&user).await.map_err(CoreError::from)?.is_none() {
        return Err(CoreError::not_found("user", &user).into());
    }
    drop(state.pairing.spawn_recompute(user.clone()));
    record_pairing_scheduled(user.as_str());
    Ok((
        StatusCode::ACCEPTED,
        Json(RecomputeAccepted {
            user,
            status: "scheduled".to_string(),
        }),
    ))
}

async fn matches_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(user): Path<String>,
    Query(query): Query<MatchQuery>,
) -> ApiResult<Json<Vec<Match>>> {
    let k = query.k.unwrap_or(state.config.top_matches);
    Ok(Json(state.pairing.top_matches(&UserId::new(user), k).await?))
}

async fn message_thread_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ProjectedMessage>>> {
    Ok(Json(state.threads.thread_from(MessageId::new(id)).await?))
}

async fn question_thread_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ProjectedMessage>>> {
    Ok(Json(state.threads.thread_for_question(QuestionId::new(id)).await?))
}

async fn timeline_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<ProjectedMessage>>> {
    Ok(Json(state.threads.timeline(query.page.unwrap_or(1)).await?))
}

async fn post_question_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<QuestionRequest>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let caller = caller(&state, &headers).await?;
    let new = NewQuestion {
        author: caller.user.clone(),
        description: request.description,
        topic: request.topic,
        content: request.content,
        quote: request.quote,
    };
    Ok((StatusCode::CREATED, Json(state.content.post_question(&caller, new).await?)))
}

async fn get_question_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Question>> {
    Ok(Json(state.content.question(QuestionId::new(id)).await?))
}

async fn delete_question_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    state.content.delete_question(&caller, QuestionId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn question_answers_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Answer>>> {
    Ok(Json(state.content.question_answers(QuestionId::new(id)).await?))
}

async fn post_answer_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<(StatusCode, Json<Answer>)> {
    let caller = caller(&state, &headers).await?;
    let answer = state
        .content
        .post_answer(&caller, QuestionId::new(id), &request.content, request.quote)
        .await?;
    Ok((StatusCode::CREATED, Json(answer)))
}

async fn delete_answer_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    state.content.delete_answer(&caller, AnswerId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_post_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<PostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let caller = caller(&state, &headers).await?;
    let new = NewPost {
        author: caller.user.clone(),
        title: request.title,
        content: request.content,
        image_url: request.image_url,
    };
    Ok((StatusCode::CREATED, Json(state.content.post_post(&caller, new).await?)))
}

fn numbered(query: PageQuery, per_page: usize) -> Page {
    Page::numbered(query.page.unwrap_or(1), per_page)
}

async fn recent_questions_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paged<QuestionSummary>>> {
    Ok(Json(state.content.recent_questions(numbered(query, state.config.page_size)).await?))
}

async fn hottest_questions_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<TopQuery>,
) -> ApiResult<Json<Vec<QuestionSummary>>> {
    let k = query.k.unwrap_or(state.config.page_size);
    Ok(Json(state.content.hottest_questions(k).await?))
}

async fn suggested_questions_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<TopQuery>,
) -> ApiResult<Json<Vec<QuestionSummary>>> {
    let k = query.k.unwrap_or(state.config.page_size);
    Ok(Json(state.content.suggested_questions(k).await?))
}

async fn topics_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<Vec<TopicSummary>>> {
    Ok(Json(state.content.topics().await?))
}

async fn topic_questions_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(topic): Path<String>,
) -> ApiResult<Json<Vec<QuestionSummary>>> {
    Ok(Json(state.content.questions_by_topic(&topic).await?))
}

async fn user_questions_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(user): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paged<QuestionSummary>>> {
    let page = numbered(query, state.config.page_size);
    Ok(Json(state.content.user_questions(&UserId::new(user), page).await?))
}

async fn get_draft_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Draft>> {
    let caller = caller(&state, &headers).await?;
    Ok(Json(state.handbook.draft(&caller, ItemId::new(id)).await?))
}

async fn save_draft_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(edit): Json<DraftEdit>,
) -> ApiResult<Json<Draft>> {
    let caller = caller(&state, &headers).await?;
    Ok(Json(state.handbook.save_draft(&caller, ItemId::new(id), edit).await?))
}

async fn publish_draft_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<OrderedItem>> {
    let caller = caller(&state, &headers).await?;
    Ok(Json(state.handbook.publish_draft(&caller, ItemId::new(id)).await?))
}

async fn delete_draft_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    state.handbook.delete_draft(&caller, ItemId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn user_tags_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(user): Path<String>,
) -> ApiResult<Json<Vec<UserTag>>> {
    Ok(Json(state.follows.tags(&UserId::new(user)).await?))
}

/// Tag the caller's own profile; the path user must be the caller.
async fn add_tag_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(user): Path<String>,
    Json(request): Json<TagRequest>,
) -> ApiResult<(StatusCode, Json<UserTag>)> {
    let caller = caller(&state, &headers).await?;
    if caller.user.as_str() != user {
        return Err(CoreError::Authorization(format!(
            "{} may not tag {}",
            caller.user, user
        ))
        .into());
    }
    let tag = state.follows.add_tag(&caller, &request.tag).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn post_moment_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<MomentRequest>,
) -> ApiResult<(StatusCode, Json<Moment>)> {
    let caller = caller(&state, &headers).await?;
    let moment = state
        .moments
        .post(&caller, &request.content, request.image_url, request.quote)
        .await?;
    Ok((StatusCode::CREATED, Json(moment)))
}

async fn moments_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paged<Moment>>> {
    Ok(Json(state.moments.recent(numbered(query, state.config.page_size)).await?))
}

async fn user_moments_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    Path(user): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Paged<Moment>>> {
    let page = numbered(query, state.config.page_size);
    Ok(Json(state.moments.of_user(&UserId::new(user), page).await?))
}

async fn open_chat_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<OpenChatRequest>,
) -> ApiResult<Json<Chat>> {
    let caller = caller(&state, &headers).await?;
    Ok(Json(state.chats.open(&caller, &request.peer).await?))
}

async fn conversations_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ChatSummary>>> {
    let caller = caller(&state, &headers).await?;
    Ok(Json(state.chats.conversations(&caller).await?))
}

async fn chat_messages_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let caller = caller(&state, &headers).await?;
    Ok(Json(state.chats.messages(&caller, ChatId::new(id)).await?))
}

async fn send_chat_message_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(message): Json<Outgoing>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let caller = caller(&state, &headers).await?;
    let sent = state.chats.send(&caller, ChatId::new(id), message).await?;
    Ok((StatusCode::CREATED, Json(sent)))
}

async fn delete_chat_message_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let caller = caller(&state, &headers).await?;
    state.chats.delete_message(&caller, ChatMessageId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Health check endpoint (detailed).
async fn health_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
) -> Json<HealthResponse> {
    let db_healthy = state.store.is_healthy().await;
    let database = state.store.pool_stats().map(|stats| DatabaseHealth {
        connected: db_healthy,
        pool_size: stats.size,
        pool_idle: stats.idle,
        pool_max: stats.max,
    });

    Json(HealthResponse {
        status: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    })
}

/// Liveness endpoint.
///
/// Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness endpoint.
///
/// Returns 200 if the store answers, 503 otherwise.
async fn readiness_handler<S: SocialStore + HealthCheck + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.store.is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            database: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                database: false,
                details: Some("Database connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the service.
pub fn create_router<S: SocialStore + HealthCheck + 'static>(state: ServiceState<S>) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Votes
        .route("/api/votes", post(cast_vote_handler::<S>))
        .route("/api/votes/:kind/:id", get(tally_handler::<S>))
        // Handbook
        .route("/api/handbook", post(insert_item_handler::<S>))
        .route("/api/handbook/categories", get(categories_handler::<S>))
        .route("/api/handbook/categories/:category", get(category_items_handler::<S>))
        .route(
            "/api/handbook/items/:id",
            get(get_item_handler::<S>)
                .patch(edit_item_handler::<S>)
                .delete(delete_item_handler::<S>),
        )
        .route("/api/handbook/items/:id/move", post(move_item_handler::<S>))
        .route("/api/handbook/items/:id/next", get(next_item_handler::<S>))
        .route("/api/handbook/items/:id/prev", get(prev_item_handler::<S>))
        .route(
            "/api/handbook/items/:id/draft",
            get(get_draft_handler::<S>)
                .put(save_draft_handler::<S>)
                .delete(delete_draft_handler::<S>),
        )
        .route("/api/handbook/items/:id/draft/publish", post(publish_draft_handler::<S>))
        // Content
        .route(
            "/api/questions",
            get(recent_questions_handler::<S>).post(post_question_handler::<S>),
        )
        .route("/api/questions/hottest", get(hottest_questions_handler::<S>))
        .route("/api/questions/suggested", get(suggested_questions_handler::<S>))
        .route("/api/topics", get(topics_handler::<S>))
        .route("/api/topics/:topic/questions", get(topic_questions_handler::<S>))
        .route("/api/users/:id/questions", get(user_questions_handler::<S>))
        .route(
            "/api/questions/:id",
            get(get_question_handler::<S>).delete(delete_question_handler::<S>),
        )
        .route(
            "/api/questions/:id/answers",
            get(question_answers_handler::<S>).post(post_answer_handler::<S>),
        )
        .route("/api/questions/:id/thread", get(question_thread_handler::<S>))
        .route("/api/answers/:id", axum::routing::delete(delete_answer_handler::<S>))
        .route("/api/posts", post(post_post_handler::<S>))
        // Comments
        .route(
            "/api/answers/:id/comments",
            get(answer_comments_handler::<S>).post(post_comment_handler::<S>),
        )
        .route("/api/comments/:id", axum::routing::delete(delete_comment_handler::<S>))
        .route("/api/comments/:id/brief", get(brief_replies_handler::<S>))
        .route("/api/comments/:id/replies", get(all_replies_handler::<S>))
        // Follow graph and pairing
        .route(
            "/api/users/:id/follow",
            put(follow_handler::<S>).delete(unfollow_handler::<S>),
        )
        .route("/api/users/:id/followers", get(followers_handler::<S>))
        .route("/api/users/:id/following", get(following_handler::<S>))
        .route("/api/users/:id/pairing", post(recompute_handler::<S>))
        .route("/api/users/:id/matches", get(matches_handler::<S>))
        .route(
            "/api/users/:id/tags",
            get(user_tags_handler::<S>).post(add_tag_handler::<S>),
        )
        // Moments and chats
        .route("/api/moments", get(moments_handler::<S>).post(post_moment_handler::<S>))
        .route("/api/users/:id/moments", get(user_moments_handler::<S>))
        .route("/api/chats", get(conversations_handler::<S>).post(open_chat_handler::<S>))
        .route(
            "/api/chats/:id/messages",
            get(chat_messages_handler::<S>).post(send_chat_message_handler::<S>),
        )
        .route(
            "/api/chat-messages/:id",
            axum::routing::delete(delete_chat_message_handler::<S>),
        )
        // Timeline
        .route("/api/messages/:id/thread", get(message_thread_handler::<S>))
        .route("/api/timeline", get(timeline_handler::<S>))
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::store::InMemorySocialStore;
    use crate::types::{Role, User};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = InMemorySocialStore::new();
        store.add_user(User::new("alice", Role::Student));
        store.add_user(User::new("bob", Role::Teacher));
        store.add_user(User::new("vic", Role::Visitor));
        create_router(ServiceState::new(store, CoreConfig::default()))
    }

    fn json_request(method: &str, uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = app()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_user_header_is_forbidden() {
        let request = json_request("POST", "/api/questions", None, serde_json::json!({"content": "q"}));
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "AUTHORIZATION_ERROR");
    }

    #[tokio::test]
    async fn test_bad_vote_value_is_400() {
        let app = app();
        let request = json_request(
            "POST",
            "/api/questions",
            Some("alice"),
            serde_json::json!({"content": "why?"}),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let question = body_json(response).await;

        let uri = format!("/api/questions/{}/answers", question["id"]);
        let request = json_request("POST", &uri, Some("bob"), serde_json::json!({"content": "because"}));
        let answer = body_json(app.clone().oneshot(request).await.unwrap()).await;

        let request = json_request(
            "POST",
            "/api/votes",
            Some("vic"),
            serde_json::json!({"target": {"kind": "answer", "id": answer["id"]}, "value": 2}),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = json_request(
            "POST",
            "/api/votes",
            Some("vic"),
            serde_json::json!({"target": {"kind": "answer", "id": answer["id"]}, "value": 1}),
        );
        let tally = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(tally["like_cnt"], 1);
    }

    #[tokio::test]
    async fn test_unknown_question_is_404() {
        let response = app()
            .oneshot(Request::get("/api/questions/99").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_chat_is_private_to_participants() {
        let app = app();
        let request = json_request("POST", "/api/chats", Some("alice"), serde_json::json!({"peer": "bob"}));
        let chat = body_json(app.clone().oneshot(request).await.unwrap()).await;

        let uri = format!("/api/chats/{}/messages", chat["id"]);
        let request = json_request("POST", &uri, Some("bob"), serde_json::json!({"content": "hi"}));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["to"], "alice");

        let request = Request::get(&uri)
            .header(USER_HEADER, "vic")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_question_listing_routes() {
        let app = app();
        let request = json_request(
            "POST",
            "/api/questions",
            Some("alice"),
            serde_json::json!({"content": "why?", "topic": "rust"}),
        );
        app.clone().oneshot(request).await.unwrap();

        let response = app
            .clone()
            .oneshot(Request::get("/api/questions/hottest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await[0]["question"]["content"], "why?");

        let topics = body_json(
            app.clone()
                .oneshot(Request::get("/api/topics").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(topics[0]["topic"], "rust");

        let mine = body_json(
            app.oneshot(Request::get("/api/users/alice/questions?page=1").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(mine["total"], 1);
    }
}
