//! In-memory store for testing and single-process use.
//!
//! All state sits behind one `RwLock`; every trait method takes the lock
//! exactly once, so each method is atomic with respect to the others.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{
    ChatStore, ContentStore, FollowStore, MessageStore, MomentStore, RankStore, ReplyStore,
    StoreError, StoreResult, UserStore, VoteStore,
};
use crate::types::{
    Answer, AnswerId, CategoryCount, Chat, ChatId, ChatMessage, ChatMessageId, Comment, CommentId,
    Dependents, Draft, DraftEdit, FollowEdge, ItemId, ItemWrite, MessageId, MessageNode,
    MessageSource, Moment, MomentId, NewAnswer, NewChatMessage, NewComment, NewMoment, NewPost,
    NewQuestion, OrderedItem, Page, Paged, PairScore, Post, PostId, Question, QuestionFilter,
    QuestionId, RankPlan, SourceRecord, Tally, User, UserId, UserTag, Vote, VoteCommit,
    VoteTarget, VoteValue, DEFAULT_CATEGORY,
};

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserId, User>,
    /// Insertion order.
    tags: Vec<UserTag>,
    questions: BTreeMap<QuestionId, Question>,
    answers: BTreeMap<AnswerId, Answer>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
    votes: BTreeMap<(VoteTarget, UserId), VoteValue>,
    items: BTreeMap<ItemId, OrderedItem>,
    drafts: BTreeMap<ItemId, Draft>,
    /// Insertion order; newest last.
    follows: Vec<FollowEdge>,
    pairs: BTreeMap<(UserId, UserId), f64>,
    messages: BTreeMap<MessageId, MessageNode>,
    moments: BTreeMap<MomentId, Moment>,
    chats: BTreeMap<ChatId, Chat>,
    chat_messages: BTreeMap<ChatMessageId, ChatMessage>,
    last_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn tally_mut(&mut self, target: VoteTarget) -> Option<&mut Tally> {
        match target {
            VoteTarget::Answer(id) => self.answers.get_mut(&id).map(|a| &mut a.tally),
            VoteTarget::Comment(id) => self.comments.get_mut(&id).map(|c| &mut c.tally),
        }
    }

    fn category_len(&self, category: &str) -> u32 {
        self.items.values().filter(|i| i.category == category).count() as u32
    }

    fn title_taken(&self, title: Option<&String>, except: Option<ItemId>) -> bool {
        let Some(title) = title else { return false };
        self.items
            .values()
            .any(|i| Some(i.id) != except && i.title.as_ref() == Some(title))
    }

    fn message_id_for(&self, source: MessageSource) -> Option<MessageId> {
        self.messages
            .values()
            .find(|m| m.source == source)
            .map(|m| m.id)
    }

    fn push_message(&mut self, source: MessageSource, reply_to: Option<MessageId>, content: &str) -> MessageNode {
        let message = MessageNode {
            id: MessageId::new(self.next_id()),
            source,
            reply_to,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.insert(message.id, message.clone());
        message
    }
}

/// In-memory social store.
///
/// Uses BTreeMaps for deterministic iteration order. Ids come from one
/// increasing sequence shared by all tables.
#[derive(Debug, Default)]
pub struct InMemorySocialStore {
    state: RwLock<State>,
}

impl InMemorySocialStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user (synchronous convenience for fixtures).
    pub fn add_user(&self, user: User) {
        self.state.write().users.insert(user.id.clone(), user);
    }

    /// Number of ordered items across all categories.
    pub fn num_items(&self) -> usize {
        self.state.read().items.len()
    }

    /// Number of comments.
    pub fn num_comments(&self) -> usize {
        self.state.read().comments.len()
    }
}

#[async_trait]
impl UserStore for InMemorySocialStore {
    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        Ok(self.state.read().users.get(id).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.state.read().users.values().cloned().collect())
    }

    async fn put_user(&self, user: User) -> StoreResult<()> {
        self.add_user(user);
        Ok(())
    }

    async fn add_tag(&self, user: &UserId, tag: &str) -> StoreResult<UserTag> {
        let mut st = self.state.write();
        if !st.users.contains_key(user) {
            return Err(StoreError::not_found("user", user));
        }
        if st.tags.iter().any(|t| &t.user == user && t.tag == tag) {
            return Err(StoreError::Conflict(format!("{} already tagged {}", user, tag)));
        }
        let tag = UserTag {
            user: user.clone(),
            tag: tag.to_string(),
        };
        st.tags.push(tag.clone());
        Ok(tag)
    }

    async fn user_tags(&self, user: &UserId) -> StoreResult<Vec<UserTag>> {
        Ok(self
            .state
            .read()
            .tags
            .iter()
            .filter(|t| &t.user == user)
            .cloned()
            .collect())
    }

    async fn all_tags(&self) -> StoreResult<Vec<UserTag>> {
        Ok(self.state.read().tags.clone())
    }
}

#[async_trait]
impl ContentStore for InMemorySocialStore {
    async fn get_question(&self, id: QuestionId) -> StoreResult<Option<Question>> {
        Ok(self.state.read().questions.get(&id).cloned())
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>> {
        let mut questions: Vec<Question> = self
            .state
            .read()
            .questions
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect();
        questions.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(questions)
    }

    async fn insert_question(&self, new: NewQuestion) -> StoreResult<(Question, MessageNode)> {
        let mut st = self.state.write();
        if !st.users.contains_key(&new.author) {
            return Err(StoreError::not_found("user", &new.author));
        }
        let question = Question {
            id: QuestionId::new(st.next_id()),
            author: Some(new.author),
            description: new.description,
            topic: new.topic,
            content: new.content,
            answer_cnt: 0,
            quote: new.quote,
            updated_at: Utc::now(),
        };
        st.questions.insert(question.id, question.clone());
        let message = st.push_message(MessageSource::Question(question.id), None, &question.content);
        Ok((question, message))
    }

    async fn delete_question(&self, id: QuestionId, dependents: Dependents) -> StoreResult<()> {
        let mut st = self.state.write();
        let question = st
            .questions
            .get(&id)
            .ok_or_else(|| StoreError::not_found("question", id))?;
        if dependents.refuses() && question.answer_cnt > 0 {
            return Err(StoreError::DependencyExists(format!(
                "question {} has {} answers",
                id, question.answer_cnt
            )));
        }
        st.questions.remove(&id);
        for answer in st.answers.values_mut() {
            if answer.question == Some(id) {
                answer.question = None;
            }
        }
        Ok(())
    }

    async fn get_answer(&self, id: AnswerId) -> StoreResult<Option<Answer>> {
        Ok(self.state.read().answers.get(&id).cloned())
    }

    async fn answers_for(&self, question: QuestionId) -> StoreResult<Vec<Answer>> {
        let st = self.state.read();
        let mut answers: Vec<Answer> = st
            .answers
            .values()
            .filter(|a| a.question == Some(question))
            .cloned()
            .collect();
        answers.sort_by(|a, b| {
            b.tally
                .like_cnt
                .cmp(&a.tally.like_cnt)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(answers)
    }

    async fn insert_answer(&self, new: NewAnswer) -> StoreResult<(Answer, MessageNode)> {
        let mut st = self.state.write();
        if !st.users.contains_key(&new.author) {
            return Err(StoreError::not_found("user", &new.author));
        }
        let question = st
            .questions
            .get_mut(&new.question)
            .ok_or_else(|| StoreError::not_found("question", new.question))?;
        question.answer_cnt += 1;
        let answer = Answer {
            id: AnswerId::new(st.next_id()),
            question: Some(new.question),
            author: Some(new.author),
            content: new.content,
            comment_cnt: 0,
            tally: Tally::default(),
            quote: new.quote,
            updated_at: Utc::now(),
        };
        st.answers.insert(answer.id, answer.clone());
        let reply_to = st.message_id_for(MessageSource::Question(new.question));
        let message = st.push_message(MessageSource::Answer(answer.id), reply_to, &answer.content);
        Ok((answer, message))
    }

    async fn delete_answer(&self, id: AnswerId, dependents: Dependents) -> StoreResult<()> {
        let mut st = self.state.write();
        if !st.answers.contains_key(&id) {
            return Err(StoreError::not_found("answer", id));
        }
        if dependents.refuses() && st.comments.values().any(|c| c.answer == Some(id)) {
            return Err(StoreError::DependencyExists(format!("answer {} has comments", id)));
        }
        let answer = st
            .answers
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("answer", id))?;
        if let Some(question) = answer.question.and_then(|q| st.questions.get_mut(&q)) {
            question.answer_cnt = question.answer_cnt.saturating_sub(1);
        }
        for comment in st.comments.values_mut() {
            if comment.answer == Some(id) {
                comment.answer = None;
            }
        }
        st.votes.retain(|(target, _), _| *target != VoteTarget::Answer(id));
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> StoreResult<Option<Post>> {
        Ok(self.state.read().posts.get(&id).cloned())
    }

    async fn insert_post(&self, new: NewPost) -> StoreResult<(Post, MessageNode)> {
        let mut st = self.state.write();
        if !st.users.contains_key(&new.author) {
            return Err(StoreError::not_found("user", &new.author));
        }
        let post = Post {
            id: PostId::new(st.next_id()),
            author: Some(new.author),
            title: new.title,
            content: new.content,
            image_url: new.image_url,
            updated_at: Utc::now(),
        };
        st.posts.insert(post.id, post.clone());
        let message = st.push_message(MessageSource::Post(post.id), None, &post.content);
        Ok((post, message))
    }
}

#[async_trait]
impl VoteStore for InMemorySocialStore {
    async fn get_tally(&self, target: VoteTarget) -> StoreResult<Option<Tally>> {
        let st = self.state.read();
        Ok(match target {
            VoteTarget::Answer(id) => st.answers.get(&id).map(|a| a.tally),
            VoteTarget::Comment(id) => st.comments.get(&id).map(|c| c.tally),
        })
    }

    async fn get_vote(&self, voter: &UserId, target: VoteTarget) -> StoreResult<Option<VoteValue>> {
        Ok(self.state.read().votes.get(&(target, voter.clone())).copied())
    }

    async fn commit_vote(&self, commit: VoteCommit) -> StoreResult<Tally> {
        let mut st = self.state.write();
        if !st.users.contains_key(&commit.voter) {
            return Err(StoreError::not_found("user", &commit.voter));
        }
        let key = (commit.target, commit.voter.clone());
        let current = st.votes.get(&key).copied();
        if current != commit.expected {
            return Err(StoreError::Conflict(format!(
                "vote of {} on {} changed concurrently",
                commit.voter, commit.target
            )));
        }
        let updated = {
            let tally = st
                .tally_mut(commit.target)
                .ok_or_else(|| StoreError::not_found(commit.target.kind(), commit.target.raw_id()))?;
            let updated = tally.apply(commit.delta).ok_or_else(|| {
                StoreError::Conflict(format!("counter underflow on {}", commit.target))
            })?;
            *tally = updated;
            updated
        };
        st.votes.insert(key, commit.value);
        Ok(updated)
    }

    async fn votes_for(&self, target: VoteTarget) -> StoreResult<Vec<Vote>> {
        Ok(self
            .state
            .read()
            .votes
            .iter()
            .filter(|((t, _), _)| *t == target)
            .map(|((t, voter), value)| Vote {
                voter: voter.clone(),
                target: *t,
                value: *value,
            })
            .collect())
    }
}

#[async_trait]
impl RankStore for InMemorySocialStore {
    async fn get_item(&self, id: ItemId) -> StoreResult<Option<OrderedItem>> {
        Ok(self.state.read().items.get(&id).cloned())
    }

    async fn find_item(&self, category: &str, order: u32) -> StoreResult<Option<OrderedItem>> {
        Ok(self
            .state
            .read()
            .items
            .values()
            .find(|i| i.category == category && i.order == order)
            .cloned())
    }

    async fn list_category(&self, category: &str) -> StoreResult<Vec<OrderedItem>> {
        let st = self.state.read();
        let mut items: Vec<OrderedItem> = st
            .items
            .values()
            .filter(|i| i.category == category)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.order);
        Ok(items)
    }

    async fn category_len(&self, category: &str) -> StoreResult<u32> {
        Ok(self.state.read().category_len(category))
    }

    async fn published_categories(&self) -> StoreResult<Vec<CategoryCount>> {
        let st = self.state.read();
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for item in st.items.values() {
            if item.published && item.category != DEFAULT_CATEGORY {
                *counts.entry(item.category.as_str()).or_default() += 1;
            }
        }
        let mut result: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(category, count)| CategoryCount {
                category: category.to_string(),
                count,
            })
            .collect();
        result.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(result)
    }

    async fn apply_rank_plan(&self, plan: RankPlan) -> StoreResult<Option<OrderedItem>> {
        let mut st = self.state.write();

        // Validate everything before the first mutation.
        for guard in &plan.guards {
            let len = st.category_len(&guard.category);
            if len != guard.len {
                return Err(StoreError::Conflict(format!(
                    "category {} changed size ({} -> {})",
                    guard.category, guard.len, len
                )));
            }
        }
        let written = match &plan.write {
            ItemWrite::Insert { content, .. } => {
                if st.title_taken(content.title.as_ref(), None) {
                    return Err(StoreError::Conflict("title already in use".to_string()));
                }
                None
            }
            ItemWrite::Relocate { id, from, edit, .. } => {
                let item = st.items.get(id).ok_or_else(|| StoreError::not_found("item", id))?;
                if item.slot() != *from {
                    return Err(StoreError::Conflict(format!("item {} moved concurrently", id)));
                }
                if st.title_taken(edit.title.as_ref(), Some(*id)) {
                    return Err(StoreError::Conflict("title already in use".to_string()));
                }
                Some(*id)
            }
            ItemWrite::Remove { id, from } => {
                let item = st.items.get(id).ok_or_else(|| StoreError::not_found("item", id))?;
                if item.slot() != *from {
                    return Err(StoreError::Conflict(format!("item {} moved concurrently", id)));
                }
                Some(*id)
            }
        };

        for shift in &plan.shifts {
            for item in st.items.values_mut() {
                if Some(item.id) != written && item.category == shift.category && shift.covers(item.order) {
                    item.order = shift.shifted(item.order);
                }
            }
        }

        let now = Utc::now();
        match plan.write {
            ItemWrite::Insert { slot, owner, content } => {
                let item = OrderedItem {
                    id: ItemId::new(st.next_id()),
                    category: slot.category,
                    order: slot.order,
                    owner: Some(owner),
                    title: content.title,
                    content: content.content,
                    label: content.label,
                    published: content.published,
                    updated_at: now,
                };
                st.drafts.insert(
                    item.id,
                    Draft {
                        item: item.id,
                        owner: item.owner.clone(),
                        title: item.title.clone(),
                        content: item.content.clone(),
                        label: item.label.clone(),
                        pending: false,
                        updated_at: now,
                    },
                );
                st.items.insert(item.id, item.clone());
                Ok(Some(item))
            }
            ItemWrite::Relocate { id, to, edit, .. } => {
                let item = st.items.get_mut(&id).ok_or_else(|| StoreError::not_found("item", id))?;
                item.category = to.category;
                item.order = to.order;
                if let Some(title) = edit.title {
                    item.title = Some(title);
                }
                if let Some(content) = edit.content {
                    item.content = Some(content);
                }
                if let Some(label) = edit.label {
                    item.label = Some(label);
                }
                if let Some(published) = edit.published {
                    item.published = published;
                }
                item.updated_at = now;
                Ok(Some(item.clone()))
            }
            ItemWrite::Remove { id, .. } => {
                st.items.remove(&id);
                st.drafts.remove(&id);
                Ok(None)
            }
        }
    }

    async fn get_draft(&self, item: ItemId) -> StoreResult<Option<Draft>> {
        Ok(self.state.read().drafts.get(&item).cloned())
    }

    async fn save_draft(&self, item: ItemId, edit: DraftEdit) -> StoreResult<Draft> {
        let mut st = self.state.write();
        let draft = st
            .drafts
            .get_mut(&item)
            .ok_or_else(|| StoreError::not_found("draft", item))?;
        if let Some(title) = edit.title {
            draft.title = Some(title);
        }
        if let Some(content) = edit.content {
            draft.content = Some(content);
        }
        if let Some(label) = edit.label {
            draft.label = Some(label);
        }
        draft.pending = true;
        draft.updated_at = Utc::now();
        Ok(draft.clone())
    }

    async fn publish_draft(&self, item: ItemId) -> StoreResult<OrderedItem> {
        let mut st = self.state.write();
        if !st.items.contains_key(&item) {
            return Err(StoreError::not_found("item", item));
        }
        let draft = st
            .drafts
            .get(&item)
            .cloned()
            .ok_or_else(|| StoreError::not_found("draft", item))?;
        if st.title_taken(draft.title.as_ref(), Some(item)) {
            return Err(StoreError::Conflict("title already in use".to_string()));
        }
        let now = Utc::now();
        let published = {
            let target = st
                .items
                .get_mut(&item)
                .ok_or_else(|| StoreError::not_found("item", item))?;
            target.title = draft.title;
            target.content = draft.content;
            target.label = draft.label;
            target.published = true;
            target.updated_at = now;
            target.clone()
        };
        if let Some(draft) = st.drafts.get_mut(&item) {
            draft.pending = false;
            draft.updated_at = now;
        }
        Ok(published)
    }

    async fn delete_draft(&self, item: ItemId) -> StoreResult<()> {
        self.state
            .write()
            .drafts
            .remove(&item)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("draft", item))
    }
}

#[async_trait]
impl ReplyStore for InMemorySocialStore {
    async fn get_comment(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        Ok(self.state.read().comments.get(&id).cloned())
    }

    async fn replies_to(&self, parent: CommentId) -> StoreResult<Vec<Comment>> {
        Ok(self
            .state
            .read()
            .comments
            .values()
            .filter(|c| c.parent == Some(parent))
            .cloned()
            .collect())
    }

    async fn root_comments(&self, answer: AnswerId) -> StoreResult<Vec<Comment>> {
        Ok(self
            .state
            .read()
            .comments
            .values()
            .filter(|c| c.answer == Some(answer) && c.parent.is_none())
            .cloned()
            .collect())
    }

    async fn comment_count(&self, answer: AnswerId) -> StoreResult<usize> {
        Ok(self
            .state
            .read()
            .comments
            .values()
            .filter(|c| c.answer == Some(answer))
            .count())
    }

    async fn insert_comment(&self, new: NewComment) -> StoreResult<Comment> {
        let mut st = self.state.write();
        if !st.users.contains_key(&new.author) {
            return Err(StoreError::not_found("user", &new.author));
        }
        if !st.answers.contains_key(&new.answer) {
            return Err(StoreError::not_found("answer", new.answer));
        }
        if let Some(parent_id) = new.parent {
            let parent = st
                .comments
                .get_mut(&parent_id)
                .ok_or_else(|| StoreError::not_found("comment", parent_id))?;
            parent.reply_cnt += 1;
        }
        if let Some(answer) = st.answers.get_mut(&new.answer) {
            answer.comment_cnt += 1;
        }
        let comment = Comment {
            id: CommentId::new(st.next_id()),
            answer: Some(new.answer),
            parent: new.parent,
            author: Some(new.author),
            content: new.content,
            reply_cnt: 0,
            tally: Tally::default(),
            created_at: Utc::now(),
        };
        st.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn delete_comment(&self, id: CommentId, dependents: Dependents) -> StoreResult<()> {
        let mut st = self.state.write();
        if !st.comments.contains_key(&id) {
            return Err(StoreError::not_found("comment", id));
        }
        if dependents.refuses() && st.comments.values().any(|c| c.parent == Some(id)) {
            return Err(StoreError::DependencyExists(format!("comment {} has replies", id)));
        }
        let comment = st
            .comments
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("comment", id))?;
        for child in st.comments.values_mut() {
            if child.parent == Some(id) {
                child.parent = None;
            }
        }
        if let Some(parent) = comment.parent.and_then(|p| st.comments.get_mut(&p)) {
            parent.reply_cnt = parent.reply_cnt.saturating_sub(1);
        }
        if let Some(answer) = comment.answer.and_then(|a| st.answers.get_mut(&a)) {
            answer.comment_cnt = answer.comment_cnt.saturating_sub(1);
        }
        st.votes.retain(|(target, _), _| *target != VoteTarget::Comment(id));
        Ok(())
    }
}

#[async_trait]
impl FollowStore for InMemorySocialStore {
    async fn insert_follow(&self, follower: &UserId, followee: &UserId) -> StoreResult<FollowEdge> {
        let mut st = self.state.write();
        for user in [follower, followee] {
            if !st.users.contains_key(user) {
                return Err(StoreError::not_found("user", user));
            }
        }
        if st
            .follows
            .iter()
            .any(|e| &e.follower == follower && &e.followee == followee)
        {
            return Err(StoreError::Conflict(format!(
                "{} already follows {}",
                follower, followee
            )));
        }
        let edge = FollowEdge {
            follower: follower.clone(),
            followee: followee.clone(),
            created_at: Utc::now(),
        };
        st.follows.push(edge.clone());
        Ok(edge)
    }

    async fn delete_follow(&self, follower: &UserId, followee: &UserId) -> StoreResult<()> {
        let mut st = self.state.write();
        let before = st.follows.len();
        st.follows
            .retain(|e| !(&e.follower == follower && &e.followee == followee));
        if st.follows.len() == before {
            return Err(StoreError::not_found(
                "follow edge",
                format!("{} -> {}", follower, followee),
            ));
        }
        Ok(())
    }

    async fn following(&self, user: &UserId) -> StoreResult<Vec<FollowEdge>> {
        Ok(self
            .state
            .read()
            .follows
            .iter()
            .rev()
            .filter(|e| &e.follower == user)
            .cloned()
            .collect())
    }

    async fn followers(&self, user: &UserId) -> StoreResult<Vec<FollowEdge>> {
        Ok(self
            .state
            .read()
            .follows
            .iter()
            .rev()
            .filter(|e| &e.followee == user)
            .cloned()
            .collect())
    }

    async fn follow_edges(&self) -> StoreResult<Vec<FollowEdge>> {
        Ok(self.state.read().follows.clone())
    }

    async fn replace_pair_scores(&self, user: &UserId, scores: Vec<PairScore>) -> StoreResult<()> {
        let mut st = self.state.write();
        st.pairs.retain(|(a, b), _| a != user && b != user);
        for score in scores {
            st.pairs.insert((score.user_a, score.user_b), score.degree);
        }
        Ok(())
    }

    async fn pair_scores_involving(&self, user: &UserId) -> StoreResult<Vec<PairScore>> {
        Ok(self
            .state
            .read()
            .pairs
            .iter()
            .filter(|((a, b), _)| a == user || b == user)
            .map(|((a, b), degree)| PairScore {
                user_a: a.clone(),
                user_b: b.clone(),
                degree: *degree,
            })
            .collect())
    }
}

#[async_trait]
impl MessageStore for InMemorySocialStore {
    async fn get_message(&self, id: MessageId) -> StoreResult<Option<MessageNode>> {
        Ok(self.state.read().messages.get(&id).cloned())
    }

    async fn message_for(&self, source: MessageSource) -> StoreResult<Option<MessageNode>> {
        let st = self.state.read();
        Ok(st
            .message_id_for(source)
            .and_then(|id| st.messages.get(&id).cloned()))
    }

    async fn replies_to_message(&self, id: MessageId) -> StoreResult<Vec<MessageNode>> {
        Ok(self
            .state
            .read()
            .messages
            .values()
            .filter(|m| m.reply_to == Some(id))
            .cloned()
            .collect())
    }

    async fn latest_messages(&self, page: Page) -> StoreResult<Vec<MessageNode>> {
        let st = self.state.read();
        Ok(st
            .messages
            .values()
            .rev()
            .skip(page.offset)
            .take(page.count)
            .cloned()
            .collect())
    }

    async fn resolve_source(&self, source: MessageSource) -> StoreResult<Option<SourceRecord>> {
        let st = self.state.read();
        Ok(match source {
            MessageSource::Question(id) => st.questions.get(&id).map(|q| SourceRecord {
                owner: q.author.clone(),
                quote: q.quote.clone(),
            }),
            MessageSource::Answer(id) => st.answers.get(&id).map(|a| SourceRecord {
                owner: a.author.clone(),
                quote: a.quote.clone(),
            }),
            MessageSource::Post(id) => st.posts.get(&id).map(|p| SourceRecord {
                owner: p.author.clone(),
                quote: None,
            }),
        })
    }
}

#[async_trait]
impl MomentStore for InMemorySocialStore {
    async fn insert_moment(&self, new: NewMoment) -> StoreResult<Moment> {
        let mut st = self.state.write();
        if !st.users.contains_key(&new.author) {
            return Err(StoreError::not_found("user", &new.author));
        }
        let moment = Moment {
            id: MomentId::new(st.next_id()),
            author: Some(new.author),
            content: new.content,
            image_url: new.image_url,
            quote: new.quote,
            created_at: Utc::now(),
        };
        st.moments.insert(moment.id, moment.clone());
        Ok(moment)
    }

    async fn moments(&self, author: Option<&UserId>, page: Page) -> StoreResult<Paged<Moment>> {
        let st = self.state.read();
        let matching: Vec<Moment> = st
            .moments
            .values()
            .rev()
            .filter(|m| author.map_or(true, |a| m.author.as_ref() == Some(a)))
            .cloned()
            .collect();
        Ok(Paged {
            total: matching.len(),
            items: page.apply(matching),
        })
    }
}

#[async_trait]
impl ChatStore for InMemorySocialStore {
    async fn open_chat(&self, a: &UserId, b: &UserId) -> StoreResult<Chat> {
        let mut st = self.state.write();
        for user in [a, b] {
            if !st.users.contains_key(user) {
                return Err(StoreError::not_found("user", user));
            }
        }
        if let Some(chat) = st
            .chats
            .values()
            .find(|c| c.has_participant(a) && c.has_participant(b))
        {
            return Ok(chat.clone());
        }
        let chat = Chat {
            id: ChatId::new(st.next_id()),
            user_a: Some(a.clone()),
            user_b: Some(b.clone()),
        };
        st.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, id: ChatId) -> StoreResult<Option<Chat>> {
        Ok(self.state.read().chats.get(&id).cloned())
    }

    async fn chats_of(&self, user: &UserId) -> StoreResult<Vec<(Chat, Option<ChatMessage>)>> {
        let st = self.state.read();
        Ok(st
            .chats
            .values()
            .filter(|c| c.has_participant(user))
            .map(|chat| {
                let last = st
                    .chat_messages
                    .values()
                    .rev()
                    .find(|m| m.chat == chat.id)
                    .cloned();
                (chat.clone(), last)
            })
            .collect())
    }

    async fn insert_chat_message(&self, new: NewChatMessage) -> StoreResult<ChatMessage> {
        let mut st = self.state.write();
        if !st.chats.contains_key(&new.chat) {
            return Err(StoreError::not_found("chat", new.chat));
        }
        let message = ChatMessage {
            id: ChatMessageId::new(st.next_id()),
            chat: new.chat,
            from: Some(new.from),
            to: Some(new.to),
            content: new.content,
            quote: new.quote,
            image_url: new.image_url,
            created_at: Utc::now(),
        };
        st.chat_messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn chat_messages(&self, chat: ChatId) -> StoreResult<Vec<ChatMessage>> {
        Ok(self
            .state
            .read()
            .chat_messages
            .values()
            .rev()
            .filter(|m| m.chat == chat)
            .cloned()
            .collect())
    }

    async fn get_chat_message(&self, id: ChatMessageId) -> StoreResult<Option<ChatMessage>> {
        Ok(self.state.read().chat_messages.get(&id).cloned())
    }

    async fn delete_chat_message(&self, id: ChatMessageId) -> StoreResult<()> {
        self.state
            .write()
            .chat_messages
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("chat message", id))
    }
}
