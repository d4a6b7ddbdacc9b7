//! Questions, answers and posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AnswerId, PostId, QuestionId, UserId};
use super::user::Caller;
use super::vote::Tally;

/// A question opened by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Row id.
    pub id: QuestionId,
    /// Author; `None` once the author account is gone.
    pub author: Option<UserId>,
    /// Short description used as the headline.
    pub description: Option<String>,
    /// Topic bucket.
    pub topic: Option<String>,
    /// Body.
    pub content: String,
    /// Number of live answers.
    pub answer_cnt: u32,
    /// Quoted excerpt attached by the author.
    pub quote: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when opening a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewQuestion {
    /// Author.
    pub author: UserId,
    /// Short description.
    pub description: Option<String>,
    /// Topic bucket.
    pub topic: Option<String>,
    /// Body.
    pub content: String,
    /// Quoted excerpt.
    pub quote: Option<String>,
}

/// An answer to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Row id.
    pub id: AnswerId,
    /// Question answered; `None` once the question is gone.
    pub question: Option<QuestionId>,
    /// Author.
    pub author: Option<UserId>,
    /// Body.
    pub content: String,
    /// Number of comments under the answer.
    pub comment_cnt: u32,
    /// Vote aggregates.
    pub tally: Tally,
    /// Quoted excerpt.
    pub quote: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when answering a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnswer {
    /// Question being answered.
    pub question: QuestionId,
    /// Author.
    pub author: UserId,
    /// Body.
    pub content: String,
    /// Quoted excerpt.
    pub quote: Option<String>,
}

/// A free-form post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Row id.
    pub id: PostId,
    /// Author.
    pub author: Option<UserId>,
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Attached image.
    pub image_url: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when publishing a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    /// Author.
    pub author: UserId,
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Attached image.
    pub image_url: Option<String>,
}

/// Restriction applied when listing questions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFilter {
    /// Only questions by this author.
    pub author: Option<UserId>,
    /// Only questions with this topic.
    pub topic: Option<String>,
}

impl QuestionFilter {
    /// Questions by `author`.
    pub fn by_author(author: UserId) -> Self {
        Self {
            author: Some(author),
            topic: None,
        }
    }

    /// Questions under `topic`.
    pub fn by_topic(topic: impl Into<String>) -> Self {
        Self {
            author: None,
            topic: Some(topic.into()),
        }
    }

    /// Whether `question` passes the filter.
    pub fn matches(&self, question: &Question) -> bool {
        self.author
            .as_ref()
            .map_or(true, |a| question.author.as_ref() == Some(a))
            && self
                .topic
                .as_ref()
                .map_or(true, |t| question.topic.as_ref() == Some(t))
    }
}

/// A question with its most liked answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSummary {
    /// The question.
    pub question: Question,
    /// Most liked answer, most recent on ties.
    pub brief_answer: Option<Answer>,
}

/// A topic with its question count and leading questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    /// Topic name.
    pub topic: String,
    /// Questions under the topic.
    pub count: usize,
    /// Most answered questions of the topic.
    pub questions: Vec<QuestionSummary>,
}

/// How a delete treats rows that still depend on the deleted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dependents {
    /// Refuse the delete while any dependent row exists.
    Refuse,
    /// Delete anyway and detach the dependents.
    Detach,
}

impl Dependents {
    /// Admins may detach dependents; everyone else is refused.
    pub fn for_caller(caller: &Caller) -> Self {
        if caller.role.is_admin() {
            Self::Detach
        } else {
            Self::Refuse
        }
    }

    /// Whether existing dependents block the delete.
    pub fn refuses(self) -> bool {
        self == Self::Refuse
    }
}
