//! Notification collaborator for content events.
//!
//! Delivery is external (mail, push). The core only calls the trait and
//! never lets a delivery failure undo the write that triggered it.

use async_trait::async_trait;

use crate::types::{Answer, Question};

/// Failure reported by a notifier.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receives content events worth telling a user about.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A question received its first answer.
    async fn first_answer(&self, question: &Question, answer: &Answer) -> Result<(), NotifyError>;
}

/// Notifier that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn first_answer(&self, _question: &Question, _answer: &Answer) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Notifier that records events as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn first_answer(&self, question: &Question, answer: &Answer) -> Result<(), NotifyError> {
        tracing::info!(
            question_id = %question.id,
            answer_id = %answer.id,
            recipient = ?question.author.as_ref().map(|u| u.as_str()),
            "First answer notification"
        );
        Ok(())
    }
}

/// In-memory notifier for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    /// `(question, answer)` pairs received.
    pub events: parking_lot::Mutex<Vec<(i64, i64)>>,
    /// When set, every call fails after recording.
    pub fail: bool,
}

impl RecordingNotifier {
    /// A notifier whose calls always fail.
    pub fn failing() -> Self {
        Self {
            events: Default::default(),
            fail: true,
        }
    }

    /// Number of events received.
    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn first_answer(&self, question: &Question, answer: &Answer) -> Result<(), NotifyError> {
        self.events.lock().push((question.id.get(), answer.id.get()));
        if self.fail {
            return Err(NotifyError("mailer unavailable".to_string()));
        }
        Ok(())
    }
}
