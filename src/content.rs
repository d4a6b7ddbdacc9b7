//! Question, answer and post flows.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::notify::{NoopNotifier, Notifier};
use crate::store::{ContentStore, UserStore};
use crate::types::{
    Answer, AnswerId, Caller, Dependents, NewAnswer, NewPost, NewQuestion, Page, Paged, Post,
    Question, QuestionFilter, QuestionId, QuestionSummary, TopicSummary, UserId,
};

/// Questions shown under each topic of [`ContentBoard::topics`].
pub const TOPIC_LEAD: usize = 6;

/// Publishing and removal of top-level content.
///
/// Every write goes through the store together with the timeline message
/// it creates, so content without a message is never observable.
pub struct ContentBoard<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S> Clone for ContentBoard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

fn require_author(caller: &Caller, what: &str) -> CoreResult<()> {
    if caller.role.can_author() {
        Ok(())
    } else {
        Err(CoreError::Authorization(format!(
            "{} accounts cannot {what}",
            caller.role
        )))
    }
}

fn non_empty(field: &str, value: &str) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

impl<S: ContentStore> ContentBoard<S> {
    /// Create a board that drops notifications.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_notifier(store, Arc::new(NoopNotifier))
    }

    /// Create a board with a notification collaborator.
    pub fn with_notifier(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Open a question. Its message roots a new thread.
    pub async fn post_question(&self, caller: &Caller, mut new: NewQuestion) -> CoreResult<Question> {
        require_author(caller, "ask questions")?;
        new.content = non_empty("question", &new.content)?;
        new.author = caller.user.clone();
        let (question, message) = self.store.insert_question(new).await?;
        tracing::info!(
            question_id = %question.id,
            message_id = %message.id,
            author = %caller.user,
            "Question posted"
        );
        Ok(question)
    }

    /// Answer a question.
    ///
    /// The first answer of a question triggers a notification. Delivery
    /// runs detached; its failure is logged and the answer stays.
    pub async fn post_answer(
        &self,
        caller: &Caller,
        question: QuestionId,
        content: &str,
        quote: Option<String>,
    ) -> CoreResult<Answer> {
        require_author(caller, "answer")?;
        let content = non_empty("answer", content)?;
        let (answer, message) = self
            .store
            .insert_answer(NewAnswer {
                question,
                author: caller.user.clone(),
                content,
                quote,
            })
            .await?;
        tracing::info!(
            answer_id = %answer.id,
            question_id = %question,
            message_id = %message.id,
            author = %caller.user,
            "Answer posted"
        );

        if let Some(q) = self.store.get_question(question).await? {
            if q.answer_cnt == 1 {
                self.notify_first_answer(q, answer.clone());
            }
        }
        Ok(answer)
    }

    fn notify_first_answer(&self, question: Question, answer: Answer) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.first_answer(&question, &answer).await {
                tracing::warn!(
                    question_id = %question.id,
                    answer_id = %answer.id,
                    error = %e,
                    "First answer notification failed"
                );
            }
        });
    }

    /// Publish a post on the timeline.
    pub async fn post_post(&self, caller: &Caller, mut new: NewPost) -> CoreResult<Post> {
        require_author(caller, "publish posts")?;
        new.content = non_empty("post", &new.content)?;
        new.title = new.title.trim().to_string();
        new.author = caller.user.clone();
        let (post, message) = self.store.insert_post(new).await?;
        tracing::info!(post_id = %post.id, message_id = %message.id, author = %caller.user, "Post published");
        Ok(post)
    }

    /// Fetch a question.
    pub async fn question(&self, id: QuestionId) -> CoreResult<Question> {
        self.store
            .get_question(id)
            .await?
            .ok_or_else(|| CoreError::not_found("question", id))
    }

    /// Answers of a question, most liked first, then most recent.
    pub async fn question_answers(&self, id: QuestionId) -> CoreResult<Vec<Answer>> {
        self.question(id).await?;
        Ok(self.store.answers_for(id).await?)
    }

    /// Delete a question. Its author or an admin may delete it; only an
    /// admin may delete one that still has answers.
    pub async fn delete_question(&self, caller: &Caller, id: QuestionId) -> CoreResult<()> {
        let question = self.question(id).await?;
        if !caller.owns_or_admin(question.author.as_ref()) {
            return Err(CoreError::Authorization(format!(
                "{} may not delete question {}",
                caller.user, id
            )));
        }
        if let Err(e) = self
            .store
            .delete_question(id, Dependents::for_caller(caller))
            .await
        {
            let e = CoreError::from(e);
            if matches!(e, CoreError::DependencyExists(_)) {
                tracing::warn!(question_id = %id, caller = %caller.user, "Delete blocked by answers");
            }
            return Err(e);
        }
        tracing::info!(question_id = %id, caller = %caller.user, "Question deleted");
        Ok(())
    }

    /// Delete an answer. Its author or an admin may delete it; only an
    /// admin may delete one that still has comments.
    pub async fn delete_answer(&self, caller: &Caller, id: AnswerId) -> CoreResult<()> {
        let answer = self
            .store
            .get_answer(id)
            .await?
            .ok_or_else(|| CoreError::not_found("answer", id))?;
        if !caller.owns_or_admin(answer.author.as_ref()) {
            return Err(CoreError::Authorization(format!(
                "{} may not delete answer {}",
                caller.user, id
            )));
        }
        if let Err(e) = self
            .store
            .delete_answer(id, Dependents::for_caller(caller))
            .await
        {
            let e = CoreError::from(e);
            if matches!(e, CoreError::DependencyExists(_)) {
                tracing::warn!(answer_id = %id, caller = %caller.user, "Delete blocked by comments");
            }
            return Err(e);
        }
        tracing::info!(answer_id = %id, caller = %caller.user, "Answer deleted");
        Ok(())
    }
}

impl<S: ContentStore + UserStore> ContentBoard<S> {
    /// Questions, most recently updated first.
    pub async fn recent_questions(&self, page: Page) -> CoreResult<Paged<QuestionSummary>> {
        let questions = self.store.list_questions(&QuestionFilter::default()).await?;
        let total = questions.len();
        let items = self.summarize(page.apply(questions)).await?;
        Ok(Paged { total, items })
    }

    /// The `k` questions with the most answers.
    pub async fn hottest_questions(&self, k: usize) -> CoreResult<Vec<QuestionSummary>> {
        let mut questions = self.store.list_questions(&QuestionFilter::default()).await?;
        // Stable: ties keep the most recently updated first.
        questions.sort_by(|a, b| b.answer_cnt.cmp(&a.answer_cnt));
        questions.truncate(k);
        self.summarize(questions).await
    }

    /// The `k` questions whose answers collected the most likes.
    pub async fn suggested_questions(&self, k: usize) -> CoreResult<Vec<QuestionSummary>> {
        let questions = self.store.list_questions(&QuestionFilter::default()).await?;
        let mut scored = Vec::with_capacity(questions.len());
        for question in questions {
            let answers = self.store.answers_for(question.id).await?;
            let likes: u64 = answers.iter().map(|a| u64::from(a.tally.like_cnt)).sum();
            scored.push((likes, question));
        }
        scored.sort_by(|(x, _), (y, _)| y.cmp(x));
        let questions = scored.into_iter().take(k).map(|(_, q)| q).collect();
        self.summarize(questions).await
    }

    /// Questions under `topic`, most recently updated first.
    pub async fn questions_by_topic(&self, topic: &str) -> CoreResult<Vec<QuestionSummary>> {
        let questions = self.store.list_questions(&QuestionFilter::by_topic(topic)).await?;
        self.summarize(questions).await
    }

    /// Questions asked by `user`, most recently updated first.
    pub async fn user_questions(&self, user: &UserId, page: Page) -> CoreResult<Paged<QuestionSummary>> {
        if self.store.get_user(user).await?.is_none() {
            return Err(CoreError::not_found("user", user));
        }
        let questions = self
            .store
            .list_questions(&QuestionFilter::by_author(user.clone()))
            .await?;
        let total = questions.len();
        let items = self.summarize(page.apply(questions)).await?;
        Ok(Paged { total, items })
    }

    /// Topics with at least one question, largest first, each with its
    /// most answered questions.
    pub async fn topics(&self) -> CoreResult<Vec<TopicSummary>> {
        let questions = self.store.list_questions(&QuestionFilter::default()).await?;
        let mut grouped: Vec<(String, Vec<Question>)> = Vec::new();
        for question in questions {
            let Some(topic) = question.topic.clone().filter(|t| !t.trim().is_empty()) else {
                continue;
            };
            match grouped.iter_mut().find(|(t, _)| *t == topic) {
                Some((_, list)) => list.push(question),
                None => grouped.push((topic, vec![question])),
            }
        }
        grouped.sort_by(|(ta, a), (tb, b)| b.len().cmp(&a.len()).then_with(|| ta.cmp(tb)));

        let mut topics = Vec::with_capacity(grouped.len());
        for (topic, mut list) in grouped {
            let count = list.len();
            list.sort_by(|a, b| b.answer_cnt.cmp(&a.answer_cnt));
            list.truncate(TOPIC_LEAD);
            topics.push(TopicSummary {
                topic,
                count,
                questions: self.summarize(list).await?,
            });
        }
        Ok(topics)
    }

    async fn summarize(&self, questions: Vec<Question>) -> CoreResult<Vec<QuestionSummary>> {
        let mut out = Vec::with_capacity(questions.len());
        for question in questions {
            let brief_answer = self.store.answers_for(question.id).await?.into_iter().next();
            out.push(QuestionSummary {
                question,
                brief_answer,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::notify::RecordingNotifier;
    use crate::ledger::VoteLedger;
    use crate::store::{InMemorySocialStore, MessageStore, ReplyStore};
    use crate::types::{MessageSource, NewComment, Role, User, VoteTarget};
    use std::time::Duration;

    fn store() -> Arc<InMemorySocialStore> {
        let store = Arc::new(InMemorySocialStore::new());
        store.add_user(User::new("alice", Role::Student));
        store.add_user(User::new("bob", Role::Teacher));
        store.add_user(User::new("vic", Role::Visitor));
        store
    }

    fn ask(content: &str) -> NewQuestion {
        NewQuestion {
            content: content.into(),
            ..Default::default()
        }
    }

    async fn wait_for(notifier: &RecordingNotifier, n: usize) {
        for _ in 0..50 {
            if notifier.count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_visitor_cannot_ask() {
        let board = ContentBoard::new(store());
        let err = board
            .post_question(&Caller::new("vic", Role::Visitor), ask("why?"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationError);

        let err = board
            .post_question(&Caller::new("alice", Role::Student), ask("   "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_question_author_is_caller() {
        let store = store();
        let board = ContentBoard::new(Arc::clone(&store));
        let mut new = ask("why?");
        new.author = UserId::new("bob");
        let q = board
            .post_question(&Caller::new("alice", Role::Student), new)
            .await
            .unwrap();
        assert_eq!(q.author, Some(UserId::new("alice")));
        assert!(store
            .message_for(MessageSource::Question(q.id))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_first_answer_notifies_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let board = ContentBoard::with_notifier(store(), notifier.clone());
        let alice = Caller::new("alice", Role::Student);
        let bob = Caller::new("bob", Role::Teacher);

        let q = board.post_question(&alice, ask("why?")).await.unwrap();
        let first = board.post_answer(&bob, q.id, "because", None).await.unwrap();
        board.post_answer(&alice, q.id, "also", None).await.unwrap();
        wait_for(&notifier, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*notifier.events.lock(), vec![(q.id.get(), first.id.get())]);
        assert_eq!(board.question(q.id).await.unwrap().answer_cnt, 2);
    }

    #[tokio::test]
    async fn test_failed_notification_keeps_answer() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let board = ContentBoard::with_notifier(store(), notifier.clone());
        let q = board
            .post_question(&Caller::new("alice", Role::Student), ask("why?"))
            .await
            .unwrap();
        let answer = board
            .post_answer(&Caller::new("bob", Role::Teacher), q.id, "because", None)
            .await
            .unwrap();
        wait_for(&notifier, 1).await;

        assert_eq!(notifier.count(), 1);
        let answers = board.question_answers(q.id).await.unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].id, answer.id);
    }

    #[tokio::test]
    async fn test_delete_question_with_answers() {
        let board = ContentBoard::new(store());
        let alice = Caller::new("alice", Role::Student);
        let q = board.post_question(&alice, ask("why?")).await.unwrap();
        board
            .post_answer(&Caller::new("bob", Role::Teacher), q.id, "because", None)
            .await
            .unwrap();

        let err = board
            .delete_question(&Caller::new("bob", Role::Teacher), q.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationError);

        let err = board.delete_question(&alice, q.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyExists);

        board
            .delete_question(&Caller::new("root", Role::Admin), q.id)
            .await
            .unwrap();
        let err = board.question(q.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_answer_with_comments() {
        let store = store();
        let board = ContentBoard::new(Arc::clone(&store));
        let bob = Caller::new("bob", Role::Teacher);
        let q = board
            .post_question(&Caller::new("alice", Role::Student), ask("why?"))
            .await
            .unwrap();
        let answer = board.post_answer(&bob, q.id, "because", None).await.unwrap();
        store
            .insert_comment(NewComment {
                answer: answer.id,
                parent: None,
                author: UserId::new("alice"),
                content: "thanks".into(),
            })
            .await
            .unwrap();

        let err = board.delete_answer(&bob, answer.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DependencyExists);

        board
            .delete_answer(&Caller::new("root", Role::Admin), answer.id)
            .await
            .unwrap();
        assert_eq!(board.question(q.id).await.unwrap().answer_cnt, 0);
    }

    fn topical(content: &str, topic: &str) -> NewQuestion {
        NewQuestion {
            content: content.into(),
            topic: Some(topic.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_question_listings() {
        let store = store();
        let board = ContentBoard::new(Arc::clone(&store));
        let alice = Caller::new("alice", Role::Student);
        let bob = Caller::new("bob", Role::Teacher);

        let q1 = board.post_question(&alice, topical("lifetimes?", "rust")).await.unwrap();
        let q2 = board.post_question(&bob, topical("traits?", "rust")).await.unwrap();
        let q3 = board.post_question(&alice, topical("joins?", "sql")).await.unwrap();
        board.post_question(&bob, ask("untopical")).await.unwrap();
        board.post_answer(&bob, q1.id, "elision", None).await.unwrap();
        board.post_answer(&alice, q1.id, "variance", None).await.unwrap();
        let liked = board.post_answer(&bob, q3.id, "hash join", None).await.unwrap();
        VoteLedger::new(Arc::clone(&store))
            .cast_vote(&alice, VoteTarget::Answer(liked.id), 1)
            .await
            .unwrap();

        let recent = board.recent_questions(Page::new(0, 2)).await.unwrap();
        assert_eq!(recent.total, 4);
        assert_eq!(recent.items.len(), 2);

        let hottest = board.hottest_questions(1).await.unwrap();
        assert_eq!(hottest[0].question.id, q1.id);
        assert!(hottest[0].brief_answer.is_some());

        let suggested = board.suggested_questions(1).await.unwrap();
        assert_eq!(suggested[0].question.id, q3.id);
        assert_eq!(suggested[0].brief_answer.as_ref().map(|a| a.id), Some(liked.id));

        let rust: Vec<QuestionId> = board
            .questions_by_topic("rust")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.question.id)
            .collect();
        assert_eq!(rust.len(), 2);
        assert!(rust.contains(&q1.id) && rust.contains(&q2.id));

        let mine = board.user_questions(&UserId::new("alice"), Page::new(0, 10)).await.unwrap();
        assert_eq!(mine.total, 2);
        let err = board
            .user_questions(&UserId::new("nobody"), Page::new(0, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let topics = board.topics().await.unwrap();
        let names: Vec<(&str, usize)> = topics.iter().map(|t| (t.topic.as_str(), t.count)).collect();
        assert_eq!(names, vec![("rust", 2), ("sql", 1)]);
        assert_eq!(topics[0].questions[0].question.id, q1.id);
    }
}
