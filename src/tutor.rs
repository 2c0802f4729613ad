//! The three exercises behind one handle shared by all chat handlers.
//!
//! Every generation call is made with no session lock held. Whatever the
//! user did while the call was in flight wins: a reply for a cancelled or
//! replaced request is dropped.

use std::sync::Arc;

use log::{error, info, warn};
use teloxide::types::UserId;

use crate::ai_helper::TextGenerator;
use crate::config::{DEFAULT_MAX_EXCHANGES, DEFAULT_WORD_COUNT};
use crate::dialogue::{check_grammar, DialogueReply, DialogueSession, DialogueStats, Role, APOLOGY};
use crate::error::{TutorError, TutorResult};
use crate::prompts;
use crate::quiz::{parse_quiz, QuizQuestion, QuizResults, QuizSession, SubmitOutcome, TenseType};
use crate::sessions::Sessions;
use crate::storage::{QuizRecord, Storage, VocabularyRecord};
use crate::vocabulary::{parse_vocabulary, VocabularySet};

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub question: QuizQuestion,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuizProgress {
    Next(QuestionView),
    Finished(QuizResults),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerFeedback {
    pub outcome: SubmitOutcome,
    pub progress: QuizProgress,
}

#[derive(Debug, Clone, PartialEq)]
pub struct History {
    pub tests: Vec<QuizRecord>,
    pub vocabulary: Vec<VocabularyRecord>,
}

/// What a cancel actually stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cancelled {
    pub quiz: bool,
    pub vocabulary: bool,
    pub dialogue: Option<DialogueStats>,
}

impl Cancelled {
    pub fn anything(&self) -> bool {
        self.quiz || self.vocabulary || self.dialogue.is_some()
    }
}

pub struct Tutor {
    generator: Arc<dyn TextGenerator>,
    storage: Storage,
    sessions: Arc<Sessions>,
    max_exchanges: u32,
    word_count: usize,
}

impl Tutor {
    pub fn new(generator: Arc<dyn TextGenerator>, storage: Storage, sessions: Arc<Sessions>) -> Self {
        Self {
            generator,
            storage,
            sessions,
            max_exchanges: DEFAULT_MAX_EXCHANGES,
            word_count: DEFAULT_WORD_COUNT,
        }
    }

    pub fn with_limits(mut self, max_exchanges: u32, word_count: usize) -> Self {
        self.max_exchanges = max_exchanges.max(1);
        self.word_count = word_count.max(1);
        self
    }

    pub async fn register_user(
        &self,
        user: UserId,
        username: Option<&str>,
        first_name: &str,
    ) -> TutorResult<()> {
        self.storage.add_user(user, username, first_name).await
    }

    /// Generates a new test, replacing any test the user had, and returns
    /// its first question.
    pub async fn start_quiz(&self, user: UserId, tense: TenseType) -> TutorResult<QuestionView> {
        let quizzes = &self.sessions.quizzes;
        let ticket = quizzes.reserve(user);

        let questions = match self.generate_quiz(tense).await {
            Ok(questions) => questions,
            Err(err) => {
                quizzes.release(user, ticket);
                return Err(err);
            }
        };

        if !quizzes.fulfil(user, ticket, QuizSession::new(questions, tense)) {
            warn!("Dropping test generated for user {} after cancel", user);
            return Err(TutorError::NoActiveSession("test"));
        }

        let first = self
            .current_question(user)
            .ok_or(TutorError::NoActiveSession("test"))?;
        info!("Started {:?} test of {} questions for user {}", tense, first.total, user);
        Ok(first)
    }

    async fn generate_quiz(&self, tense: TenseType) -> TutorResult<Vec<QuizQuestion>> {
        let response = self
            .generator
            .generate(&prompts::grammar_test(tense), None)
            .await?;
        parse_quiz(&response)
    }

    pub fn current_question(&self, user: UserId) -> Option<QuestionView> {
        self.sessions.quizzes.with(user, |quiz| {
            quiz.current().map(|question| QuestionView {
                question: question.clone(),
                total: quiz.len(),
            })
        })?
    }

    /// Records an answer. After the last one the result is saved and the
    /// test is closed.
    pub async fn submit_answer(&self, user: UserId, input: &str) -> TutorResult<AnswerFeedback> {
        let feedback = self
            .sessions
            .quizzes
            .with(user, |quiz| -> TutorResult<AnswerFeedback> {
                let outcome = quiz.submit(input)?;
                let progress = match quiz.current() {
                    Some(next) => QuizProgress::Next(QuestionView {
                        question: next.clone(),
                        total: quiz.len(),
                    }),
                    None => QuizProgress::Finished(quiz.results()?),
                };
                Ok(AnswerFeedback { outcome, progress })
            })
            .ok_or(TutorError::NoActiveSession("test"))??;

        if let QuizProgress::Finished(results) = &feedback.progress {
            self.sessions.quizzes.remove(user);
            info!(
                "User {} finished a test: {}/{}",
                user, results.correct_answers, results.total_questions
            );
            if let Err(err) = self.storage.save_quiz_result(user, results).await {
                error!("Could not save test result for user {}: {}", user, err);
            }
        }

        Ok(feedback)
    }

    /// Opens a role-play, replacing any unfinished one, and returns the
    /// model's opening line.
    pub fn start_dialogue(&self, user: UserId, user_role: Role) -> String {
        let session = DialogueSession::start(user_role, self.max_exchanges);
        let opening = session.opening().to_string();
        self.sessions.dialogues.insert(user, session);

        info!("Started dialogue for user {} as {}", user, user_role);
        opening
    }

    pub fn max_exchanges(&self) -> u32 {
        self.max_exchanges
    }

    /// Checks the user's message, then asks the model for the next line.
    /// Neither a failed check nor a failed reply ends the dialogue.
    pub async fn send_dialogue(&self, user: UserId, text: &str) -> TutorResult<DialogueReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TutorError::Validation("the message is empty".to_string()));
        }
        let dialogues = &self.sessions.dialogues;
        let ticket = dialogues
            .active_ticket(user)
            .ok_or(TutorError::NoActiveSession("dialogue"))?;

        let grammar = check_grammar(self.generator.as_ref(), text).await;

        let (is_finished, prompt, instruction) = dialogues
            .with_ticket(user, ticket, |session| {
                let finished = session.record_user_turn(text, &grammar);
                (finished, session.continuation_prompt(), session.system_instruction())
            })
            .ok_or_else(|| {
                warn!("Dropping message of user {} for a replaced dialogue", user);
                TutorError::NoActiveSession("dialogue")
            })?;

        let response = match self.generator.generate(&prompt, Some(instruction)).await {
            Ok(response) => response.trim().to_string(),
            Err(err) => {
                warn!("Dialogue reply for user {} failed: {}", user, err);
                APOLOGY.to_string()
            }
        };

        let (exchange, max_exchanges) = dialogues
            .with_ticket(user, ticket, |session| {
                session.record_assistant_turn(&response);
                (session.exchange_count(), session.max_exchanges())
            })
            .ok_or_else(|| {
                warn!("Dropping dialogue reply for user {} after cancel", user);
                TutorError::NoActiveSession("dialogue")
            })?;

        let finished = if is_finished {
            dialogues.take(user, ticket)
        } else {
            None
        };
        let stats = match finished {
            Some(session) => Some(self.close_dialogue(user, session).await),
            None => None,
        };

        Ok(DialogueReply {
            response,
            grammar,
            is_finished,
            exchange,
            max_exchanges,
            stats,
        })
    }

    /// Closes the user's dialogue early. `None` if there was none.
    pub async fn end_dialogue(&self, user: UserId) -> Option<DialogueStats> {
        let session = self.sessions.dialogues.remove(user)?;
        Some(self.close_dialogue(user, session).await)
    }

    async fn close_dialogue(&self, user: UserId, session: DialogueSession) -> DialogueStats {
        let stats = session.statistics();

        info!(
            "Dialogue for user {} ended after {} exchanges",
            user, stats.total_exchanges
        );
        if let Err(err) = self.storage.save_dialogue(user, session.turns()).await {
            error!("Could not save dialogue for user {}: {}", user, err);
        }

        stats
    }

    /// Generates a word list on `topic`, saves it and keeps it as the user's
    /// latest set.
    pub async fn generate_vocabulary(&self, user: UserId, topic: &str) -> TutorResult<VocabularySet> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TutorError::Validation("the topic is empty".to_string()));
        }

        let requests = &self.sessions.vocabulary_requests;
        let ticket = requests.reserve(user);
        let generated = self.request_vocabulary(topic).await;

        if !requests.release(user, ticket) {
            warn!("Dropping word list for user {} after cancel", user);
            return Err(TutorError::NoActiveSession("vocabulary request"));
        }
        let set = generated?;

        info!("Generated {} words on {:?} for user {}", set.len(), topic, user);
        if let Err(err) = self.storage.save_vocabulary(user, &set).await {
            error!("Could not save word list for user {}: {}", user, err);
        }
        self.sessions.vocabulary.insert(user, set.clone());

        Ok(set)
    }

    async fn request_vocabulary(&self, topic: &str) -> TutorResult<VocabularySet> {
        let response = self
            .generator
            .generate(&prompts::vocabulary(topic, self.word_count), None)
            .await?;
        parse_vocabulary(&response, topic)
    }

    pub fn last_vocabulary(&self, user: UserId) -> Option<VocabularySet> {
        self.sessions.vocabulary.get(user)
    }

    pub async fn history(&self, user: UserId) -> TutorResult<History> {
        Ok(History {
            tests: self.storage.get_quiz_history(user).await?,
            vocabulary: self.storage.get_vocabulary_history(user).await?,
        })
    }

    /// Stops everything the user has going, including requests still
    /// waiting for the model. A dialogue is saved as it stands.
    pub async fn cancel(&self, user: UserId) -> Cancelled {
        let cancelled = Cancelled {
            quiz: self.sessions.quizzes.cancel(user),
            vocabulary: self.sessions.vocabulary_requests.cancel(user),
            dialogue: self.end_dialogue(user).await,
        };
        if cancelled.anything() {
            info!("User {} cancelled: {:?}", user, cancelled);
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::ai_helper::testing::ScriptedGenerator;
    use crate::ai_helper::GenerationError;
    use crate::dialogue::{BUYER_GREETING, SELLER_GREETING};
    use crate::quiz::ChoiceLabel;

    const USER: UserId = UserId(7);
    const CLEAN: &str = "ERRORS_FOUND: 0\nCORRECTED: No corrections needed\nMISTAKES:\n- No mistakes found. Great job!";

    fn quiz_response(n: usize) -> String {
        (1..=n)
            .map(|i| {
                format!(
                    "ВОПРОС {i}:\nShe ___ to school every day.\na) go\nb) goes\nc) going\nd) gone\nОТВЕТ: b\nОБЪЯСНЕНИЕ: третье лицо\n\n"
                )
            })
            .collect()
    }

    fn vocabulary_response(words: &[&str]) -> String {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| format!("СЛОВО {}:\nАнглийское: {w}\nПеревод: слово\n\n", i + 1))
            .collect()
    }

    async fn setup(generator: ScriptedGenerator) -> (Tutor, Arc<ScriptedGenerator>) {
        let generator = Arc::new(generator);
        let storage = Storage::in_memory().await.unwrap();
        let tutor = Tutor::new(generator.clone(), storage, Arc::new(Sessions::new()));
        (tutor, generator)
    }

    #[tokio::test]
    async fn quiz_runs_to_completion_and_is_saved() {
        let (tutor, _) = setup(ScriptedGenerator::new().reply(quiz_response(3))).await;

        let first = tutor.start_quiz(USER, TenseType::Present).await.unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.question.number, 1);

        let wrong = tutor.submit_answer(USER, "x").await;
        assert!(matches!(wrong, Err(TutorError::Quiz(_))));
        assert_eq!(tutor.current_question(USER).map(|v| v.question.number), Some(1));

        let feedback = tutor.submit_answer(USER, "a").await.unwrap();
        assert!(!feedback.outcome.is_correct);
        assert_eq!(feedback.outcome.correct_answer, ChoiceLabel::B);
        assert!(matches!(feedback.progress, QuizProgress::Next(ref v) if v.question.number == 2));

        tutor.submit_answer(USER, "b").await.unwrap();
        let last = tutor.submit_answer(USER, "B").await.unwrap();
        match last.progress {
            QuizProgress::Finished(results) => assert_eq!(results.score, 66),
            other => panic!("unexpected {:?}", other),
        }

        assert!(tutor.current_question(USER).is_none());
        assert!(matches!(
            tutor.submit_answer(USER, "a").await,
            Err(TutorError::NoActiveSession(_))
        ));
        let history = tutor.history(USER).await.unwrap();
        assert_eq!(history.tests.len(), 1);
        assert_eq!(history.tests[0].score, 66);
    }

    #[tokio::test]
    async fn unusable_quiz_leaves_no_session() {
        let (tutor, _) = setup(ScriptedGenerator::new().reply("I cannot do that.").fail("quota")).await;

        let parse = tutor.start_quiz(USER, TenseType::All).await;
        assert!(matches!(parse, Err(TutorError::ParseInsufficient { .. })));
        assert!(!tutor.sessions.quizzes.is_pending(USER));

        let backend = tutor.start_quiz(USER, TenseType::All).await;
        assert!(matches!(backend, Err(TutorError::Generation(_))));
        assert!(tutor.current_question(USER).is_none());
    }

    #[tokio::test]
    async fn late_quiz_after_cancel_is_discarded() {
        let (tutor, _) = setup(ScriptedGenerator::new()).await;
        let quizzes = &tutor.sessions.quizzes;

        // Simulates the user cancelling while the model is still busy.
        let ticket = quizzes.reserve(USER);
        assert!(tutor.cancel(USER).await.quiz);
        let late = QuizSession::new(parse_quiz(&quiz_response(3)).unwrap(), TenseType::All);

        assert!(!quizzes.fulfil(USER, ticket, late));
        assert!(tutor.current_question(USER).is_none());
    }

    #[tokio::test]
    async fn dialogue_finishes_on_the_last_exchange() {
        let mut script = ScriptedGenerator::new();
        for i in 0..10 {
            script = script.reply(CLEAN).reply(format!("Reply {}", i));
        }
        let (tutor, _) = setup(script).await;

        assert_eq!(tutor.start_dialogue(USER, Role::Buyer), SELLER_GREETING);
        for i in 1..=10 {
            let reply = tutor.send_dialogue(USER, "I want some bread").await.unwrap();
            assert_eq!(reply.exchange, i);
            assert_eq!(reply.is_finished, i == 10);
            assert_eq!(reply.stats.is_some(), i == 10);
        }

        assert!(!tutor.sessions.dialogues.is_active(USER));
        let saved = tutor.storage.dialogue_transcripts(USER).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].len(), 21);
    }

    #[tokio::test]
    async fn early_end_reports_exchanges_so_far() {
        let script = ScriptedGenerator::new()
            .reply("ERRORS_FOUND: 2\nMISTAKES:\n- Original: wants -> Correct: want\n- Original: a apple -> Correct: an apple")
            .reply("Sure.")
            .reply(CLEAN)
            .reply("Anything else?")
            .reply(CLEAN)
            .reply("Bye.");
        let (tutor, _) = setup(script).await;
        tutor.start_dialogue(USER, Role::Seller);

        for text in ["I wants a apple", "Yes", "No"] {
            tutor.send_dialogue(USER, text).await.unwrap();
        }
        let stats = tutor.end_dialogue(USER).await.unwrap();

        assert_eq!(stats.total_exchanges, 3);
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.errors_per_message, 0.7);
        assert_eq!(stats.recent_mistakes.len(), 2);
        assert!(tutor.end_dialogue(USER).await.is_none());
    }

    #[tokio::test]
    async fn failed_checks_and_replies_do_not_stop_the_dialogue() {
        let script = ScriptedGenerator::new().fail("network").fail("quota");
        let (tutor, generator) = setup(script).await;
        tutor.start_dialogue(USER, Role::Seller);

        let reply = tutor.send_dialogue(USER, "We has milk").await.unwrap();

        assert_eq!(reply.grammar.errors_count, 0);
        assert_eq!(reply.grammar.corrected_text, "We has milk");
        assert_eq!(reply.response, APOLOGY);
        assert!(!reply.is_finished);
        assert!(tutor.sessions.dialogues.is_active(USER));

        let prompts = generator.prompts();
        assert!(prompts[1].starts_with("You are a customer"));
        assert!(prompts[1].contains(&format!("Customer: {}\n", BUYER_GREETING)));
    }

    /// Replaces the user's dialogue with a fresh one while the grammar check
    /// is still running, as a second chat of the same user could.
    struct RestartingGenerator {
        sessions: Arc<Sessions>,
    }

    #[async_trait]
    impl TextGenerator for RestartingGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.sessions
                .dialogues
                .insert(USER, DialogueSession::start(Role::Seller, 10));
            Ok(CLEAN.to_string())
        }
    }

    #[tokio::test]
    async fn message_for_a_replaced_dialogue_is_dropped() {
        let sessions = Arc::new(Sessions::new());
        let generator = Arc::new(RestartingGenerator {
            sessions: sessions.clone(),
        });
        let storage = Storage::in_memory().await.unwrap();
        let tutor = Tutor::new(generator, storage, sessions.clone());
        tutor.start_dialogue(USER, Role::Buyer);

        let result = tutor.send_dialogue(USER, "I want some bread").await;

        assert!(matches!(result, Err(TutorError::NoActiveSession("dialogue"))));
        let (turns, exchanges) = sessions
            .dialogues
            .with(USER, |session| (session.turns().len(), session.exchange_count()))
            .unwrap();
        assert_eq!((turns, exchanges), (1, 0));
        assert!(tutor.storage.dialogue_transcripts(USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sending_without_a_dialogue_is_rejected() {
        let (tutor, generator) = setup(ScriptedGenerator::new()).await;

        let result = tutor.send_dialogue(USER, "hello").await;
        assert!(matches!(result, Err(TutorError::NoActiveSession("dialogue"))));
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn vocabulary_is_saved_and_cached() {
        let words = ["bread", "cheese", "apple", "milk"];
        let (tutor, generator) = setup(ScriptedGenerator::new().reply(vocabulary_response(&words))).await;
        let tutor = tutor.with_limits(10, 4);

        let set = tutor.generate_vocabulary(USER, "  food ").await.unwrap();

        assert_eq!(set.topic, "food");
        assert_eq!(set.len(), 4);
        assert_eq!(tutor.last_vocabulary(USER), Some(set.clone()));
        assert!(generator.prompts()[0].contains("Создай список из 4 английских слов"));
        let history = tutor.history(USER).await.unwrap();
        assert_eq!(history.vocabulary[0].entries, set.entries);
    }

    #[tokio::test]
    async fn empty_topic_is_a_validation_error() {
        let (tutor, generator) = setup(ScriptedGenerator::new()).await;

        let result = tutor.generate_vocabulary(USER, "   ").await;
        assert!(matches!(result, Err(TutorError::Validation(_))));
        assert!(generator.prompts().is_empty());
        assert!(tutor.last_vocabulary(USER).is_none());
    }

    #[tokio::test]
    async fn failed_vocabulary_keeps_the_previous_set() {
        let script = ScriptedGenerator::new()
            .reply(vocabulary_response(&["tea", "cup", "spoon"]))
            .fail("quota");
        let (tutor, _) = setup(script).await;

        tutor.generate_vocabulary(USER, "kitchen").await.unwrap();
        assert!(tutor.generate_vocabulary(USER, "garden").await.is_err());

        assert_eq!(tutor.last_vocabulary(USER).map(|s| s.topic), Some("kitchen".to_string()));
        assert!(!tutor.sessions.vocabulary_requests.is_pending(USER));
    }

    #[tokio::test]
    async fn cancel_with_nothing_running_is_harmless() {
        let (tutor, _) = setup(ScriptedGenerator::new()).await;

        let cancelled = tutor.cancel(USER).await;
        assert!(!cancelled.anything());
    }

    #[tokio::test]
    async fn cancel_saves_the_dialogue() {
        let (tutor, _) = setup(ScriptedGenerator::new().reply(CLEAN).reply("Hi")).await;
        tutor.start_dialogue(USER, Role::Buyer);
        tutor.send_dialogue(USER, "Hello").await.unwrap();

        let cancelled = tutor.cancel(USER).await;
        assert_eq!(cancelled.dialogue.map(|s| s.total_exchanges), Some(1));
        assert_eq!(tutor.storage.dialogue_transcripts(USER).await.unwrap()[0].len(), 3);
    }
}
