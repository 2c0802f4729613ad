pub mod parser;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use parser::parse_quiz;

pub const NO_EXPLANATION: &str = "Нет объяснения";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceLabel {
    A,
    B,
    C,
    D,
}

impl ChoiceLabel {
    pub const ALL: [ChoiceLabel; 4] = [ChoiceLabel::A, ChoiceLabel::B, ChoiceLabel::C, ChoiceLabel::D];

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'a' => Some(ChoiceLabel::A),
            'b' => Some(ChoiceLabel::B),
            'c' => Some(ChoiceLabel::C),
            'd' => Some(ChoiceLabel::D),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            ChoiceLabel::A => 'a',
            ChoiceLabel::B => 'b',
            ChoiceLabel::C => 'c',
            ChoiceLabel::D => 'd',
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for ChoiceLabel {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                ChoiceLabel::from_char(c).ok_or_else(|| QuizError::InvalidLabel(trimmed.to_string()))
            }
            _ => Err(QuizError::InvalidLabel(trimmed.to_string())),
        }
    }
}

impl fmt::Display for ChoiceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Which tenses a generated test should cover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenseType {
    #[default]
    All,
    Present,
    Past,
    Future,
}

impl TenseType {
    pub fn description(self) -> &'static str {
        match self {
            TenseType::All => "все времена английского языка",
            TenseType::Present => {
                "Present Simple, Present Continuous, Present Perfect, Present Perfect Continuous"
            }
            TenseType::Past => "Past Simple, Past Continuous, Past Perfect, Past Perfect Continuous",
            TenseType::Future => {
                "Future Simple, Future Continuous, Future Perfect, Future Perfect Continuous"
            }
        }
    }
}

impl FromStr for TenseType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(TenseType::All),
            "present" => Ok(TenseType::Present),
            "past" => Ok(TenseType::Past),
            "future" => Ok(TenseType::Future),
            _ => Err(()),
        }
    }
}

/// The four answer texts, indexed by label.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Options([String; 4]);

impl Options {
    pub fn new(a: String, b: String, c: String, d: String) -> Self {
        Self([a, b, c, d])
    }

    pub fn get(&self, label: ChoiceLabel) -> &str {
        &self.0[label.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChoiceLabel, &str)> {
        ChoiceLabel::ALL.into_iter().map(move |label| (label, self.get(label)))
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizQuestion {
    /// 1-based position in the test.
    pub number: usize,
    pub text: String,
    pub options: Options,
    pub correct_answer: ChoiceLabel,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Answer {
    pub question_index: usize,
    pub chosen: ChoiceLabel,
    pub correct: ChoiceLabel,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub is_correct: bool,
    pub correct_answer: ChoiceLabel,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizResults {
    pub total_questions: usize,
    pub correct_answers: usize,
    pub score: u32,
    pub answers: Vec<Answer>,
    pub tense: TenseType,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuizError {
    #[error("the test has no question left")]
    NoCurrentQuestion,
    #[error("answer {0:?} is not one of a, b, c, d")]
    InvalidLabel(String),
    #[error("the test is not finished yet")]
    NotFinished,
}

/// One user's test in progress. The session is complete once every
/// question has an answer.
#[derive(Debug, Clone)]
pub struct QuizSession {
    questions: Vec<QuizQuestion>,
    cursor: usize,
    answers: Vec<Answer>,
    tense: TenseType,
}

impl QuizSession {
    pub fn new(questions: Vec<QuizQuestion>, tense: TenseType) -> Self {
        Self {
            questions,
            cursor: 0,
            answers: Vec::new(),
            tense,
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// `None` means every question has been answered.
    pub fn current(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.cursor)
    }

    pub fn is_completed(&self) -> bool {
        self.cursor >= self.questions.len()
    }

    /// Records an answer for the current question. An invalid label leaves
    /// the cursor where it was.
    pub fn submit(&mut self, input: &str) -> Result<SubmitOutcome, QuizError> {
        let question = self.current().ok_or(QuizError::NoCurrentQuestion)?;
        let chosen: ChoiceLabel = input.parse()?;

        let outcome = SubmitOutcome {
            is_correct: chosen == question.correct_answer,
            correct_answer: question.correct_answer,
            explanation: question.explanation.clone(),
        };
        self.answers.push(Answer {
            question_index: self.cursor,
            chosen,
            correct: question.correct_answer,
            is_correct: outcome.is_correct,
        });
        self.cursor += 1;

        Ok(outcome)
    }

    pub fn results(&self) -> Result<QuizResults, QuizError> {
        if !self.is_completed() {
            return Err(QuizError::NotFinished);
        }

        let total = self.questions.len();
        let correct = self.answers.iter().filter(|a| a.is_correct).count();
        let score = if total == 0 {
            0
        } else {
            (correct * 100 / total) as u32
        };

        Ok(QuizResults {
            total_questions: total,
            correct_answers: correct,
            score,
            answers: self.answers.clone(),
            tense: self.tense,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(number: usize, correct: ChoiceLabel) -> QuizQuestion {
        QuizQuestion {
            number,
            text: format!("Question {}", number),
            options: Options::new("one".into(), "two".into(), "three".into(), "four".into()),
            correct_answer: correct,
            explanation: "because".into(),
        }
    }

    fn session(n: usize) -> QuizSession {
        QuizSession::new(
            (1..=n).map(|i| question(i, ChoiceLabel::B)).collect(),
            TenseType::Past,
        )
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!("A".parse::<ChoiceLabel>(), Ok(ChoiceLabel::A));
        assert_eq!(" d ".parse::<ChoiceLabel>(), Ok(ChoiceLabel::D));
        assert!("e".parse::<ChoiceLabel>().is_err());
        assert!("ab".parse::<ChoiceLabel>().is_err());
        assert!("".parse::<ChoiceLabel>().is_err());
    }

    #[test]
    fn invalid_labels_never_move_the_cursor() {
        let mut quiz = session(3);

        for input in ["x", "", "abc", "1"] {
            assert!(matches!(quiz.submit(input), Err(QuizError::InvalidLabel(_))));
        }
        assert_eq!(quiz.current().map(|q| q.number), Some(1));

        quiz.submit("c").unwrap();
        assert_eq!(quiz.current().map(|q| q.number), Some(2));
    }

    #[test]
    fn submit_reports_correctness_and_explanation() {
        let mut quiz = session(2);

        let wrong = quiz.submit("a").unwrap();
        assert!(!wrong.is_correct);
        assert_eq!(wrong.correct_answer, ChoiceLabel::B);
        assert_eq!(wrong.explanation, "because");

        assert!(quiz.submit("B").unwrap().is_correct);
    }

    #[test]
    fn submitting_past_the_end_fails() {
        let mut quiz = session(1);
        quiz.submit("b").unwrap();

        assert!(quiz.current().is_none());
        assert_eq!(quiz.submit("b"), Err(QuizError::NoCurrentQuestion));
    }

    #[test]
    fn results_need_a_finished_session() {
        let mut quiz = session(2);
        quiz.submit("b").unwrap();

        assert_eq!(quiz.results(), Err(QuizError::NotFinished));
    }

    #[test]
    fn score_rounds_down() {
        let mut quiz = session(3);
        quiz.submit("b").unwrap();
        quiz.submit("b").unwrap();
        quiz.submit("a").unwrap();

        let results = quiz.results().unwrap();
        assert_eq!(results.total_questions, 3);
        assert_eq!(results.correct_answers, 2);
        assert_eq!(results.score, 66);
        assert_eq!(results.tense, TenseType::Past);
        assert_eq!(results.answers.len(), 3);
    }

    #[test]
    fn empty_quiz_scores_zero() {
        let quiz = QuizSession::new(Vec::new(), TenseType::All);

        assert_eq!(quiz.results().unwrap().score, 0);
    }

    #[test]
    fn results_serialize_with_lowercase_labels() {
        let mut quiz = session(1);
        quiz.submit("a").unwrap();

        let json = serde_json::to_string(&quiz.results().unwrap()).unwrap();
        assert!(json.contains("\"chosen\":\"a\""));
        assert!(json.contains("\"tense\":\"past\""));
    }
}
