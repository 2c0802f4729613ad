use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{ChoiceLabel, Options, QuizQuestion, NO_EXPLANATION};
use crate::error::{TutorError, TutorResult};
use crate::parsing::{excerpt, split_numbered_blocks, truncate_chars, Extracted, StrategyChain};

pub const MIN_QUESTIONS: usize = 3;
const FALLBACK_EXPLANATION_CHARS: usize = 200;

static QUESTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ВОПРОС\s*\d+\s*:").unwrap());
static OPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^([a-d])\s*[).]\s*(.+)$").unwrap());
static ANSWER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^ОТВЕТ\s*:\s*([a-d])").unwrap());
static EXPLANATION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^ОБЪЯСНЕНИЕ\s*:\s*(.*)$").unwrap());

// A question line followed by four option lines a) .. d).
static QUESTION_WITH_OPTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*([^\n]*\S)[ \t]*\n[ \t]*a[ \t]*[).][ \t]*([^\n]*\S)[ \t]*\n[ \t]*b[ \t]*[).][ \t]*([^\n]*\S)[ \t]*\n[ \t]*c[ \t]*[).][ \t]*([^\n]*\S)[ \t]*\n[ \t]*d[ \t]*[).][ \t]*([^\n]*\S)",
    )
    .unwrap()
});
static LOOSE_ANSWER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:ОТВЕТ|Answer|Correct)\s*:?\s*\(?([a-d])\b").unwrap());
static LOOSE_EXPLANATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:ОБЪЯСНЕНИЕ|Explanation)\s*:?\s*").unwrap());
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s*").unwrap());
static LEADING_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^ВОПРОС\s*\d*\s*:?\s*").unwrap());

/// Recovers a test from a model response. At least [`MIN_QUESTIONS`] valid
/// questions are required, from either the marker-based or the loose parse.
pub fn parse_quiz(response: &str) -> TutorResult<Vec<QuizQuestion>> {
    let chain = StrategyChain::new(MIN_QUESTIONS)
        .then("quiz markers", parse_marked_questions)
        .then("quiz option blocks", parse_option_blocks);

    match chain.run(response) {
        Extracted::Accepted { records, .. } => Ok(records),
        Extracted::Insufficient { .. } => Err(TutorError::ParseInsufficient {
            what: "test questions",
            excerpt: excerpt(response),
        }),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Question,
    Answer,
    Explanation,
}

/// Primary format: `ВОПРОС n:` blocks with labelled options, `ОТВЕТ:` and
/// `ОБЪЯСНЕНИЕ:` lines. Incomplete blocks are skipped.
pub(crate) fn parse_marked_questions(text: &str) -> Vec<QuizQuestion> {
    split_numbered_blocks(text, &QUESTION_MARKER)
        .into_iter()
        .filter_map(parse_block)
        .enumerate()
        .map(|(i, question)| QuizQuestion {
            number: i + 1,
            ..question
        })
        .collect()
}

fn parse_block(block: &str) -> Option<QuizQuestion> {
    let mut text = String::new();
    let mut options: [Option<String>; 4] = Default::default();
    let mut correct_answer = None;
    let mut explanation = String::new();
    let mut section = Section::Question;

    for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = OPTION_LINE.captures(line) {
            if let Some(label) = label_of(&caps) {
                options[label as usize] = Some(caps[2].trim().to_string());
            }
            continue;
        }
        if let Some(caps) = ANSWER_LINE.captures(line) {
            correct_answer = label_of(&caps);
            section = Section::Answer;
            continue;
        }
        if let Some(caps) = EXPLANATION_LINE.captures(line) {
            explanation = caps[1].trim().to_string();
            section = Section::Explanation;
            continue;
        }

        match section {
            Section::Question if options.iter().all(Option::is_none) => append(&mut text, line),
            Section::Explanation => append(&mut explanation, line),
            _ => {}
        }
    }

    let [Some(a), Some(b), Some(c), Some(d)] = options else {
        return None;
    };
    if text.is_empty() {
        return None;
    }

    Some(QuizQuestion {
        number: 0,
        text,
        options: Options::new(a, b, c, d),
        correct_answer: correct_answer?,
        explanation: if explanation.is_empty() {
            NO_EXPLANATION.to_string()
        } else {
            explanation
        },
    })
}

/// Loose format: any line followed by four `a)`..`d)` lines. The answer and
/// explanation are looked up between the block and the next one; a missing
/// answer defaults to `a`.
pub(crate) fn parse_option_blocks(text: &str) -> Vec<QuizQuestion> {
    let blocks: Vec<Captures> = QUESTION_WITH_OPTIONS.captures_iter(text).collect();
    let mut questions = Vec::new();

    for (i, caps) in blocks.iter().enumerate() {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let window_end = blocks
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |next| next.start());
        let window = &text[whole.end()..window_end];

        let question_text = strip_question_prefix(&caps[1]);
        if question_text.is_empty() {
            continue;
        }

        let correct_answer = LOOSE_ANSWER
            .captures(window)
            .and_then(|answer| label_of(&answer))
            .unwrap_or(ChoiceLabel::A);

        questions.push(QuizQuestion {
            number: questions.len() + 1,
            text: question_text,
            options: Options::new(
                caps[2].trim().to_string(),
                caps[3].trim().to_string(),
                caps[4].trim().to_string(),
                caps[5].trim().to_string(),
            ),
            correct_answer,
            explanation: loose_explanation(window).unwrap_or_else(|| NO_EXPLANATION.to_string()),
        });
    }

    questions
}

fn loose_explanation(window: &str) -> Option<String> {
    let marker = LOOSE_EXPLANATION.find(window)?;
    let rest = &window[marker.end()..];
    let rest = match QUESTION_MARKER.find(rest) {
        Some(next) => &rest[..next.start()],
        None => rest,
    };
    let explanation = truncate_chars(rest.trim(), FALLBACK_EXPLANATION_CHARS);
    (!explanation.is_empty()).then_some(explanation)
}

fn strip_question_prefix(line: &str) -> String {
    let line = LEADING_NUMBER.replace(line.trim(), "");
    LEADING_MARKER.replace(&line, "").trim().to_string()
}

fn label_of(caps: &Captures) -> Option<ChoiceLabel> {
    caps.get(1)
        .and_then(|m| m.as_str().chars().next())
        .and_then(ChoiceLabel::from_char)
}

fn append(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(line);
}
