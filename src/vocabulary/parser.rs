use std::sync::LazyLock;

use regex::Regex;

use super::{VocabularyEntry, VocabularySet, NO_TRANSCRIPTION};
use crate::error::{TutorError, TutorResult};
use crate::parsing::{capitalize, excerpt, split_numbered_blocks, Extracted, StrategyChain};

pub const MIN_WORDS: usize = 3;
const STOP_WORDS: [&str; 5] = ["the", "a", "an", "is", "are"];

static WORD_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)СЛОВО\s*\d+\s*:").unwrap());
static WORD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:Английское|English|Word)\s*:\s*(.+)$").unwrap());
static TRANSCRIPTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:Транскрипция|Transcription)\s*:\s*(.+)$").unwrap());
static TRANSLATION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:Перевод|Translation)\s*:\s*(.+)$").unwrap());
static EXAMPLE_EN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Пример EN|Example EN|English example)\s*:\s*(.+)$").unwrap()
});
static EXAMPLE_RU_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Пример RU|Example RU|Russian example)\s*:\s*(.+)$").unwrap()
});

// word [transcription] - translation
static DASH_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+)[ \t]*(\[[^\]\n]+\])?[ \t]*[-–—][ \t]*([^\n]*\S)").unwrap()
});
// 1. word - translation
static NUMBERED_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+[.)][ \t]*(\w+)[ \t]*[-–—][ \t]*([^\n]*\S)").unwrap());

/// Recovers vocabulary entries on `topic` from a model response. The
/// marker-based parse needs [`MIN_WORDS`] entries; otherwise the loose
/// parse is used and any non-empty result is accepted.
pub fn parse_vocabulary(response: &str, topic: &str) -> TutorResult<VocabularySet> {
    let chain = StrategyChain::new(MIN_WORDS)
        .then("vocabulary markers", parse_marked_words)
        .then("vocabulary word pairs", parse_word_pairs);

    let entries = match chain.run(response) {
        Extracted::Accepted { records, .. } => records,
        Extracted::Insufficient { records } => records,
    };
    let set = VocabularySet {
        topic: topic.to_string(),
        entries,
    };

    if set.is_empty() {
        return Err(TutorError::ParseInsufficient {
            what: "vocabulary words",
            excerpt: excerpt(response),
        });
    }
    Ok(set)
}

/// Primary format: `СЛОВО n:` blocks with labelled fields in English or
/// Russian. A block needs at least the word and its translation.
pub(crate) fn parse_marked_words(text: &str) -> Vec<VocabularyEntry> {
    split_numbered_blocks(text, &WORD_MARKER)
        .into_iter()
        .filter_map(parse_block)
        .collect()
}

fn parse_block(block: &str) -> Option<VocabularyEntry> {
    let mut word = None;
    let mut transcription = None;
    let mut translation = None;
    let mut example_en = None;
    let mut example_ru = None;

    for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields = [
            (&*WORD_LINE, &mut word),
            (&*TRANSCRIPTION_LINE, &mut transcription),
            (&*TRANSLATION_LINE, &mut translation),
            (&*EXAMPLE_EN_LINE, &mut example_en),
            (&*EXAMPLE_RU_LINE, &mut example_ru),
        ];
        for (pattern, slot) in fields {
            if let Some(caps) = pattern.captures(line) {
                *slot = Some(caps[1].trim().to_string());
                break;
            }
        }
    }

    let word = word.filter(|w| !w.is_empty())?;
    let translation = translation.filter(|t| !t.is_empty())?;

    Some(VocabularyEntry {
        example_en: example_en.unwrap_or_else(|| format!("Example with {}.", word)),
        transcription: transcription.unwrap_or_else(|| NO_TRANSCRIPTION.to_string()),
        example_ru: example_ru.unwrap_or_default(),
        word,
        translation,
    })
}

/// Loose format: `word [transcription] - translation` pairs anywhere in the
/// text, topped up with `n. word - translation` list items when that finds
/// fewer than [`MIN_WORDS`].
pub(crate) fn parse_word_pairs(text: &str) -> Vec<VocabularyEntry> {
    let mut entries: Vec<VocabularyEntry> = DASH_PAIR
        .captures_iter(text)
        .filter(|caps| !is_stop_word(&caps[1]))
        .map(|caps| {
            pair_entry(
                &caps[1],
                caps.get(2).map(|m| m.as_str()),
                &caps[3],
            )
        })
        .collect();

    if entries.len() < MIN_WORDS {
        for caps in NUMBERED_PAIR.captures_iter(text) {
            let word = &caps[1];
            let known = entries.iter().any(|e| e.word.to_lowercase() == word.to_lowercase());
            if word.chars().count() > 1 && !known {
                entries.push(pair_entry(word, None, &caps[2]));
            }
        }
    }

    entries
}

fn is_stop_word(word: &str) -> bool {
    word.chars().count() < 2 || STOP_WORDS.contains(&word.to_lowercase().as_str())
}

fn pair_entry(word: &str, transcription: Option<&str>, translation: &str) -> VocabularyEntry {
    VocabularyEntry {
        word: word.to_string(),
        transcription: transcription.unwrap_or(NO_TRANSCRIPTION).to_string(),
        translation: translation.trim().to_string(),
        example_en: format!("{} is a useful word.", capitalize(word)),
        example_ru: String::new(),
    }
}
