use std::sync::LazyLock;

use log::warn;
use regex::Regex;

use crate::ai_helper::TextGenerator;
use crate::prompts;

const NO_CORRECTIONS: &str = "no corrections needed";
const NO_MISTAKES: &str = "no mistakes";

static ERRORS_FOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^ERRORS_FOUND\s*:\s*(.*)$").unwrap());
static CORRECTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^CORRECTED\s*:\s*(.*)$").unwrap());

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GrammarCheckResult {
    /// As reported by the model. Not reconciled with `mistakes.len()`.
    pub errors_count: u32,
    pub corrected_text: String,
    pub mistakes: Vec<String>,
    pub original_text: String,
    pub raw_response: String,
}

impl GrammarCheckResult {
    /// A clean result for `original`, used when nothing could be checked.
    pub fn unchecked(original: &str, raw_response: String) -> Self {
        Self {
            errors_count: 0,
            corrected_text: original.to_string(),
            mistakes: Vec::new(),
            original_text: original.to_string(),
            raw_response,
        }
    }

    pub fn has_correction(&self) -> bool {
        self.corrected_text != self.original_text
    }
}

/// Reads the `ERRORS_FOUND` / `CORRECTED` / `MISTAKES` template line by
/// line. Fields that do not parse keep their defaults.
pub fn parse_grammar_check(response: &str, original: &str) -> GrammarCheckResult {
    let mut result = GrammarCheckResult::unchecked(original, response.to_string());

    for line in response.lines().map(str::trim) {
        if let Some(caps) = ERRORS_FOUND.captures(line) {
            if let Ok(count) = caps[1].trim().parse::<u32>() {
                result.errors_count = count;
            }
        } else if let Some(caps) = CORRECTED.captures(line) {
            let corrected = caps[1].trim();
            if !corrected.is_empty() && corrected.to_lowercase() != NO_CORRECTIONS {
                result.corrected_text = corrected.to_string();
            }
        } else if let Some(item) = line.strip_prefix('-').map(str::trim) {
            if is_correction(item) || !(item.is_empty() || is_sentinel(item)) {
                result.mistakes.push(line.to_string());
            }
        }
    }

    result
}

fn is_correction(item: &str) -> bool {
    item.contains("Original:") && item.contains("Correct:")
}

// "- No mistakes found. Great job!"
fn is_sentinel(item: &str) -> bool {
    item.to_lowercase().starts_with(NO_MISTAKES)
}

/// Asks the model to check `user_text`. A failed call yields an unchecked
/// result instead of an error so the dialogue can go on.
pub async fn check_grammar(generator: &dyn TextGenerator, user_text: &str) -> GrammarCheckResult {
    match generator.generate(&prompts::grammar_check(user_text), None).await {
        Ok(response) => parse_grammar_check(&response, user_text),
        Err(err) => {
            warn!("Grammar check skipped: {}", err);
            GrammarCheckResult::unchecked(user_text, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_helper::testing::ScriptedGenerator;

    #[test]
    fn clean_text_keeps_the_original() {
        let response = "ERRORS_FOUND: 0\nCORRECTED: No corrections needed\nMISTAKES:\n- No mistakes found. Great job!";
        let result = parse_grammar_check(response, "I want an apple.");

        assert_eq!(result.errors_count, 0);
        assert_eq!(result.corrected_text, "I want an apple.");
        assert!(result.mistakes.is_empty());
        assert!(!result.has_correction());
        assert_eq!(result.raw_response, response);
    }

    #[test]
    fn mistakes_are_collected_without_corrected_line() {
        let response = "ERRORS_FOUND: 2\nMISTAKES:\n- Original: \"wont\" -> Correct: \"want\" | Explanation: опечатка\n- Original: \"a apple\" -> Correct: \"an apple\" | Explanation: артикль";
        let result = parse_grammar_check(response, "I wont a apple");

        assert_eq!(result.errors_count, 2);
        assert_eq!(result.mistakes.len(), 2);
        assert_eq!(result.corrected_text, "I wont a apple");
        assert!(result.mistakes[0].starts_with("- Original: \"wont\""));
    }

    #[test]
    fn count_is_not_reconciled_with_mistakes() {
        let response = "errors_found: 3\ncorrected: I want an apple.\n- only one listed";
        let result = parse_grammar_check(response, "i want apple");

        assert_eq!(result.errors_count, 3);
        assert_eq!(result.mistakes, vec!["- only one listed".to_string()]);
        assert_eq!(result.corrected_text, "I want an apple.");
        assert!(result.has_correction());
    }

    #[test]
    fn non_numeric_count_is_ignored() {
        let result = parse_grammar_check("ERRORS_FOUND: two\nCORRECTED:\n-\n", "text");

        assert_eq!(result.errors_count, 0);
        assert_eq!(result.corrected_text, "text");
        assert!(result.mistakes.is_empty());
    }

    #[test]
    fn free_form_dash_lines_are_kept_verbatim() {
        let result = parse_grammar_check("ERRORS_FOUND: 1\n  - use past tense here  ", "text");

        assert_eq!(result.mistakes, vec!["- use past tense here".to_string()]);
    }

    #[test]
    fn correction_quoting_no_mistakes_is_kept() {
        let response = "ERRORS_FOUND: 1\nMISTAKES:\n- Original: \"There is no mistakes\" -> Correct: \"There are no mistakes\" | Explanation: число";
        let result = parse_grammar_check(response, "There is no mistakes");

        assert_eq!(result.errors_count, 1);
        assert_eq!(result.mistakes.len(), 1);
        assert!(result.mistakes[0].contains("Correct: \"There are no mistakes\""));
    }

    #[test]
    fn only_the_sentinel_line_is_dropped() {
        let response = "ERRORS_FOUND: 1\n- no mistakes found\n- there were no mistakes in tense, but check the article";
        let result = parse_grammar_check(response, "text");

        assert_eq!(
            result.mistakes,
            vec!["- there were no mistakes in tense, but check the article".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_generation_bypasses_the_parser() {
        let generator = ScriptedGenerator::new().fail("network down");
        let result = check_grammar(&generator, "Hello there").await;

        assert_eq!(result.errors_count, 0);
        assert_eq!(result.corrected_text, "Hello there");
        assert!(result.mistakes.is_empty());
        assert_eq!(result.raw_response, "network down");
    }

    #[tokio::test]
    async fn prompt_contains_the_user_text() {
        let generator = ScriptedGenerator::new().reply("ERRORS_FOUND: 1\n- x");
        let result = check_grammar(&generator, "He go home").await;

        assert_eq!(result.errors_count, 1);
        assert!(generator.prompts()[0].contains("\"He go home\""));
    }
}
