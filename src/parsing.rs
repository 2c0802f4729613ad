//! Building blocks shared by the response parsers.
//!
//! Every parser is a pure `&str -> Vec<T>` function. A [`StrategyChain`]
//! runs them from the strictest to the loosest and keeps the first result
//! that is large enough.

use log::debug;
use regex::Regex;

const EXCERPT_CHARS: usize = 300;

/// A named extraction attempt.
pub struct Strategy<T> {
    pub name: &'static str,
    pub extract: fn(&str) -> Vec<T>,
}

#[derive(Debug, PartialEq)]
pub enum Extracted<T> {
    Accepted {
        records: Vec<T>,
        strategy: &'static str,
    },
    /// No strategy reached the minimum; holds what the last one found.
    Insufficient { records: Vec<T> },
}

pub struct StrategyChain<T> {
    minimum: usize,
    strategies: Vec<Strategy<T>>,
}

impl<T> StrategyChain<T> {
    pub fn new(minimum: usize) -> Self {
        Self {
            minimum,
            strategies: Vec::new(),
        }
    }

    pub fn then(mut self, name: &'static str, extract: fn(&str) -> Vec<T>) -> Self {
        self.strategies.push(Strategy { name, extract });
        self
    }

    pub fn run(&self, text: &str) -> Extracted<T> {
        let text = normalize(text);
        let mut last = Vec::new();

        for strategy in &self.strategies {
            let records = (strategy.extract)(&text);
            debug!(
                "Strategy {:?} recovered {} record(s), {} required",
                strategy.name,
                records.len(),
                self.minimum
            );
            if records.len() >= self.minimum {
                return Extracted::Accepted {
                    records,
                    strategy: strategy.name,
                };
            }
            last = records;
        }

        Extracted::Insufficient { records: last }
    }
}

pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Beginning of a model response, for error messages.
pub fn excerpt(text: &str) -> String {
    let head: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", head)
}

/// Splits `text` on `<marker> <n>:` headers. Whatever precedes the first
/// header is dropped, as are blank blocks.
pub fn split_numbered_blocks<'a>(text: &'a str, marker: &Regex) -> Vec<&'a str> {
    marker
        .split(text)
        .skip(1)
        .filter(|block| !block.trim().is_empty())
        .collect()
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
