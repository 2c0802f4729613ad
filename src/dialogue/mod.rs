pub mod grammar;

use std::fmt;

pub use grammar::{check_grammar, GrammarCheckResult};

use crate::prompts;

const CONTEXT_TURNS: usize = 10;
const RECENT_MISTAKES: usize = 10;

pub const SELLER_GREETING: &str = "Hello! Welcome to our store. How can I help you today?";
pub const BUYER_GREETING: &str = "Hello! I'm looking for some products. What do you have available?";
pub const APOLOGY: &str = "Sorry, I couldn't process that. Could you please repeat?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Buyer => Role::Seller,
            Role::Seller => Role::Buyer,
        }
    }

    /// How the role is named inside the dialogue transcript.
    pub fn label(self) -> &'static str {
        match self {
            Role::Buyer => "Customer",
            Role::Seller => "Seller",
        }
    }

    fn greeting(self) -> &'static str {
        match self {
            Role::Seller => SELLER_GREETING,
            Role::Buyer => BUYER_GREETING,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Seller => write!(f, "seller"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DialogueStats {
    pub total_exchanges: u32,
    pub total_errors: u32,
    pub errors_per_message: f64,
    pub recent_mistakes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueReply {
    pub response: String,
    pub grammar: GrammarCheckResult,
    pub is_finished: bool,
    pub exchange: u32,
    pub max_exchanges: u32,
    pub stats: Option<DialogueStats>,
}

/// A buyer/seller role-play. The model opens the conversation and the
/// session finishes after `max_exchanges` user messages.
#[derive(Debug, Clone)]
pub struct DialogueSession {
    user_role: Role,
    ai_role: Role,
    turns: Vec<Turn>,
    exchange_count: u32,
    max_exchanges: u32,
    total_errors: u32,
    mistakes: Vec<String>,
}

impl DialogueSession {
    pub fn start(user_role: Role, max_exchanges: u32) -> Self {
        let ai_role = user_role.opposite();
        Self {
            user_role,
            ai_role,
            turns: vec![Turn {
                role: Speaker::Assistant,
                content: ai_role.greeting().to_string(),
            }],
            exchange_count: 0,
            max_exchanges,
            total_errors: 0,
            mistakes: Vec::new(),
        }
    }

    pub fn opening(&self) -> &str {
        &self.turns[0].content
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn exchange_count(&self) -> u32 {
        self.exchange_count
    }

    pub fn max_exchanges(&self) -> u32 {
        self.max_exchanges
    }

    pub fn is_finished(&self) -> bool {
        self.exchange_count >= self.max_exchanges
    }

    /// Adds the user's message and its grammar check. Returns whether this
    /// message used up the last exchange.
    pub fn record_user_turn(&mut self, text: &str, grammar: &GrammarCheckResult) -> bool {
        if grammar.errors_count > 0 {
            self.total_errors += grammar.errors_count;
            self.mistakes.extend(grammar.mistakes.iter().cloned());
        }
        self.turns.push(Turn {
            role: Speaker::User,
            content: text.to_string(),
        });
        self.exchange_count += 1;
        self.is_finished()
    }

    pub fn record_assistant_turn(&mut self, text: &str) {
        self.turns.push(Turn {
            role: Speaker::Assistant,
            content: text.to_string(),
        });
    }

    /// Prompt for the model's next line, built from the latest turns.
    pub fn continuation_prompt(&self) -> String {
        let start = self.turns.len().saturating_sub(CONTEXT_TURNS);
        let transcript: String = self.turns[start..]
            .iter()
            .map(|turn| {
                let label = match turn.role {
                    Speaker::User => self.user_role.label(),
                    Speaker::Assistant => self.ai_role.label(),
                };
                format!("{}: {}\n", label, turn.content)
            })
            .collect();

        prompts::dialogue_continuation(&transcript, self.ai_role.label())
    }

    pub fn system_instruction(&self) -> &'static str {
        prompts::dialogue_instruction(self.ai_role)
    }

    pub fn statistics(&self) -> DialogueStats {
        let per_message = self.total_errors as f64 / self.exchange_count.max(1) as f64;
        let recent_start = self.mistakes.len().saturating_sub(RECENT_MISTAKES);

        DialogueStats {
            total_exchanges: self.exchange_count,
            total_errors: self.total_errors,
            errors_per_message: (per_message * 10.0).round() / 10.0,
            recent_mistakes: self.mistakes[recent_start..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checked(errors: u32, mistakes: &[&str]) -> GrammarCheckResult {
        GrammarCheckResult {
            errors_count: errors,
            corrected_text: String::new(),
            mistakes: mistakes.iter().map(|m| m.to_string()).collect(),
            original_text: String::new(),
            raw_response: String::new(),
        }
    }

    #[test]
    fn buyer_talks_to_seller() {
        let session = DialogueSession::start(Role::Buyer, 10);

        assert_eq!(session.system_instruction(), prompts::dialogue_instruction(Role::Seller));
        assert_eq!(session.opening(), SELLER_GREETING);
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].role, Speaker::Assistant);
    }

    #[test]
    fn seller_talks_to_buyer() {
        let session = DialogueSession::start(Role::Seller, 10);

        assert_eq!(session.system_instruction(), prompts::dialogue_instruction(Role::Buyer));
        assert_eq!(session.opening(), BUYER_GREETING);
    }

    #[test]
    fn only_the_last_exchange_finishes_the_session() {
        let mut session = DialogueSession::start(Role::Buyer, 3);
        let clean = checked(0, &[]);

        assert!(!session.record_user_turn("one", &clean));
        session.record_assistant_turn("a");
        assert!(!session.record_user_turn("two", &clean));
        session.record_assistant_turn("b");
        assert!(session.record_user_turn("three", &clean));
        assert_eq!(session.exchange_count(), 3);
    }

    #[test]
    fn statistics_accumulate_errors() {
        let mut session = DialogueSession::start(Role::Buyer, 10);
        session.record_user_turn("i wants apple", &checked(2, &["- m1", "- m2"]));
        session.record_user_turn("ok", &checked(0, &["- ignored"]));
        session.record_user_turn("he go", &checked(1, &[]));

        let stats = session.statistics();
        assert_eq!(stats.total_exchanges, 3);
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.errors_per_message, 1.0);
        assert_eq!(stats.recent_mistakes, vec!["- m1".to_string(), "- m2".to_string()]);
    }

    #[test]
    fn statistics_round_and_keep_last_ten_mistakes() {
        let mut session = DialogueSession::start(Role::Seller, 10);
        let many: Vec<String> = (1..=12).map(|i| format!("- m{}", i)).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        session.record_user_turn("x", &checked(2, &refs));
        session.record_user_turn("y", &checked(0, &[]));
        session.record_user_turn("z", &checked(0, &[]));

        let stats = session.statistics();
        assert_eq!(stats.errors_per_message, 0.7);
        assert_eq!(stats.recent_mistakes.len(), 10);
        assert_eq!(stats.recent_mistakes[0], "- m3");
    }

    #[test]
    fn empty_dialogue_has_zero_rate() {
        let stats = DialogueSession::start(Role::Buyer, 10).statistics();

        assert_eq!(stats.total_exchanges, 0);
        assert_eq!(stats.errors_per_message, 0.0);
    }

    #[test]
    fn prompt_labels_turns_by_role_and_keeps_ten() {
        let mut session = DialogueSession::start(Role::Buyer, 20);
        for i in 0..6 {
            session.record_user_turn(&format!("user {}", i), &checked(0, &[]));
            session.record_assistant_turn(&format!("ai {}", i));
        }

        let prompt = session.continuation_prompt();
        assert!(!prompt.contains(SELLER_GREETING));
        assert!(!prompt.contains("user 0"));
        assert!(prompt.contains("Customer: user 1\nSeller: ai 1\n"));
        assert!(prompt.ends_with("Your response as Seller (in English only):"));
    }

    #[test]
    fn roles_swap_labels_when_user_sells() {
        let mut session = DialogueSession::start(Role::Seller, 10);
        session.record_user_turn("We have apples.", &checked(0, &[]));

        let prompt = session.continuation_prompt();
        assert!(prompt.contains(&format!("Customer: {}\n", BUYER_GREETING)));
        assert!(prompt.contains("Seller: We have apples.\n"));
        assert!(session.system_instruction().starts_with("You are a customer"));
    }
}
