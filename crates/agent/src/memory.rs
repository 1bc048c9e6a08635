use tracing::debug;

use crate::llm::{ChatMessage, ChatRole};

pub const DEFAULT_MAX_TURNS: usize = 5;

const FOLLOW_UP_INDICATORS: [&str; 20] = [
    "what about",
    "how about",
    "and",
    "also",
    "additionally",
    "furthermore",
    "moreover",
    "besides",
    "in addition",
    "it",
    "that",
    "this",
    "these",
    "those",
    "they",
    "same",
    "above",
    "previous",
    "earlier",
    "mentioned",
];
/// Queries shorter than this many words are read as follow-ups.
const SHORT_QUERY_WORDS: usize = 5;

/// Rolling question/answer history, capped at `max_turns` pairs.
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<ChatMessage>,
    max_turns: usize,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self { messages: Vec::new(), max_turns: max_turns.max(1) }
    }

    pub fn add_turn(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.messages.push(ChatMessage::user(question));
        self.messages.push(ChatMessage::assistant(answer));

        let max_messages = self.max_turns * 2;
        if self.messages.len() > max_messages {
            let excess = self.messages.len() - max_messages;
            self.messages.drain(..excess);
        }
        debug!(event_name = "agent.memory.turn_added", turns = self.turn_count(), "conversation turn recorded");
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn turn_count(&self) -> usize {
        self.messages.len() / 2
    }

    pub fn last_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.as_str())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// The last `max_turns` turns, only when `query` reads like a follow-up
    /// (a back-reference or a very short question).
    pub fn context_for(&self, query: &str, max_turns: usize) -> Vec<ChatMessage> {
        if self.messages.is_empty() || !is_follow_up(query) {
            return Vec::new();
        }
        let keep = (max_turns * 2).min(self.messages.len());
        self.messages[self.messages.len() - keep..].to_vec()
    }
}

fn is_follow_up(query: &str) -> bool {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .collect();
    if words.len() < SHORT_QUERY_WORDS {
        return true;
    }
    let normalized = words.join(" ");
    FOLLOW_UP_INDICATORS.iter().any(|indicator| {
        if indicator.contains(' ') {
            normalized.contains(indicator)
        } else {
            words.iter().any(|word| word == indicator)
        }
    })
}
