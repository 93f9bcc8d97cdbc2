//! Bounded conversation context for generation calls.
//!
//! Before each provider call the workflow hands its full conversation
//! history to [`ContextWindow::build`], which keeps only human/assistant
//! turns, drops the oldest until the rest fit the token budget, and appends
//! the new prompt. Tool-call records and system scaffolding never count
//! against (or enter) the window.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::Message;
use crate::error::ContextError;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Default token budget for trimmed history.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 8_000;

/// Raw messages kept when trimming fails.
pub const FALLBACK_MESSAGES: usize = 3;

/// Fixed per-message overhead (role tag, separators) in tokens.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Counts the tokens a message will cost.
pub trait TokenCounter: Send + Sync {
    fn count(&self, message: &Message) -> Result<usize, ContextError>;
}

/// Character-ratio estimate: `ceil(chars / chars_per_token)` plus a fixed
/// per-message overhead.
#[derive(Debug, Clone)]
pub struct CharRatioCounter {
    chars_per_token: f64,
}

impl CharRatioCounter {
    pub fn new(chars_per_token: f64) -> Self {
        Self { chars_per_token }
    }
}

impl Default for CharRatioCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenCounter for CharRatioCounter {
    fn count(&self, message: &Message) -> Result<usize, ContextError> {
        if !self.chars_per_token.is_finite() || self.chars_per_token <= 0.0 {
            return Err(ContextError(format!(
                "invalid chars-per-token ratio {}",
                self.chars_per_token
            )));
        }
        let chars = message.text().chars().count() as f64;
        Ok((chars / self.chars_per_token).ceil() as usize + MESSAGE_OVERHEAD_TOKENS)
    }
}

/// Builds the message list sent to the provider from stored history.
#[derive(Clone)]
pub struct ContextWindow {
    max_tokens: usize,
    counter: Arc<dyn TokenCounter>,
}

impl std::fmt::Debug for ContextWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextWindow")
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_TOKENS)
    }
}

impl ContextWindow {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            counter: Arc::new(CharRatioCounter::default()),
        }
    }

    /// Replace the token counter.
    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// History trimmed to the budget, followed by `prompt`.
    ///
    /// Empty history yields just the prompt. If counting fails, the last
    /// [`FALLBACK_MESSAGES`] raw messages are used instead; this never fails.
    pub fn build(&self, history: &[Message], prompt: Message) -> Vec<Message> {
        if history.is_empty() {
            return vec![prompt];
        }

        let mut messages = match self.trim(history) {
            Ok(kept) => {
                debug!(
                    "Context window: {}/{} history message(s) within {} tokens",
                    kept.len(),
                    history.len(),
                    self.max_tokens
                );
                kept
            }
            Err(e) => {
                warn!("{e}; falling back to the last {FALLBACK_MESSAGES} messages");
                let start = history.len().saturating_sub(FALLBACK_MESSAGES);
                history.get(start..).unwrap_or_default().to_vec()
            }
        };
        messages.push(prompt);
        messages
    }

    /// Newest conversational messages whose summed cost fits the budget, in
    /// original order.
    pub fn trim(&self, history: &[Message]) -> Result<Vec<Message>, ContextError> {
        let mut kept = Vec::new();
        let mut used = 0usize;
        for message in history.iter().rev().filter(|m| m.is_conversational()) {
            let cost = self.counter.count(message)?;
            if used + cost > self.max_tokens {
                break;
            }
            used += cost;
            kept.push(message.clone());
        }
        kept.reverse();
        Ok(kept)
    }

    /// Estimated token cost of a message list (for tests and diagnostics).
    pub fn estimate(&self, messages: &[Message]) -> Result<usize, ContextError> {
        messages.iter().map(|m| self.counter.count(m)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;

    struct FailingCounter;
    impl TokenCounter for FailingCounter {
        fn count(&self, _message: &Message) -> Result<usize, ContextError> {
            Err(ContextError("tokenizer unavailable".into()))
        }
    }

    fn turns(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question {i} {}", "x".repeat(60)))
                } else {
                    Message::assistant_text(format!("answer {i} {}", "y".repeat(60)))
                }
            })
            .collect()
    }

    #[test]
    fn empty_history_yields_prompt_only() {
        let window = ContextWindow::new(100);
        let out = window.build(&[], Message::user("go"));
        assert_eq!(out, vec![Message::user("go")]);
    }

    #[test]
    fn keeps_everything_when_under_budget() {
        let window = ContextWindow::new(10_000);
        let history = turns(4);
        let out = window.build(&history, Message::user("next"));
        assert_eq!(out.len(), 5);
        assert_eq!(out[..4], history[..]);
        assert_eq!(out[4], Message::user("next"));
    }

    #[test]
    fn trims_oldest_first_and_respects_budget() {
        let history = turns(20);
        let window = ContextWindow::new(100);
        let out = window.build(&history, Message::user("next"));

        let kept = &out[..out.len() - 1];
        assert!(!kept.is_empty());
        assert!(kept.len() < history.len());
        assert!(window.estimate(kept).unwrap() <= 100);
        // The newest messages survive, in order.
        assert_eq!(kept.last(), history.last());
        let offset = history.len() - kept.len();
        assert_eq!(kept, &history[offset..]);
    }

    #[test]
    fn tool_and_system_messages_are_excluded() {
        let history = vec![
            Message::system("scaffolding"),
            Message::user("which problem?"),
            Message::assistant_tool_calls(vec![ToolCall::function("c1", "view_contest", "{}")]),
            Message::tool_result("c1", "contest data"),
            Message::assistant_text("problem A looks easy"),
        ];
        let window = ContextWindow::new(10_000);
        let out = window.build(&history, Message::user("pick"));
        assert_eq!(
            out,
            vec![
                Message::user("which problem?"),
                Message::assistant_text("problem A looks easy"),
                Message::user("pick"),
            ]
        );
    }

    #[test]
    fn counter_failure_falls_back_to_last_three() {
        let history = turns(6);
        let window = ContextWindow::new(100).with_counter(Arc::new(FailingCounter));
        let out = window.build(&history, Message::user("next"));
        assert_eq!(out.len(), 4);
        assert_eq!(out[..3], history[3..]);
        assert_eq!(out[3], Message::user("next"));
    }

    #[test]
    fn fallback_with_short_history_keeps_all() {
        let history = turns(2);
        let window = ContextWindow::new(100).with_counter(Arc::new(FailingCounter));
        let out = window.build(&history, Message::user("next"));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn zero_budget_sends_prompt_only() {
        let window = ContextWindow::new(0);
        let out = window.build(&turns(4), Message::user("next"));
        assert_eq!(out, vec![Message::user("next")]);
    }

    #[test]
    fn char_ratio_counts_overhead() {
        let counter = CharRatioCounter::default();
        assert_eq!(counter.count(&Message::user("")).unwrap(), 4);
        // 7 chars / 3.5 = 2 tokens + 4 overhead.
        assert_eq!(counter.count(&Message::user("abcdefg")).unwrap(), 6);
        assert!(CharRatioCounter::new(0.0).count(&Message::user("a")).is_err());
    }
}
