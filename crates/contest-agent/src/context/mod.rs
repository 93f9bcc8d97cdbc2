//! Context window management for generation calls.
//!
//! Agents keep their whole (bounded) conversation history in
//! [`WorkflowState`](crate::workflow::WorkflowState), but a contest can run
//! for hours. [`ContextWindow`] decides which part of that history each
//! provider call sees: human/assistant turns only, newest first, within a
//! token budget, with a best-effort fallback when counting fails.

pub mod window;

pub use window::{
    CharRatioCounter, ContextWindow, DEFAULT_CHARS_PER_TOKEN, DEFAULT_MAX_CONTEXT_TOKENS,
    FALLBACK_MESSAGES, TokenCounter,
};
