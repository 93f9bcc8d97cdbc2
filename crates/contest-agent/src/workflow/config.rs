use std::time::Duration;

use crate::api::RetryConfig;
use crate::context::DEFAULT_MAX_CONTEXT_TOKENS;

/// Tunables for one workflow run.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// The run ends once this many seconds or fewer remain.
    pub min_remaining_seconds: u64,
    /// Wait between submitting and reading the verdict.
    pub settle_delay: Duration,
    /// Tool-call rounds allowed while researching a selection.
    pub max_tool_iterations: usize,
    /// Minimum trimmed length of generated code.
    pub min_code_chars: usize,
    pub max_context_tokens: usize,
    pub retry: RetryConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            min_remaining_seconds: 20,
            settle_delay: Duration::from_secs(2),
            max_tool_iterations: 5,
            min_code_chars: 10,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            retry: RetryConfig::default(),
        }
    }
}

impl WorkflowConfig {
    /// No settle delay and no retry backoff.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            retry: RetryConfig::immediate(),
            ..Self::default()
        }
    }
}
