//! Process-wide settings and the component configs derived from them.
//!
//! Every field has a default, so the minimal setup is:
//!
//! ```ignore
//! let settings = Settings::default();
//! ```
//!
//! Override through builder methods (the binaries map CLI flags and their
//! environment fallbacks onto these):
//!
//! ```ignore
//! let settings = Settings::default()
//!     .with_model("anthropic/claude-sonnet-4")
//!     .with_max_concurrent_agents(4)
//!     .with_retries(5);
//! let supervisor_config = settings.supervisor_config();
//! ```

use std::time::Duration;

use crate::DEFAULT_MODEL;
use crate::api::RetryConfig;
use crate::context::DEFAULT_MAX_CONTEXT_TOKENS;
use crate::supervisor::{DEFAULT_SUBSCRIBER_CAPACITY, SupervisorConfig};
use crate::workflow::WorkflowConfig;

pub const DEFAULT_CONTEST_HOST: &str = "localhost:50051";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Model for agents whose create request names none.
    pub default_model: String,
    pub temperature: f32,
    /// Maximum output tokens per generation call.
    pub max_tokens: u32,
    /// Timeout for one provider HTTP request.
    pub request_timeout: Duration,
    /// Timeout for one contest-service HTTP request.
    pub contest_timeout: Duration,
    pub max_context_tokens: usize,
    pub default_contest_host: String,
    pub max_concurrent_agents: usize,
    pub settle_delay: Duration,
    /// The run ends once this many seconds or fewer remain.
    pub end_grace_seconds: u64,
    pub max_tool_iterations: usize,
    pub retry: RetryConfig,
    pub subscriber_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let workflow = WorkflowConfig::default();
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 4000,
            request_timeout: Duration::from_secs(30),
            contest_timeout: Duration::from_secs(30),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            default_contest_host: DEFAULT_CONTEST_HOST.to_string(),
            max_concurrent_agents: 10,
            settle_delay: workflow.settle_delay,
            end_grace_seconds: workflow.min_remaining_seconds,
            max_tool_iterations: workflow.max_tool_iterations,
            retry: RetryConfig::default(),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl Settings {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_contest_host(mut self, host: impl Into<String>) -> Self {
        self.default_contest_host = host.into();
        self
    }

    pub fn with_max_concurrent_agents(mut self, max: usize) -> Self {
        self.max_concurrent_agents = max;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Total attempts per provider call, counting the first.
    pub fn with_retries(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts;
        self
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone()
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            min_remaining_seconds: self.end_grace_seconds,
            settle_delay: self.settle_delay,
            max_tool_iterations: self.max_tool_iterations,
            max_context_tokens: self.max_context_tokens,
            retry: self.retry_config(),
            ..WorkflowConfig::default()
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            workflow: self.workflow_config(),
            max_concurrent_agents: self.max_concurrent_agents,
            subscriber_capacity: self.subscriber_capacity,
            default_model: self.default_model.clone(),
            default_contest_host: self.default_contest_host.clone(),
        }
    }
}
