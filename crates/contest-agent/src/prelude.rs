//! Convenience re-exports for common `contest-agent` types.
//!
//! ```ignore
//! use contest_agent::prelude::*;
//! ```
//!
//! Covers building a supervisor or running one workflow directly. Tools,
//! transition predicates and the HTTP clients' internals stay in their
//! modules.

pub use std::sync::Arc;

pub use futures::StreamExt;

// ── Core types ──────────────────────────────────────────────────────
pub use crate::config::Settings;
pub use crate::error::{ContestError, ProviderError, StepError, SupervisorError};
pub use crate::{Message, OpenRouterClient};

// ── Providers ───────────────────────────────────────────────────────
pub use crate::api::{
    GenerationProvider, OpenRouterFactory, ProviderFactory, ResilientProvider, RetryConfig,
};

// ── Contest service ─────────────────────────────────────────────────
pub use crate::contest::{
    ContestConnector, ContestService, HttpContestClient, HttpContestConnector, Problem,
};

// ── Workflow ────────────────────────────────────────────────────────
pub use crate::workflow::{
    AgentStatus, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler,
    NoopHandler, Step, Terminal, WorkflowConfig, WorkflowEngine, WorkflowEvent, WorkflowOutcome,
    WorkflowState,
};

// ── Supervisor ──────────────────────────────────────────────────────
pub use crate::supervisor::{
    AgentFilter, AgentTask, CreateAgentRequest, CreateAgentResponse, StatusEvent, StatusStream,
    StopAgentResponse, Supervisor, SupervisorConfig,
};
