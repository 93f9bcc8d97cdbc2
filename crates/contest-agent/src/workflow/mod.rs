//! Per-agent contest workflow.
//!
//! - [`state`]: [`Step`], [`AgentStatus`], [`WorkflowState`] and the
//!   structured generation types.
//! - [`engine`]: [`WorkflowEngine`], the cancellable step loop.
//! - [`transitions`]: pure next-step decisions, including
//!   [`should_continue`].
//! - [`events`]: [`WorkflowEvent`] and the [`EventHandler`] family.
//!
//! # Example
//!
//! ```ignore
//! let engine = WorkflowEngine::new(provider, contest, WorkflowConfig::default())
//!     .with_event_handler(Arc::new(LoggingHandler::new("gpt-4")));
//! let outcome = engine.run(WorkflowState::new("c1", "p1", vec![])).await;
//! println!("{:?} with {} solved", outcome.terminal, outcome.state.solved.len());
//! ```

pub mod config;
pub mod engine;
pub mod events;
mod prompts;
pub mod state;
mod steps;
pub mod transitions;

pub use config::WorkflowConfig;
pub use engine::{WorkflowEngine, WorkflowOutcome};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    WorkflowEvent,
};
pub use state::{
    AgentStatus, CodeSolution, ProblemAnalysis, ProblemSelection, SolutionArtifact, Step,
    Terminal, WorkflowState,
};
pub use transitions::{Next, should_continue};
