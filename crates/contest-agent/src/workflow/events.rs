//! Events emitted by the [`WorkflowEngine`](super::engine::WorkflowEngine).
//!
//! The engine reports progress through [`WorkflowEvent`] variants. Callers
//! implement [`EventHandler`] to observe them; the supervisor uses one to
//! keep its registry and status stream current.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use tracing::{debug, info, warn};

use super::state::{Step, Terminal};
use crate::contest::{Language, Problem};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted during a workflow run.
#[derive(Debug)]
pub enum WorkflowEvent<'a> {
    /// The current step changed. Only fired when `from != to`.
    StepChanged { from: Step, to: Step },
    ContestAnalyzed {
        problems: usize,
        remaining_seconds: u64,
    },
    ProblemSelected {
        problem: &'a Problem,
        reasoning: &'a str,
        /// The model's choice was unusable and the first candidate was taken.
        fallback: bool,
    },
    SolutionGenerated {
        problem_id: &'a str,
        language: Language,
        confidence: u8,
    },
    SolutionSubmitted {
        problem_id: &'a str,
        submission_id: &'a str,
    },
    ProblemSolved { problem_id: &'a str },
    /// Solved and submitted counts after a change.
    Progress { solved: usize, submitted: usize },
    Rank { rank: u32, solved: u32 },
    /// A step failed without ending the run.
    StepFailed { step: Step, error: &'a str },
    ContestEnded { during: Step, reason: &'a str },
    Finished {
        terminal: Terminal,
        error: Option<&'a str>,
    },
}

/// Observer for [`WorkflowEvent`]s.
///
/// # Example
///
/// ```ignore
/// struct MyHandler;
///
/// impl EventHandler for MyHandler {
///     fn on_event(&self, event: &WorkflowEvent<'_>) {
///         if let WorkflowEvent::StepChanged { to, .. } = event {
///             println!("now {to}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for each event. Must not block.
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        let _ = event;
    }
}

pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let WorkflowEvent::ProblemSolved { problem_id } = event {
///         println!("solved {problem_id}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&WorkflowEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&WorkflowEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&WorkflowEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler::new("agent-1"))
///     .with(registry_sink);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events via `tracing`, prefixed with an agent label.
pub struct LoggingHandler {
    label: String,
}

impl LoggingHandler {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        let label = &self.label;
        match event {
            WorkflowEvent::StepChanged { from, to } => {
                debug!("[{label}] {from} → {to}");
            }
            WorkflowEvent::ContestAnalyzed {
                problems,
                remaining_seconds,
            } => {
                info!("[{label}] Contest has {problems} problem(s), {remaining_seconds}s remaining");
            }
            WorkflowEvent::ProblemSelected {
                problem,
                reasoning,
                fallback,
            } => {
                if *fallback {
                    warn!("[{label}] Fell back to problem {}: {reasoning}", problem.id);
                } else {
                    info!("[{label}] Selected problem {} ({})", problem.id, problem.name);
                    debug!("[{label}] Reasoning: {reasoning}");
                }
            }
            WorkflowEvent::SolutionGenerated {
                problem_id,
                language,
                confidence,
            } => {
                info!("[{label}] Generated {language} solution for {problem_id} (confidence {confidence}/10)");
            }
            WorkflowEvent::SolutionSubmitted {
                problem_id,
                submission_id,
            } => {
                info!("[{label}] Submitted {problem_id} as {submission_id}");
            }
            WorkflowEvent::ProblemSolved { problem_id } => {
                info!("[{label}] Problem {problem_id} accepted");
            }
            WorkflowEvent::Progress { solved, submitted } => {
                debug!("[{label}] Progress: {solved} solved, {submitted} attempted");
            }
            WorkflowEvent::Rank { rank, solved } => {
                info!("[{label}] Current rank {rank} with {solved} solved");
            }
            WorkflowEvent::StepFailed { step, error } => {
                warn!("[{label}] {step} failed: {error}");
            }
            WorkflowEvent::ContestEnded { during, reason } => {
                info!("[{label}] Contest ended during {during}: {reason}");
            }
            WorkflowEvent::Finished { terminal, error } => match error {
                Some(e) => info!("[{label}] Finished ({terminal:?}), last error: {e}"),
                None => info!("[{label}] Finished ({terminal:?})"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn composite_dispatches_to_all() {
        let count = Arc::new(AtomicUsize::new(0));
        let a = count.clone();
        let b = count.clone();
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with(NoopHandler)
            .with_opt(Some(FnEventHandler::new(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            })))
            .with_opt(None::<NoopHandler>);

        handler.on_event(&WorkflowEvent::ProblemSolved { problem_id: "p1" });
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn logging_handler_accepts_every_event() {
        let handler = LoggingHandler::new("agent");
        handler.on_event(&WorkflowEvent::StepChanged {
            from: Step::Initializing,
            to: Step::AnalyzingContest,
        });
        handler.on_event(&WorkflowEvent::Finished {
            terminal: Terminal::Completed,
            error: Some("boom"),
        });
    }
}
