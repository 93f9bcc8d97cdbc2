//! The per-agent workflow loop.
//!
//! [`WorkflowEngine::run`] drives one agent from contest analysis to a
//! terminal outcome:
//!
//! ```text
//! analyzing_contest → selecting_problem → solving_problem → coding
//!         ↑                  │                    → submitting_solution
//!         │                  └→ no_problems (done)    → checking_results
//!         └──── monitoring_contest ←──── should_continue ←┘
//! ```
//!
//! Every step runs inside a `select!` against the agent's
//! [`CancellationToken`], so a stop request interrupts an in-flight provider
//! or contest call instead of waiting for it.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::config::WorkflowConfig;
use super::events::{EventHandler, NoopHandler, WorkflowEvent};
use super::state::{Step, Terminal, WorkflowState};
use super::transitions::{self, Next};
use crate::api::{GenerationProvider, ResilientProvider};
use crate::contest::ContestService;
use crate::context::ContextWindow;
use crate::error::StepError;

/// How a run ended, with the final state.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub terminal: Terminal,
    pub error: Option<String>,
    pub state: WorkflowState,
}

pub struct WorkflowEngine {
    pub(super) provider: ResilientProvider,
    pub(super) contest: Arc<dyn ContestService>,
    pub(super) context: ContextWindow,
    pub(super) config: WorkflowConfig,
    handler: Arc<dyn EventHandler>,
    cancel: CancellationToken,
}

impl WorkflowEngine {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        contest: Arc<dyn ContestService>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            provider: ResilientProvider::new(provider, config.retry.clone()),
            contest,
            context: ContextWindow::new(config.max_context_tokens),
            config,
            handler: Arc::new(NoopHandler),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_context_window(mut self, context: ContextWindow) -> Self {
        self.context = context;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(super) fn label(&self) -> &str {
        self.provider.model()
    }

    /// Run until a terminal outcome. Never panics on step failures; they are
    /// recorded in the state and the loop moves on.
    pub async fn run(&self, mut state: WorkflowState) -> WorkflowOutcome {
        info!(
            "[{}] Starting workflow for contest {} as participant {}",
            self.label(),
            state.contest_id,
            state.participant_id
        );

        let mut step = Step::AnalyzingContest;
        let terminal = loop {
            if self.cancel.is_cancelled() {
                break Terminal::Stopped;
            }
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                next = self.execute(step, &mut state) => Some(next),
            };
            match next {
                None => break Terminal::Stopped,
                Some(Next::Step(s)) => step = s,
                Some(Next::Finish(t)) => break t,
            }
        };

        if !state.current_step.is_terminal() {
            self.enter(&mut state, terminal.step());
        }
        self.emit(WorkflowEvent::Finished {
            terminal,
            error: state.error.as_deref(),
        });
        WorkflowOutcome {
            terminal,
            error: state.error.clone(),
            state,
        }
    }

    async fn execute(&self, step: Step, state: &mut WorkflowState) -> Next {
        let min = self.config.min_remaining_seconds;
        match step {
            Step::AnalyzingContest => {
                let result = self.analyze(state).await;
                self.record(state, step, result);
                transitions::after_analysis(state)
            }
            Step::SelectingProblem => {
                let result = self.select_problem(state).await;
                self.record(state, step, result);
                transitions::after_selection(state, min)
            }
            Step::SolvingProblem => {
                let result = self.solve(state).await;
                self.record(state, step, result);
                transitions::after_solving(state, min)
            }
            Step::SubmittingSolution => {
                let result = self.submit(state).await;
                self.record(state, step, result);
                transitions::after_submission(state)
            }
            Step::CheckingResults => {
                let result = self.check_results(state).await;
                self.record(state, step, result);
                state.refresh_remaining(Utc::now());
                transitions::after_check(state, min)
            }
            Step::MonitoringContest => {
                let result = self.monitor(state).await;
                self.record(state, step, result);
                transitions::after_monitor(state, min)
            }
            other => {
                state.set_error(format!("no handler for step {other}"));
                Next::Finish(Terminal::Failed)
            }
        }
    }

    /// Record a step failure. A contest-ended failure moves the state to
    /// `contest_ended`; anything else becomes the agent's error message.
    fn record(&self, state: &mut WorkflowState, step: Step, result: Result<(), StepError>) {
        let Err(e) = result else { return };
        let reason = e.to_string();
        if e.is_contest_ended() {
            state.set_error("Contest ended");
            self.enter(state, Step::ContestEnded);
            self.emit(WorkflowEvent::ContestEnded {
                during: step,
                reason: &reason,
            });
        } else {
            self.emit(WorkflowEvent::StepFailed {
                step,
                error: &reason,
            });
            state.set_error(reason);
        }
    }

    /// Move to `step`, notifying observers only on an actual change.
    pub(super) fn enter(&self, state: &mut WorkflowState, step: Step) {
        if state.current_step == step {
            return;
        }
        let from = std::mem::replace(&mut state.current_step, step);
        self.emit(WorkflowEvent::StepChanged { from, to: step });
    }

    pub(super) fn emit(&self, event: WorkflowEvent<'_>) {
        self.handler.on_event(&event);
    }

    pub(super) fn emit_progress(&self, state: &WorkflowState) {
        self.emit(WorkflowEvent::Progress {
            solved: state.solved.len(),
            submitted: state.submitted.len(),
        });
    }
}
