//! The six workflow steps.
//!
//! Each step mutates [`WorkflowState`] and returns a [`StepError`] on
//! failure; the engine records the error and asks
//! [`transitions`](super::transitions) where to go next.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::engine::WorkflowEngine;
use super::events::WorkflowEvent;
use super::prompts;
use super::state::{CodeSolution, ProblemAnalysis, ProblemSelection, SolutionArtifact, Step, WorkflowState};
use super::transitions::selection_index;
use crate::contest::{ContestState, SubmissionStatus, SubmitRequest};
use crate::error::{ContestError, ProviderError, StepError};
use crate::tools::{ToolSet, contest_tools};
use crate::Message;

impl WorkflowEngine {
    /// Fetch contest metadata and compute the time left.
    pub(super) async fn analyze(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        self.enter(state, Step::AnalyzingContest);
        let contest = self.contest.get_contest(&state.contest_id).await?;
        state.remaining_seconds = contest.remaining_seconds(Utc::now());
        if state.problems.is_empty() {
            state.problems = contest.problems.clone();
        }
        state.push_history(Message::assistant_text(prompts::contest_summary(
            &contest,
            state.remaining_seconds,
        )));
        self.emit(WorkflowEvent::ContestAnalyzed {
            problems: state.problems.len(),
            remaining_seconds: state.remaining_seconds,
        });

        let finished = contest.state == ContestState::Finished;
        state.contest = Some(contest);
        if finished {
            return Err(ContestError::ContestEnded("contest is finished".into()).into());
        }
        Ok(())
    }

    /// Reconcile with the service, then let the model pick among the
    /// candidates that are neither solved nor awaiting a verdict.
    pub(super) async fn select_problem(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        self.enter(state, Step::SelectingProblem);
        state.current_problem = None;

        let pending = self.reconcile_submissions(state).await?;
        let available = state.available_problems(&pending);
        if available.is_empty() {
            info!("[{}] No problems left to attempt", self.label());
            self.enter(state, Step::NoProblems);
            return Ok(());
        }

        let tools = contest_tools(self.contest.clone(), &state.contest_id, &state.participant_id);
        let research = Message::user(prompts::selection_research(state, &available));
        let mut messages = self.context.build(state.history(), research);
        if let Err(e) = self.research(&mut messages, &tools).await {
            warn!("[{}] Tool research failed, selecting without it: {e}", self.label());
        }
        messages.push(Message::user(prompts::selection(available.len())));

        let choice = self
            .provider
            .generate_structured::<ProblemSelection>(&messages, "problem_selection")
            .await;
        let (index, reasoning, fallback) = match choice {
            Ok(sel) => match selection_index(sel.problem_number, available.len()) {
                Some(i) => (i, sel.reasoning, false),
                None => (
                    0,
                    format!(
                        "invalid selection {} of {}, using first available problem",
                        sel.problem_number,
                        available.len()
                    ),
                    true,
                ),
            },
            Err(e) => (
                0,
                format!("selection failed ({e}), using first available problem"),
                true,
            ),
        };

        let Some(problem) = available.into_iter().nth(index) else {
            return Err(StepError::NoProblemSelected);
        };
        state.clear_error();
        state.push_history(Message::assistant_text(prompts::selected(&problem, &reasoning)));
        self.emit(WorkflowEvent::ProblemSelected {
            problem: &problem,
            reasoning: &reasoning,
            fallback,
        });
        state.current_problem = Some(problem);
        Ok(())
    }

    /// Fold the service's view of our submissions into the solved and
    /// submitted sets. Returns problems still being judged.
    async fn reconcile_submissions(
        &self,
        state: &mut WorkflowState,
    ) -> Result<HashSet<String>, StepError> {
        let mut pending = HashSet::new();
        let submissions = match self
            .contest
            .get_submissions(&state.contest_id, &state.participant_id, None)
            .await
        {
            Ok(s) => s,
            Err(e) if e.is_contest_ended() => return Err(e.into()),
            Err(e) => {
                warn!("[{}] Could not fetch submissions: {e}", self.label());
                return Ok(pending);
            }
        };

        let before = (state.solved.len(), state.submitted.len());
        for s in &submissions {
            state.mark_submitted(&s.problem_id);
            match s.status {
                SubmissionStatus::Accepted => {
                    state.mark_solved(&s.problem_id);
                }
                status if status.is_in_progress() => {
                    pending.insert(s.problem_id.clone());
                }
                _ => {}
            }
        }
        if (state.solved.len(), state.submitted.len()) != before {
            self.emit_progress(state);
        }
        Ok(pending)
    }

    /// Let the model call the read-only tools for up to
    /// `max_tool_iterations` rounds. Tool results and the final reply are
    /// appended to `messages`.
    async fn research(&self, messages: &mut Vec<Message>, tools: &ToolSet) -> Result<(), ProviderError> {
        let defs = tools.definitions();
        let mut response = self.provider.generate(messages, Some(&defs)).await?;
        let mut iterations = 0;

        while !response.tool_calls.is_empty() && iterations < self.config.max_tool_iterations {
            iterations += 1;
            debug!(
                "[{}] Tool round {iterations}: {} call(s)",
                self.label(),
                response.tool_calls.len()
            );
            let calls = std::mem::take(&mut response.tool_calls);
            messages.push(Message::assistant_tool_calls(calls.clone()));
            for call in &calls {
                let result = tools
                    .execute(&call.function.name, &call.function.arguments)
                    .await;
                messages.push(Message::tool_result(&call.id, result));
            }
            response = self.provider.generate(messages, Some(&defs)).await?;
        }

        if !response.tool_calls.is_empty() {
            warn!(
                "[{}] Reached max tool iterations ({})",
                self.label(),
                self.config.max_tool_iterations
            );
        }
        if let Some(text) = response.content.filter(|t| !t.trim().is_empty()) {
            messages.push(Message::assistant_text(text));
        }
        Ok(())
    }

    /// Analyze the current problem, then generate code for it.
    pub(super) async fn solve(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        self.enter(state, Step::SolvingProblem);
        state.solution = None;
        let problem = state
            .current_problem
            .clone()
            .ok_or(StepError::NoProblemSelected)?;

        let prompt = Message::user(prompts::analysis(&problem));
        let messages = self.context.build(state.history(), prompt);
        let analysis: ProblemAnalysis = self
            .provider
            .generate_structured(&messages, "problem_analysis")
            .await?;
        let confidence = analysis.confidence();
        debug!("[{}] Approach: {}", self.label(), analysis.approach);
        state.push_history(Message::assistant_text(prompts::analysis_note(&analysis)));

        self.enter(state, Step::Coding);
        let prompt = Message::user(prompts::solution(&problem));
        let messages = self.context.build(state.history(), prompt);
        let generated: CodeSolution = self
            .provider
            .generate_structured(&messages, "code_solution")
            .await?;
        let artifact = SolutionArtifact::from_generated(generated, self.config.min_code_chars)?;

        self.emit(WorkflowEvent::SolutionGenerated {
            problem_id: &problem.id,
            language: artifact.language,
            confidence,
        });
        state.solution = Some(artifact);
        Ok(())
    }

    pub(super) async fn submit(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        self.enter(state, Step::SubmittingSolution);
        let problem_id = state
            .current_problem
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or(StepError::NoProblemSelected)?;
        let solution = state.solution.as_ref().ok_or(StepError::NoSolution)?;

        let request = SubmitRequest {
            contest_id: state.contest_id.clone(),
            participant_id: state.participant_id.clone(),
            problem_id: problem_id.clone(),
            code: solution.code.clone(),
            language: solution.language,
        };
        let submission = self.contest.submit_solution(&request).await?;

        state.push_history(Message::assistant_text(format!(
            "Submitted {} solution for problem {problem_id} (submission {})",
            request.language, submission.id
        )));
        self.emit(WorkflowEvent::SolutionSubmitted {
            problem_id: &problem_id,
            submission_id: &submission.id,
        });
        if state.mark_submitted(&problem_id) {
            self.emit_progress(state);
        }
        Ok(())
    }

    /// Wait for judging to settle, then read the latest verdict for the
    /// current problem.
    pub(super) async fn check_results(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        self.enter(state, Step::CheckingResults);
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
        let problem_id = state
            .current_problem
            .as_ref()
            .map(|p| p.id.clone())
            .ok_or(StepError::NoProblemSelected)?;

        let submissions = self
            .contest
            .get_submissions(&state.contest_id, &state.participant_id, Some(&problem_id))
            .await?;
        let latest = submissions
            .into_iter()
            .max_by_key(|s| s.submitted_at)
            .ok_or_else(|| StepError::NoSubmission(problem_id.clone()))?;

        let note = match latest.status {
            SubmissionStatus::Accepted => {
                state.clear_error();
                if state.mark_solved(&problem_id) {
                    self.emit(WorkflowEvent::ProblemSolved {
                        problem_id: &problem_id,
                    });
                    self.emit_progress(state);
                }
                format!("Problem {problem_id} solved: submission accepted")
            }
            status if status.is_in_progress() => {
                format!("Submission for problem {problem_id} is still being judged ({status:?})")
            }
            status => {
                let mut note = format!("Submission for problem {problem_id} failed: {status:?}");
                if !latest.verdict_message.is_empty() {
                    note.push_str(&format!(" ({})", latest.verdict_message));
                }
                note
            }
        };
        info!("[{}] {note}", self.label());
        state.push_history(Message::assistant_text(note));
        Ok(())
    }

    /// Refresh standings and remaining time from the service.
    pub(super) async fn monitor(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        self.enter(state, Step::MonitoringContest);

        match self.contest.get_leaderboard(&state.contest_id).await {
            Ok(rows) => {
                if let Some(me) = rows.iter().find(|p| p.id == state.participant_id) {
                    self.emit(WorkflowEvent::Rank {
                        rank: me.result.rank,
                        solved: me.result.solved,
                    });
                }
            }
            Err(e) => debug!("[{}] Leaderboard unavailable: {e}", self.label()),
        }

        let now = Utc::now();
        match self.contest.get_contest(&state.contest_id).await {
            Ok(contest) => {
                state.remaining_seconds = contest.remaining_seconds(now);
                let finished = contest.state == ContestState::Finished;
                state.contest = Some(contest);
                if finished {
                    return Err(ContestError::ContestEnded("contest is finished".into()).into());
                }
            }
            Err(e) if e.is_contest_ended() => return Err(e.into()),
            Err(e) => {
                warn!("[{}] Could not refresh contest, using cached end time: {e}", self.label());
                state.refresh_remaining(now);
            }
        }
        Ok(())
    }
}
