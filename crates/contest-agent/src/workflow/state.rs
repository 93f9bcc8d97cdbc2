//! Workflow steps, externally visible statuses, and per-agent state.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Message;
use crate::contest::{Contest, Language, Problem, remaining_seconds};
use crate::error::StepError;

/// Stored history is trimmed to [`HISTORY_TRIM_TO`] once it exceeds this.
pub const MAX_HISTORY_MESSAGES: usize = 200;
pub const HISTORY_TRIM_TO: usize = 120;

// ── Steps and statuses ─────────────────────────────────────────────

/// One named phase of the agent state machine.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Initializing,
    AnalyzingContest,
    SelectingProblem,
    /// Nothing left to attempt; reported as `completed`.
    NoProblems,
    SolvingProblem,
    Coding,
    SubmittingSolution,
    CheckingResults,
    MonitoringContest,
    ContestEnded,
    Completed,
    Failed,
    Stopped,
}

impl Step {
    /// Tag surfaced as `current_step`.
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Initializing => "initializing",
            Step::AnalyzingContest => "analyzing_contest",
            Step::SelectingProblem => "selecting_problem",
            Step::NoProblems => "no_problems",
            Step::SolvingProblem => "solving_problem",
            Step::Coding => "coding",
            Step::SubmittingSolution => "submitting_solution",
            Step::CheckingResults => "checking_results",
            Step::MonitoringContest => "monitoring_contest",
            Step::ContestEnded => "contest_ended",
            Step::Completed => "completed",
            Step::Failed => "failed",
            Step::Stopped => "stopped",
        }
    }

    pub fn status(self) -> AgentStatus {
        match self {
            Step::Initializing => AgentStatus::Initializing,
            Step::AnalyzingContest => AgentStatus::AnalyzingContest,
            Step::SelectingProblem => AgentStatus::SelectingProblem,
            Step::NoProblems | Step::Completed => AgentStatus::Completed,
            Step::SolvingProblem => AgentStatus::SolvingProblem,
            Step::Coding => AgentStatus::Coding,
            Step::SubmittingSolution => AgentStatus::SubmittingSolution,
            Step::CheckingResults => AgentStatus::CheckingResults,
            Step::MonitoringContest => AgentStatus::MonitoringContest,
            Step::ContestEnded => AgentStatus::ContestEnded,
            Step::Failed => AgentStatus::Failed,
            Step::Stopped => AgentStatus::Stopped,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.status().is_terminal()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible agent status.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Initializing,
    AnalyzingContest,
    SelectingProblem,
    SolvingProblem,
    Coding,
    SubmittingSolution,
    CheckingResults,
    MonitoringContest,
    ContestEnded,
    Completed,
    Failed,
    Stopped,
}

impl AgentStatus {
    pub const ALL: [AgentStatus; 12] = [
        AgentStatus::Initializing,
        AgentStatus::AnalyzingContest,
        AgentStatus::SelectingProblem,
        AgentStatus::SolvingProblem,
        AgentStatus::Coding,
        AgentStatus::SubmittingSolution,
        AgentStatus::CheckingResults,
        AgentStatus::MonitoringContest,
        AgentStatus::ContestEnded,
        AgentStatus::Completed,
        AgentStatus::Failed,
        AgentStatus::Stopped,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentStatus::ContestEnded
                | AgentStatus::Completed
                | AgentStatus::Failed
                | AgentStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Initializing => "INITIALIZING",
            AgentStatus::AnalyzingContest => "ANALYZING_CONTEST",
            AgentStatus::SelectingProblem => "SELECTING_PROBLEM",
            AgentStatus::SolvingProblem => "SOLVING_PROBLEM",
            AgentStatus::Coding => "CODING",
            AgentStatus::SubmittingSolution => "SUBMITTING_SOLUTION",
            AgentStatus::CheckingResults => "CHECKING_RESULTS",
            AgentStatus::MonitoringContest => "MONITORING_CONTEST",
            AgentStatus::ContestEnded => "CONTEST_ENDED",
            AgentStatus::Completed => "COMPLETED",
            AgentStatus::Failed => "FAILED",
            AgentStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    /// Case-insensitive; accepts `STOPPED` as well as `stopped`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        AgentStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == upper)
            .ok_or_else(|| format!("unknown agent status `{s}`"))
    }
}

/// How a workflow run ended.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Completed,
    ContestEnded,
    Failed,
    Stopped,
}

impl Terminal {
    pub fn step(self) -> Step {
        match self {
            Terminal::Completed => Step::Completed,
            Terminal::ContestEnded => Step::ContestEnded,
            Terminal::Failed => Step::Failed,
            Terminal::Stopped => Step::Stopped,
        }
    }

    pub fn status(self) -> AgentStatus {
        self.step().status()
    }
}

// ── Structured generation types ────────────────────────────────────

/// The model's pick among the available problems.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct ProblemSelection {
    /// 1-based index into the list of available problems.
    pub problem_number: i64,
    /// Brief explanation of why this problem was selected.
    pub reasoning: String,
}

/// The model's analysis before writing code.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct ProblemAnalysis {
    /// Understanding of the problem.
    pub problem_understanding: String,
    /// Proposed solution approach.
    pub approach: String,
    /// Confidence level from 1 to 10.
    #[serde(default)]
    pub confidence: Option<i64>,
}

impl ProblemAnalysis {
    pub const DEFAULT_CONFIDENCE: u8 = 5;

    /// Confidence clamped to 1..=10, defaulting to 5 when omitted.
    pub fn confidence(&self) -> u8 {
        self.confidence
            .map_or(Self::DEFAULT_CONFIDENCE, |c| c.clamp(1, 10) as u8)
    }
}

/// The generated solution.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct CodeSolution {
    /// Programming language: `python` or `cpp`.
    pub language: String,
    /// The complete solution code.
    pub code: String,
}

/// A validated solution ready for submission.
#[derive(Clone, Debug, PartialEq)]
pub struct SolutionArtifact {
    pub language: Language,
    pub code: String,
}

impl SolutionArtifact {
    /// Validate generated output: the language must be supported and the
    /// trimmed code at least `min_chars` long.
    pub fn from_generated(solution: CodeSolution, min_chars: usize) -> Result<Self, StepError> {
        let len = solution.code.trim().chars().count();
        if len < min_chars {
            return Err(StepError::SolutionTooShort {
                len,
                min: min_chars,
            });
        }
        let language = solution
            .language
            .parse::<Language>()
            .map_err(StepError::UnsupportedLanguage)?;
        Ok(Self {
            language,
            code: solution.code,
        })
    }
}

// ── Workflow state ─────────────────────────────────────────────────

/// Mutable state threaded through one agent's steps. Owned exclusively by
/// its engine run.
#[derive(Clone, Debug)]
pub struct WorkflowState {
    pub contest_id: String,
    pub participant_id: String,
    pub current_step: Step,
    history: Vec<Message>,
    /// Last-fetched contest metadata.
    pub contest: Option<Contest>,
    pub remaining_seconds: u64,
    /// Candidate problems for selection.
    pub problems: Vec<Problem>,
    pub current_problem: Option<Problem>,
    pub solved: BTreeSet<String>,
    pub submitted: BTreeSet<String>,
    pub error: Option<String>,
    pub solution: Option<SolutionArtifact>,
}

impl WorkflowState {
    pub fn new(
        contest_id: impl Into<String>,
        participant_id: impl Into<String>,
        problems: Vec<Problem>,
    ) -> Self {
        Self {
            contest_id: contest_id.into(),
            participant_id: participant_id.into(),
            current_step: Step::Initializing,
            history: Vec::new(),
            contest: None,
            remaining_seconds: 0,
            problems,
            current_problem: None,
            solved: BTreeSet::new(),
            submitted: BTreeSet::new(),
            error: None,
            solution: None,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Append to history, dropping the oldest messages past the cap.
    pub fn push_history(&mut self, message: Message) {
        self.history.push(message);
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - HISTORY_TRIM_TO;
            self.history.drain(..excess);
        }
    }

    /// Record a solved problem. Returns `false` if it was already solved.
    pub fn mark_solved(&mut self, problem_id: &str) -> bool {
        self.submitted.insert(problem_id.to_string());
        self.solved.insert(problem_id.to_string())
    }

    /// Record a submitted problem. Returns `false` if already recorded.
    pub fn mark_submitted(&mut self, problem_id: &str) -> bool {
        self.submitted.insert(problem_id.to_string())
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Candidates neither solved nor waiting on a verdict, in original order.
    pub fn available_problems(&self, pending: &HashSet<String>) -> Vec<Problem> {
        self.problems
            .iter()
            .filter(|p| !self.solved.contains(&p.id) && !pending.contains(&p.id))
            .cloned()
            .collect()
    }

    /// Every known problem is solved (false when none are known).
    pub fn all_solved(&self) -> bool {
        !self.problems.is_empty() && self.problems.iter().all(|p| self.solved.contains(&p.id))
    }

    /// Recompute remaining time from the cached contest end.
    pub fn refresh_remaining(&mut self, now: DateTime<Utc>) {
        if let Some(contest) = &self.contest {
            self.remaining_seconds = remaining_seconds(contest.ends_at, now);
        }
    }
}
