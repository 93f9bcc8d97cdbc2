//! Read-only contest tools offered to the model while it picks a problem.
//!
//! Every tool is scoped to one contest (and, for submissions, one
//! participant) so the model can't look at other contests or at other
//! participants' code.

use std::fmt::Write as _;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use super::core::{Tool, ToolFuture, ToolSet, parse_tool_args};
use crate::contest::ContestService;
use crate::{ToolDef, json_schema_for};

/// Arguments for tools that take none.
#[derive(Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Deserialize, JsonSchema)]
pub struct ViewProblemArgs {
    /// The ID of the problem to view.
    pub problem_id: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ViewSubmissionsArgs {
    /// Only show submissions for this problem.
    #[serde(default)]
    pub problem_id: Option<String>,
}

/// The full read-only tool set for one agent.
pub fn contest_tools(
    service: Arc<dyn ContestService>,
    contest_id: &str,
    participant_id: &str,
) -> ToolSet {
    ToolSet::new()
        .with(ViewContestTool::new(service.clone(), contest_id))
        .with(ViewProblemTool::new(service.clone(), contest_id))
        .with(ViewLeaderboardTool::new(service.clone(), contest_id))
        .with(ViewSubmissionsTool::new(service, contest_id, participant_id))
}

// ── view_contest ───────────────────────────────────────────────────

pub struct ViewContestTool {
    service: Arc<dyn ContestService>,
    contest_id: String,
}

impl ViewContestTool {
    pub fn new(service: Arc<dyn ContestService>, contest_id: impl Into<String>) -> Self {
        Self {
            service,
            contest_id: contest_id.into(),
        }
    }
}

impl Tool for ViewContestTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "view_contest",
            "Get general information about the contest: state, schedule, problems and participants.",
            json_schema_for::<NoArgs>(),
        )
    }

    fn execute(&self, _arguments: &str) -> ToolFuture<'_> {
        Box::pin(async move {
            let contest = match self.service.get_contest(&self.contest_id).await {
                Ok(c) => c,
                Err(e) => return format!("Error: {e}"),
            };

            let mut out = String::new();
            let _ = writeln!(out, "Contest ID: {}", contest.id);
            let _ = writeln!(out, "State: {:?}", contest.state);
            let _ = writeln!(out, "Started: {}", contest.started_at.format("%Y-%m-%d %H:%M:%S"));
            let _ = writeln!(out, "Ends: {}", contest.ends_at.format("%Y-%m-%d %H:%M:%S"));
            let _ = writeln!(out, "\nProblems ({}):", contest.problems.len());
            for (i, p) in contest.problems.iter().enumerate() {
                let _ = writeln!(out, "{}. {} (ID: {})", i + 1, p.name, p.id);
            }
            let _ = writeln!(out, "\nParticipants ({}):", contest.participants.len());
            for (i, p) in contest.participants.iter().enumerate() {
                let _ = writeln!(out, "{}. {} (ID: {})", i + 1, p.model_name, p.id);
            }
            out
        })
    }
}

// ── view_problem ───────────────────────────────────────────────────

pub struct ViewProblemTool {
    service: Arc<dyn ContestService>,
    contest_id: String,
}

impl ViewProblemTool {
    pub fn new(service: Arc<dyn ContestService>, contest_id: impl Into<String>) -> Self {
        Self {
            service,
            contest_id: contest_id.into(),
        }
    }
}

impl Tool for ViewProblemTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "view_problem",
            "Get the statement and limits of one problem.",
            json_schema_for::<ViewProblemArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<ViewProblemArgs>(arguments);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return e,
            };
            let contest = match self.service.get_contest(&self.contest_id).await {
                Ok(c) => c,
                Err(e) => return format!("Error: {e}"),
            };
            match contest.problem(&args.problem_id) {
                Some(p) => format!(
                    "Problem: {}\nID: {}\nTime Limit: {}ms\nMemory Limit: {}MB\n\nDescription:\n{}",
                    p.name, p.id, p.time_limit_ms, p.memory_limit_mb, p.description
                ),
                None => format!("Error: problem {} not found in contest", args.problem_id),
            }
        })
    }
}

// ── view_leaderboard ───────────────────────────────────────────────

pub struct ViewLeaderboardTool {
    service: Arc<dyn ContestService>,
    contest_id: String,
}

impl ViewLeaderboardTool {
    pub fn new(service: Arc<dyn ContestService>, contest_id: impl Into<String>) -> Self {
        Self {
            service,
            contest_id: contest_id.into(),
        }
    }
}

impl Tool for ViewLeaderboardTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "view_leaderboard",
            "Get the current leaderboard: rank, solved count and penalty per participant.",
            json_schema_for::<NoArgs>(),
        )
    }

    fn execute(&self, _arguments: &str) -> ToolFuture<'_> {
        Box::pin(async move {
            let mut rows = match self.service.get_leaderboard(&self.contest_id).await {
                Ok(rows) => rows,
                Err(e) => return format!("Error: {e}"),
            };
            if rows.is_empty() {
                return "No leaderboard data available.".into();
            }
            rows.sort_by_key(|p| p.result.rank);

            let mut out = String::from("Rank | Participant | Solved | Penalty\n");
            for p in &rows {
                let _ = writeln!(
                    out,
                    "{:4} | {} | {:6} | {:7}",
                    p.result.rank, p.model_name, p.result.solved, p.result.total_penalty_seconds
                );
            }
            out
        })
    }
}

// ── view_submissions ───────────────────────────────────────────────

pub struct ViewSubmissionsTool {
    service: Arc<dyn ContestService>,
    contest_id: String,
    participant_id: String,
}

impl ViewSubmissionsTool {
    pub fn new(
        service: Arc<dyn ContestService>,
        contest_id: impl Into<String>,
        participant_id: impl Into<String>,
    ) -> Self {
        Self {
            service,
            contest_id: contest_id.into(),
            participant_id: participant_id.into(),
        }
    }
}

impl Tool for ViewSubmissionsTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "view_submissions",
            "List your own submissions and verdicts, optionally for one problem.",
            json_schema_for::<ViewSubmissionsArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let args = parse_tool_args::<ViewSubmissionsArgs>(arguments);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return e,
            };
            let submissions = match self
                .service
                .get_submissions(
                    &self.contest_id,
                    &self.participant_id,
                    args.problem_id.as_deref(),
                )
                .await
            {
                Ok(s) => s,
                Err(e) => return format!("Error: {e}"),
            };
            if submissions.is_empty() {
                return "No submissions found.".into();
            }

            let mut out = String::from("Time | Problem | Language | Status\n");
            for s in &submissions {
                let _ = writeln!(
                    out,
                    "{} | {} | {} | {:?}",
                    s.submitted_at.format("%H:%M:%S"),
                    s.problem_id,
                    s.language,
                    s.status
                );
                if !s.verdict_message.is_empty() {
                    let _ = writeln!(out, "  Verdict: {}", s.verdict_message);
                }
            }
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::{Language, SubmissionStatus};
    use crate::test_support::{InMemoryContest, problem};

    fn service() -> Arc<InMemoryContest> {
        Arc::new(InMemoryContest::running(
            "c1",
            vec![problem("p1", "A + B"), problem("p2", "Graphs")],
        ))
    }

    #[tokio::test]
    async fn view_contest_lists_problems() {
        let tools = contest_tools(service(), "c1", "me");
        let out = tools.execute("view_contest", "{}").await;
        assert!(out.contains("1. A + B (ID: p1)"), "{out}");
        assert!(out.contains("2. Graphs (ID: p2)"), "{out}");
    }

    #[tokio::test]
    async fn view_problem_unknown_id() {
        let tools = contest_tools(service(), "c1", "me");
        let out = tools
            .execute("view_problem", r#"{"problem_id":"zz"}"#)
            .await;
        assert_eq!(out, "Error: problem zz not found in contest");
        let out = tools
            .execute("view_problem", r#"{"problem_id":"p2"}"#)
            .await;
        assert!(out.starts_with("Problem: Graphs"));
    }

    #[tokio::test]
    async fn view_submissions_is_scoped_to_participant() {
        let svc = service();
        svc.add_submission("me", "p1", Language::Python, SubmissionStatus::Accepted);
        svc.add_submission("rival", "p2", Language::Cpp, SubmissionStatus::WrongAnswer);
        let tools = contest_tools(svc, "c1", "me");

        let out = tools.execute("view_submissions", "{}").await;
        assert!(out.contains("p1"), "{out}");
        assert!(!out.contains("p2"), "{out}");
    }

    #[tokio::test]
    async fn service_errors_become_error_strings() {
        let svc = service();
        svc.end_contest();
        let tools = contest_tools(svc, "other", "me");
        let out = tools.execute("view_leaderboard", "{}").await;
        assert!(out.starts_with("Error:"), "{out}");
    }
}
