//! Prompt text for each generation call.

use std::fmt::Write as _;

use super::state::{ProblemAnalysis, WorkflowState};
use crate::contest::{Contest, Problem};

pub(crate) fn contest_summary(contest: &Contest, remaining_seconds: u64) -> String {
    format!(
        "Contest analysis complete:\n\
         - Contest ID: {}\n\
         - Problems: {}\n\
         - Time remaining: {remaining_seconds} seconds\n\
         - Contest ends at: {}",
        contest.id,
        contest.problems.len(),
        contest.ends_at.to_rfc3339()
    )
}

/// Research prompt sent with the read-only tools before selecting.
pub(crate) fn selection_research(state: &WorkflowState, available: &[Problem]) -> String {
    let solved: Vec<&str> = state.solved.iter().map(String::as_str).collect();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "You are competing in a programming contest and must choose the next problem to solve."
    );
    let _ = writeln!(out, "\nContest ID: {}", state.contest_id);
    let _ = writeln!(out, "Time remaining: {} seconds", state.remaining_seconds);
    let _ = writeln!(
        out,
        "Problems solved: {}/{} [{}]",
        solved.len(),
        state.problems.len(),
        solved.join(", ")
    );
    let _ = writeln!(out, "\nAvailable problems:");
    for (i, p) in available.iter().enumerate() {
        let _ = writeln!(out, "{}. {} (ID: {})", i + 1, p.name, p.id);
    }
    let _ = writeln!(
        out,
        "\nUse view_problem, view_leaderboard, view_submissions and view_contest to judge \
         difficulty. Weigh what other participants have solved, the statements, and the \
         time left."
    );
    out
}

pub(crate) fn selection(available: usize) -> String {
    format!(
        "Select the next problem to solve. Available problems are numbered 1 to {available}. \
         Respond with the problem number and a short reasoning."
    )
}

fn statement(problem: &Problem) -> String {
    format!(
        "Problem: {}\nDescription: {}\nTime Limit: {}ms\nMemory Limit: {}MB",
        problem.name, problem.description, problem.time_limit_ms, problem.memory_limit_mb
    )
}

/// History entry recorded when a problem is chosen.
pub(crate) fn selected(problem: &Problem, reasoning: &str) -> String {
    format!(
        "Selected problem: {} (ID: {})\nSelection reasoning: {reasoning}\n\n{}",
        problem.name,
        problem.id,
        statement(problem)
    )
}

pub(crate) fn analysis(problem: &Problem) -> String {
    format!(
        "Analyze this competitive programming problem.\n\n{}\n\n\
         Provide your understanding of the problem, a solution approach, and your \
         confidence from 1 to 10.",
        statement(problem)
    )
}

pub(crate) fn analysis_note(analysis: &ProblemAnalysis) -> String {
    format!(
        "Analysis: {}\nApproach: {}\nConfidence: {}/10",
        analysis.problem_understanding,
        analysis.approach,
        analysis.confidence()
    )
}

pub(crate) fn solution(problem: &Problem) -> String {
    format!(
        "Implement a solution for this problem based on the analysis.\n\n{}\n\n\
         Requirements:\n\
         - Use `cpp` when execution speed matters, `python` when implementation speed matters\n\
         - Read from stdin and write to stdout\n\
         - Include every header or import the program needs\n\
         - Handle edge cases within the limits\n\n\
         Return the complete, runnable program.",
        statement(problem)
    )
}
