//! Pure transition decisions. Each function inspects the state a step left
//! behind and names the next step or the terminal outcome.

use super::state::{Step, Terminal, WorkflowState};

/// What the engine does after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    Step(Step),
    Finish(Terminal),
}

/// Decision taken at the end of each cycle.
///
/// Ends the run when the contest is over, time is short, or nothing is left
/// to solve. An outstanding error sends the agent back to selection; a clean
/// cycle goes on to monitoring.
pub fn should_continue(state: &WorkflowState, min_remaining_seconds: u64) -> Next {
    if state.current_step == Step::ContestEnded {
        return Next::Finish(Terminal::ContestEnded);
    }
    if state.remaining_seconds <= min_remaining_seconds {
        return Next::Finish(Terminal::Completed);
    }
    if state.all_solved() {
        return Next::Finish(Terminal::Completed);
    }
    if state.error.is_some() {
        return Next::Step(Step::SelectingProblem);
    }
    Next::Step(Step::MonitoringContest)
}

pub fn after_analysis(state: &WorkflowState) -> Next {
    match state.current_step {
        Step::ContestEnded => Next::Finish(Terminal::ContestEnded),
        _ => Next::Step(Step::SelectingProblem),
    }
}

pub fn after_selection(state: &WorkflowState, min_remaining_seconds: u64) -> Next {
    match state.current_step {
        Step::NoProblems => Next::Finish(Terminal::Completed),
        Step::ContestEnded => Next::Finish(Terminal::ContestEnded),
        _ if state.current_problem.is_some() => Next::Step(Step::SolvingProblem),
        _ => should_continue(state, min_remaining_seconds),
    }
}

pub fn after_solving(state: &WorkflowState, min_remaining_seconds: u64) -> Next {
    if state.current_step == Step::ContestEnded {
        return Next::Finish(Terminal::ContestEnded);
    }
    if state.solution.is_some() {
        Next::Step(Step::SubmittingSolution)
    } else {
        should_continue(state, min_remaining_seconds)
    }
}

/// Checking follows unconditionally unless the contest is over.
pub fn after_submission(state: &WorkflowState) -> Next {
    match state.current_step {
        Step::ContestEnded => Next::Finish(Terminal::ContestEnded),
        _ => Next::Step(Step::CheckingResults),
    }
}

pub fn after_check(state: &WorkflowState, min_remaining_seconds: u64) -> Next {
    should_continue(state, min_remaining_seconds)
}

pub fn after_monitor(state: &WorkflowState, min_remaining_seconds: u64) -> Next {
    if state.current_step == Step::ContestEnded {
        return Next::Finish(Terminal::ContestEnded);
    }
    if state.remaining_seconds <= min_remaining_seconds {
        return Next::Finish(Terminal::Completed);
    }
    Next::Step(Step::SelectingProblem)
}

/// Map a 1-based selection onto `available` candidates.
pub fn selection_index(problem_number: i64, available: usize) -> Option<usize> {
    usize::try_from(problem_number)
        .ok()
        .filter(|n| (1..=available).contains(n))
        .map(|n| n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::problem;

    fn state() -> WorkflowState {
        let mut state =
            WorkflowState::new("c1", "p1", vec![problem("a", "A"), problem("b", "B")]);
        state.remaining_seconds = 600;
        state.current_step = Step::CheckingResults;
        state
    }

    #[test]
    fn clean_cycle_goes_to_monitoring() {
        assert_eq!(
            should_continue(&state(), 20),
            Next::Step(Step::MonitoringContest)
        );
    }

    #[test]
    fn error_goes_back_to_selection() {
        let mut s = state();
        s.set_error("wrong answer");
        assert_eq!(should_continue(&s, 20), Next::Step(Step::SelectingProblem));
    }

    #[test]
    fn low_time_or_all_solved_completes() {
        let mut s = state();
        s.remaining_seconds = 20;
        assert_eq!(should_continue(&s, 20), Next::Finish(Terminal::Completed));

        let mut s = state();
        s.mark_solved("a");
        s.mark_solved("b");
        s.set_error("ignored");
        assert_eq!(should_continue(&s, 20), Next::Finish(Terminal::Completed));
    }

    #[test]
    fn contest_ended_wins() {
        let mut s = state();
        s.current_step = Step::ContestEnded;
        s.remaining_seconds = 0;
        assert_eq!(should_continue(&s, 20), Next::Finish(Terminal::ContestEnded));
        assert_eq!(after_submission(&s), Next::Finish(Terminal::ContestEnded));
        assert_eq!(after_monitor(&s, 20), Next::Finish(Terminal::ContestEnded));
    }

    #[test]
    fn selection_outcomes() {
        let mut s = state();
        s.current_step = Step::NoProblems;
        assert_eq!(after_selection(&s, 20), Next::Finish(Terminal::Completed));

        let mut s = state();
        s.current_step = Step::SelectingProblem;
        s.current_problem = Some(problem("a", "A"));
        assert_eq!(after_selection(&s, 20), Next::Step(Step::SolvingProblem));
    }

    #[test]
    fn solving_without_artifact_reevaluates() {
        let mut s = state();
        s.current_step = Step::Coding;
        s.set_error("too short");
        assert_eq!(after_solving(&s, 20), Next::Step(Step::SelectingProblem));
    }

    #[test]
    fn monitor_short_circuits_on_low_time() {
        let mut s = state();
        s.current_step = Step::MonitoringContest;
        assert_eq!(after_monitor(&s, 20), Next::Step(Step::SelectingProblem));
        s.remaining_seconds = 15;
        assert_eq!(after_monitor(&s, 20), Next::Finish(Terminal::Completed));
    }

    #[test]
    fn selection_index_bounds() {
        assert_eq!(selection_index(1, 3), Some(0));
        assert_eq!(selection_index(3, 3), Some(2));
        assert_eq!(selection_index(0, 3), None);
        assert_eq!(selection_index(4, 3), None);
        assert_eq!(selection_index(-1, 3), None);
    }
}
