//! The agent table and the event sink that keeps it current.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::Shared;
use super::broadcast::StatusEvent;
use crate::workflow::{AgentStatus, EventHandler, Step, Terminal, WorkflowEvent};

/// Snapshot of one agent, as returned by status queries.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AgentTask {
    pub id: String,
    pub contest_id: String,
    pub participant_id: String,
    pub model_name: String,
    pub status: AgentStatus,
    pub current_step: String,
    pub current_problem: Option<String>,
    pub problems_solved: usize,
    pub problems_attempted: usize,
    pub started_at: DateTime<Utc>,
    /// Set exactly when `status` is terminal.
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl AgentTask {
    pub fn new(
        id: impl Into<String>,
        contest_id: impl Into<String>,
        participant_id: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            contest_id: contest_id.into(),
            participant_id: participant_id.into(),
            model_name: model_name.into(),
            status: AgentStatus::Initializing,
            current_step: Step::Initializing.as_str().to_string(),
            current_problem: None,
            problems_solved: 0,
            problems_attempted: 0,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn status_event(&self) -> StatusEvent {
        StatusEvent {
            agent_id: self.id.clone(),
            contest_id: self.contest_id.clone(),
            participant_id: self.participant_id.clone(),
            model_name: self.model_name.clone(),
            status: self.status,
            current_step: self.current_step.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Move to `step`'s status. Terminal statuses stamp `completed_at`.
    fn set_step(&mut self, step: Step) {
        self.current_step = step.as_str().to_string();
        self.status = step.status();
        if self.status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Conjunctive list filter. `None` matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentFilter {
    pub contest_id: Option<String>,
    pub status: Option<AgentStatus>,
}

impl AgentFilter {
    pub fn contest(contest_id: impl Into<String>) -> Self {
        Self {
            contest_id: Some(contest_id.into()),
            status: None,
        }
    }

    pub fn matches(&self, task: &AgentTask) -> bool {
        self.contest_id
            .as_deref()
            .is_none_or(|c| c == task.contest_id)
            && self.status.is_none_or(|s| s == task.status)
    }
}

pub(crate) struct Entry {
    pub task: AgentTask,
    pub cancel: CancellationToken,
}

/// The agent table. Guarded by one mutex in [`Shared`]; no method awaits.
#[derive(Default)]
pub(crate) struct Registry {
    agents: HashMap<String, Entry>,
}

impl Registry {
    pub fn insert(&mut self, task: AgentTask, cancel: CancellationToken) {
        self.agents.insert(task.id.clone(), Entry { task, cancel });
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.agents.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Entry> {
        self.agents.remove(id)
    }

    /// The non-terminal agent for a (contest, participant) pair, if any.
    pub fn live_for(&self, contest_id: &str, participant_id: &str) -> Option<&AgentTask> {
        self.agents
            .values()
            .map(|e| &e.task)
            .find(|t| {
                !t.is_terminal() && t.contest_id == contest_id && t.participant_id == participant_id
            })
    }

    /// Matching agents, oldest first.
    pub fn list(&self, filter: &AgentFilter) -> Vec<AgentTask> {
        let mut tasks: Vec<AgentTask> = self
            .agents
            .values()
            .map(|e| e.task.clone())
            .filter(|t| filter.matches(t))
            .collect();
        tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        tasks
    }

    pub fn live_tokens(&self) -> Vec<CancellationToken> {
        self.agents
            .values()
            .filter(|e| !e.task.is_terminal())
            .map(|e| e.cancel.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn retain_live(&mut self) -> usize {
        let before = self.agents.len();
        self.agents.retain(|_, e| !e.task.is_terminal());
        before - self.agents.len()
    }

    /// Apply a workflow step change. Ignored once the agent is terminal.
    pub fn apply_step(&mut self, id: &str, step: Step) -> Option<StatusEvent> {
        let task = &mut self.agents.get_mut(id)?.task;
        if task.is_terminal() {
            return None;
        }
        task.set_step(step);
        Some(task.status_event())
    }

    /// Mutate a live agent's snapshot without a status change.
    pub fn update(&mut self, id: &str, f: impl FnOnce(&mut AgentTask)) {
        if let Some(entry) = self.agents.get_mut(id) {
            if !entry.task.is_terminal() {
                f(&mut entry.task);
            }
        }
    }

    /// Record the end of a run. Never overwrites an earlier terminal status.
    pub fn finish(
        &mut self,
        id: &str,
        terminal: Terminal,
        error: Option<String>,
    ) -> Option<StatusEvent> {
        let task = &mut self.agents.get_mut(id)?.task;
        if task.is_terminal() {
            return None;
        }
        if error.is_some() {
            task.error_message = error;
        }
        task.set_step(terminal.step());
        Some(task.status_event())
    }
}

/// Keeps one agent's registry entry in step with its workflow events and
/// publishes a [`StatusEvent`] for every status change.
pub(crate) struct RegistrySink {
    agent_id: String,
    shared: Arc<Shared>,
}

impl RegistrySink {
    pub fn new(agent_id: impl Into<String>, shared: Arc<Shared>) -> Self {
        Self {
            agent_id: agent_id.into(),
            shared,
        }
    }
}

impl EventHandler for RegistrySink {
    fn on_event(&self, event: &WorkflowEvent<'_>) {
        let id = self.agent_id.as_str();
        match event {
            WorkflowEvent::StepChanged { to, .. } => {
                let mut registry = self.shared.registry();
                if let Some(status) = registry.apply_step(id, *to) {
                    self.shared.broadcaster.publish(&status);
                }
            }
            WorkflowEvent::ProblemSelected { problem, .. } => {
                self.shared
                    .registry()
                    .update(id, |t| t.current_problem = Some(problem.id.clone()));
            }
            WorkflowEvent::Progress { solved, submitted } => {
                self.shared.registry().update(id, |t| {
                    t.problems_solved = *solved;
                    t.problems_attempted = *submitted;
                });
            }
            WorkflowEvent::StepFailed { error, .. } => {
                self.shared
                    .registry()
                    .update(id, |t| t.error_message = Some(error.to_string()));
            }
            WorkflowEvent::ContestEnded { .. } => {
                self.shared
                    .registry()
                    .update(id, |t| t.error_message = Some("Contest ended".into()));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(id: &str, contest: &str, participant: &str) -> Registry {
        let mut r = Registry::default();
        r.insert(
            AgentTask::new(id, contest, participant, "m"),
            CancellationToken::new(),
        );
        r
    }

    #[test]
    fn terminal_step_sets_completed_at() {
        let mut r = registry_with("a", "c1", "p1");
        let ev = r.apply_step("a", Step::Coding).unwrap();
        assert_eq!(ev.status, AgentStatus::Coding);
        assert!(r.get("a").unwrap().task.completed_at.is_none());

        let ev = r.apply_step("a", Step::NoProblems).unwrap();
        assert_eq!(ev.status, AgentStatus::Completed);
        assert_eq!(ev.current_step, "no_problems");
        assert!(r.get("a").unwrap().task.completed_at.is_some());
    }

    #[test]
    fn terminal_status_is_never_overwritten() {
        let mut r = registry_with("a", "c1", "p1");
        assert!(r.finish("a", Terminal::Stopped, Some("user".into())).is_some());
        assert!(r.apply_step("a", Step::Coding).is_none());
        assert!(r.finish("a", Terminal::Completed, None).is_none());
        let task = &r.get("a").unwrap().task;
        assert_eq!(task.status, AgentStatus::Stopped);
        assert_eq!(task.error_message.as_deref(), Some("user"));
    }

    #[test]
    fn live_lookup_ignores_terminal_agents() {
        let mut r = registry_with("a", "c1", "p1");
        assert_eq!(r.live_for("c1", "p1").map(|t| t.id.as_str()), Some("a"));
        r.finish("a", Terminal::Completed, None);
        assert!(r.live_for("c1", "p1").is_none());
    }

    #[test]
    fn filters_are_conjunctive() {
        let mut r = registry_with("a", "c1", "p1");
        r.insert(AgentTask::new("b", "c2", "p1", "m"), CancellationToken::new());
        r.apply_step("b", Step::Coding);

        let by_contest = r.list(&AgentFilter::contest("c2"));
        assert_eq!(by_contest.len(), 1);

        let both = r.list(&AgentFilter {
            contest_id: Some("c2".into()),
            status: Some(AgentStatus::Initializing),
        });
        assert!(both.is_empty());
        assert_eq!(r.list(&AgentFilter::default()).len(), 2);
    }
}
