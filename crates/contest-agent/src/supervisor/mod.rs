//! Agent lifecycle: creation, status queries, cancellation and streaming.
//!
//! The [`Supervisor`] owns the agent table behind one mutex that is never
//! held across an `.await`. Each agent runs as its own Tokio task; a second
//! task awaits it so a panic is recorded as `FAILED` instead of leaving the
//! agent stuck. Status changes reach observers through the [`Broadcaster`].
//!
//! # Example
//!
//! ```ignore
//! let supervisor = Supervisor::new(config, connector, providers);
//! let created = supervisor.create_agent(request)?;
//! let task = supervisor.get_status(&created.agent_id)?;
//! supervisor.stop_agent(&created.agent_id, "operator request")?;
//! ```

pub mod broadcast;
pub mod registry;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use broadcast::{Broadcaster, DEFAULT_SUBSCRIBER_CAPACITY, StatusEvent, Subscription};
pub use registry::{AgentFilter, AgentTask};

use self::registry::{Registry, RegistrySink};
use crate::DEFAULT_MODEL;
use crate::api::ProviderFactory;
use crate::contest::{ContestConnector, Problem};
use crate::error::SupervisorError;
use crate::workflow::{
    AgentStatus, CompositeEventHandler, LoggingHandler, Terminal, WorkflowConfig, WorkflowEngine,
    WorkflowState,
};

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub workflow: WorkflowConfig,
    /// Workflows allowed to run at once; the rest wait in `INITIALIZING`.
    pub max_concurrent_agents: usize,
    pub subscriber_capacity: usize,
    /// Used when a create request leaves the model blank.
    pub default_model: String,
    /// Used when a create request leaves the host blank.
    pub default_contest_host: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowConfig::default(),
            max_concurrent_agents: 10,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            default_model: DEFAULT_MODEL.to_string(),
            default_contest_host: "localhost:50051".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CreateAgentRequest {
    pub contest_id: String,
    pub participant_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub contest_host: String,
    /// Candidate problems; empty means every problem in the contest.
    #[serde(default)]
    pub problems: Vec<Problem>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CreateAgentResponse {
    pub agent_id: String,
    pub status: AgentStatus,
    pub message: String,
    /// `false` when a live agent for the pair already existed.
    pub created: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StopAgentResponse {
    pub agent_id: String,
    pub success: bool,
    pub message: String,
}

/// State shared between the supervisor and every agent's event sink.
///
/// Status events are published while the registry lock is held, so
/// subscribers see changes in the order they were applied. Lock order is
/// registry, then the broadcaster's subscriber list; publishing never waits
/// on a subscriber.
pub(crate) struct Shared {
    registry: Mutex<Registry>,
    pub(crate) broadcaster: Broadcaster,
}

impl Shared {
    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Finish an agent and publish the resulting status, if it changed.
    fn finish(&self, id: &str, terminal: Terminal, error: Option<String>) {
        let mut registry = self.registry();
        if let Some(event) = registry.finish(id, terminal, error) {
            self.broadcaster.publish(&event);
        }
    }
}

/// Runs and tracks agents. Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
    connector: Arc<dyn ContestConnector>,
    providers: Arc<dyn ProviderFactory>,
    config: Arc<SupervisorConfig>,
    permits: Arc<Semaphore>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        connector: Arc<dyn ContestConnector>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                broadcaster: Broadcaster::new(config.subscriber_capacity),
            }),
            connector,
            providers,
            permits: Arc::new(Semaphore::new(config.max_concurrent_agents.max(1))),
            config: Arc::new(config),
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.shared.broadcaster
    }

    /// Start an agent for a (contest, participant) pair.
    ///
    /// Connecting to the contest host and building the provider happen
    /// here; either failing is returned and no agent is created. If the pair
    /// already has a live agent its id is returned instead. Must be called
    /// from within a Tokio runtime.
    pub fn create_agent(
        &self,
        request: CreateAgentRequest,
    ) -> Result<CreateAgentResponse, SupervisorError> {
        let contest_id = request.contest_id.trim().to_string();
        let participant_id = request.participant_id.trim().to_string();
        if contest_id.is_empty() || participant_id.is_empty() {
            return Err(SupervisorError::InvalidRequest(
                "contest_id and participant_id are required".into(),
            ));
        }
        let model_name = non_blank(&request.model_name, &self.config.default_model);
        let host = non_blank(&request.contest_host, &self.config.default_contest_host);

        if let Some(existing) = self.existing(&contest_id, &participant_id) {
            return Ok(existing);
        }

        let contest = self.connector.connect(&host).map_err(|e| {
            error!("Failed to connect to contest service at {host}: {e}");
            e
        })?;
        let provider = self.providers.create(&model_name)?;

        let agent_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        {
            let mut registry = self.shared.registry();
            if let Some(live) = registry.live_for(&contest_id, &participant_id) {
                return Ok(already_running(live));
            }
            registry.insert(
                AgentTask::new(&agent_id, &contest_id, &participant_id, &model_name),
                cancel.clone(),
            );
        }

        let handler = CompositeEventHandler::new()
            .with(LoggingHandler::new(model_name.as_str()))
            .with(RegistrySink::new(&agent_id, self.shared.clone()));
        let engine = WorkflowEngine::new(provider, contest, self.config.workflow.clone())
            .with_event_handler(Arc::new(handler))
            .with_cancellation(cancel.clone());
        let state = WorkflowState::new(&contest_id, &participant_id, request.problems);

        let permits = self.permits.clone();
        let run = tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.acquire_owned() => permit.ok(),
            };
            let _permit = permit?;
            Some(engine.run(state).await)
        });

        let shared = self.shared.clone();
        let id = agent_id.clone();
        tokio::spawn(async move {
            let (terminal, error) = match run.await {
                Ok(Some(outcome)) => (outcome.terminal, outcome.error),
                Ok(None) => (Terminal::Stopped, None),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    error!("Agent {id} panicked: {message}");
                    (Terminal::Failed, Some(format!("workflow panicked: {message}")))
                }
                Err(e) => (Terminal::Failed, Some(e.to_string())),
            };
            shared.finish(&id, terminal, error);
        });

        info!(
            "Created agent {agent_id} for contest {contest_id}, participant {participant_id} ({model_name})"
        );
        Ok(CreateAgentResponse {
            agent_id,
            status: AgentStatus::Initializing,
            message: "Agent created".into(),
            created: true,
        })
    }

    fn existing(&self, contest_id: &str, participant_id: &str) -> Option<CreateAgentResponse> {
        self.shared
            .registry()
            .live_for(contest_id, participant_id)
            .map(already_running)
    }

    pub fn get_status(&self, agent_id: &str) -> Result<AgentTask, SupervisorError> {
        self.shared
            .registry()
            .get(agent_id)
            .map(|e| e.task.clone())
            .ok_or_else(|| SupervisorError::NotFound(agent_id.to_string()))
    }

    pub fn list_agents(&self, filter: &AgentFilter) -> Vec<AgentTask> {
        self.shared.registry().list(filter)
    }

    /// Request cooperative cancellation and mark the agent `STOPPED`.
    /// Stopping a terminal agent succeeds without changing it.
    pub fn stop_agent(
        &self,
        agent_id: &str,
        reason: &str,
    ) -> Result<StopAgentResponse, SupervisorError> {
        {
            let mut registry = self.shared.registry();
            let entry = registry
                .get(agent_id)
                .ok_or_else(|| SupervisorError::NotFound(agent_id.to_string()))?;
            if entry.task.is_terminal() {
                return Ok(StopAgentResponse {
                    agent_id: agent_id.to_string(),
                    success: true,
                    message: format!("Agent already {}", entry.task.status),
                });
            }
            entry.cancel.cancel();
            if let Some(event) = registry.finish(agent_id, Terminal::Stopped, None) {
                self.shared.broadcaster.publish(&event);
            }
        }

        info!("Stopped agent {agent_id}: {reason}");
        Ok(StopAgentResponse {
            agent_id: agent_id.to_string(),
            success: true,
            message: "Agent stopped".into(),
        })
    }

    /// Current statuses of matching agents, then live events until dropped.
    ///
    /// The subscription is taken before the snapshot, so an event may be
    /// seen twice but is never missed.
    pub fn stream_status(&self, contest_id: Option<String>) -> StatusStream {
        let filter = AgentFilter {
            contest_id: contest_id.clone(),
            status: None,
        };
        // Snapshot and subscribe under one lock so nothing is missed or replayed twice.
        let registry = self.shared.registry();
        let live = self.shared.broadcaster.subscribe(contest_id);
        let replay = registry
            .list(&filter)
            .iter()
            .map(AgentTask::status_event)
            .collect();
        StatusStream { replay, live }
    }

    /// Remove a terminal agent from the table.
    pub fn purge_agent(&self, agent_id: &str) -> Result<AgentTask, SupervisorError> {
        let mut registry = self.shared.registry();
        match registry.get(agent_id).map(|e| e.task.is_terminal()) {
            Some(true) => registry
                .remove(agent_id)
                .map(|e| e.task)
                .ok_or_else(|| SupervisorError::NotFound(agent_id.to_string())),
            Some(false) => Err(SupervisorError::StillRunning(agent_id.to_string())),
            None => Err(SupervisorError::NotFound(agent_id.to_string())),
        }
    }

    /// Remove every terminal agent. Returns how many were removed.
    pub fn purge_finished(&self) -> usize {
        self.shared.registry().retain_live()
    }

    /// Stop every live agent.
    pub fn shutdown(&self, reason: &str) {
        let live: Vec<String> = self
            .list_agents(&AgentFilter::default())
            .into_iter()
            .filter(|t| !t.is_terminal())
            .map(|t| t.id)
            .collect();
        if !live.is_empty() {
            warn!("Shutting down {} live agent(s): {reason}", live.len());
        }
        for id in live {
            if let Err(e) = self.stop_agent(&id, reason) {
                warn!("Failed to stop agent {id}: {e}");
            }
        }
        self.permits.close();
    }

    pub fn agent_count(&self) -> usize {
        self.shared.registry().len()
    }

    pub fn live_count(&self) -> usize {
        self.shared.registry().live_tokens().len()
    }
}

fn non_blank(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() { default } else { trimmed }.to_string()
}

fn already_running(task: &AgentTask) -> CreateAgentResponse {
    CreateAgentResponse {
        agent_id: task.id.clone(),
        status: task.status,
        message: "Agent already running for this participant".into(),
        created: false,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Replayed snapshot followed by live [`StatusEvent`]s.
pub struct StatusStream {
    replay: VecDeque<StatusEvent>,
    live: Subscription,
}

impl Stream for StatusStream {
    type Item = StatusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StatusEvent>> {
        if let Some(event) = self.replay.pop_front() {
            return Poll::Ready(Some(event));
        }
        Pin::new(&mut self.live).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{GenerationProvider, ProviderFuture, StructuredOutput, StructuredSchema};
    use crate::test_support::{
        FixedProviderFactory, InMemoryConnector, InMemoryContest, ScriptedProvider, problem,
    };
    use crate::{ChatCompletion, Message, ToolDef};
    use futures::StreamExt;
    use std::time::Duration;

    fn config(max_concurrent: usize) -> SupervisorConfig {
        SupervisorConfig {
            workflow: WorkflowConfig::immediate(),
            max_concurrent_agents: max_concurrent,
            ..SupervisorConfig::default()
        }
    }

    fn supervisor_with(provider: Arc<dyn GenerationProvider>, max_concurrent: usize) -> Supervisor {
        let contest = Arc::new(InMemoryContest::running("c1", vec![problem("p1", "A + B")]));
        Supervisor::new(
            config(max_concurrent),
            Arc::new(InMemoryConnector::new(contest)),
            Arc::new(FixedProviderFactory::new(provider)),
        )
    }

    fn slow_supervisor(max_concurrent: usize) -> Supervisor {
        supervisor_with(
            Arc::new(ScriptedProvider::new("m").with_delay(Duration::from_secs(30))),
            max_concurrent,
        )
    }

    fn request(participant: &str) -> CreateAgentRequest {
        CreateAgentRequest {
            contest_id: "c1".into(),
            participant_id: participant.into(),
            model_name: "m".into(),
            contest_host: "localhost:50051".into(),
            problems: vec![],
        }
    }

    async fn wait_for(supervisor: &Supervisor, id: &str, pred: impl Fn(&AgentTask) -> bool) -> AgentTask {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let task = supervisor.get_status(id).unwrap();
                if pred(&task) {
                    return task;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("agent did not reach the expected state")
    }

    #[tokio::test]
    async fn agent_runs_to_completion() {
        let supervisor = supervisor_with(Arc::new(ScriptedProvider::new("m")), 10);
        let created = supervisor.create_agent(request("p1")).unwrap();
        assert!(created.created);
        assert_eq!(created.status, AgentStatus::Initializing);

        let task = wait_for(&supervisor, &created.agent_id, AgentTask::is_terminal).await;
        assert_eq!(task.status, AgentStatus::Completed);
        assert!(task.completed_at.is_some());
        assert_eq!(task.problems_solved, 1);
        assert_eq!(task.problems_attempted, 1);
        assert_eq!(task.current_problem.as_deref(), Some("p1"));
        assert!(task.error_message.is_none());
    }

    #[tokio::test]
    async fn connection_failure_creates_nothing() {
        let supervisor = Supervisor::new(
            config(10),
            Arc::new(InMemoryConnector::refusing()),
            Arc::new(FixedProviderFactory::new(Arc::new(ScriptedProvider::new("m")))),
        );
        let err = supervisor.create_agent(request("p1")).unwrap_err();
        assert!(matches!(err, SupervisorError::Connect(_)), "{err}");
        assert!(supervisor.list_agents(&AgentFilter::default()).is_empty());
    }

    #[tokio::test]
    async fn blank_ids_are_rejected() {
        let supervisor = slow_supervisor(10);
        let err = supervisor.create_agent(request("  ")).unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn live_pair_reuses_existing_agent() {
        let supervisor = slow_supervisor(10);
        let first = supervisor.create_agent(request("p1")).unwrap();
        let second = supervisor.create_agent(request("p1")).unwrap();
        assert_eq!(first.agent_id, second.agent_id);
        assert!(!second.created);
        assert_eq!(supervisor.agent_count(), 1);

        supervisor.stop_agent(&first.agent_id, "test").unwrap();
        let third = supervisor.create_agent(request("p1")).unwrap();
        assert_ne!(third.agent_id, first.agent_id);
        supervisor.shutdown("test over");
    }

    #[tokio::test]
    async fn stop_while_running_is_prompt_and_sticky() {
        let supervisor = slow_supervisor(10);
        let created = supervisor.create_agent(request("p1")).unwrap();
        let id = created.agent_id;
        wait_for(&supervisor, &id, |t| t.status == AgentStatus::SelectingProblem).await;

        let stopped = supervisor.stop_agent(&id, "operator").unwrap();
        assert!(stopped.success);

        let task = supervisor.get_status(&id).unwrap();
        assert_eq!(task.status, AgentStatus::Stopped);
        assert!(task.completed_at.is_some());

        // The cancelled run unwinds without overwriting the status.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(supervisor.get_status(&id).unwrap().status, AgentStatus::Stopped);

        let again = supervisor.stop_agent(&id, "again").unwrap();
        assert!(again.success);
        assert!(matches!(
            supervisor.stop_agent("missing", "x"),
            Err(SupervisorError::NotFound(_))
        ));
    }

    #[test]
    fn last_status_event_matches_registry_under_contention() {
        use crate::workflow::{EventHandler, Step, WorkflowEvent};

        for round in 0..200 {
            let shared = Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                broadcaster: Broadcaster::new(1024),
            });
            let id = format!("a{round}");
            shared
                .registry()
                .insert(AgentTask::new(&id, "c1", "p1", "m"), CancellationToken::new());
            let mut sub = shared.broadcaster.subscribe(None);

            let sink = RegistrySink::new(id.clone(), shared.clone());
            let stepper = std::thread::spawn(move || {
                for _ in 0..50 {
                    sink.on_event(&WorkflowEvent::StepChanged {
                        from: Step::SelectingProblem,
                        to: Step::Coding,
                    });
                }
            });
            shared.finish(&id, Terminal::Stopped, None);
            stepper.join().unwrap();

            let mut last = None;
            while let Some(event) = sub.try_recv() {
                last = Some(event.status);
            }
            let status = shared.registry().get(&id).unwrap().task.status;
            assert_eq!(status, AgentStatus::Stopped);
            assert_eq!(last, Some(status), "round {round}");
        }
    }

    #[tokio::test]
    async fn stream_replays_then_follows() {
        let supervisor = slow_supervisor(10);
        let created = supervisor.create_agent(request("p1")).unwrap();
        wait_for(&supervisor, &created.agent_id, |t| {
            t.status == AgentStatus::SelectingProblem
        })
        .await;

        let mut stream = supervisor.stream_status(Some("c1".into()));
        let first = stream.next().await.unwrap();
        assert_eq!(first.agent_id, created.agent_id);
        assert_eq!(first.status, AgentStatus::SelectingProblem);

        supervisor.stop_agent(&created.agent_id, "done").unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.status, AgentStatus::Stopped);

        let mut other = supervisor.stream_status(Some("c2".into()));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), other.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn concurrency_limit_queues_agents() {
        let supervisor = slow_supervisor(1);
        let first = supervisor.create_agent(request("p1")).unwrap();
        let second = supervisor.create_agent(request("p2")).unwrap();
        wait_for(&supervisor, &first.agent_id, |t| {
            t.status == AgentStatus::SelectingProblem
        })
        .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = supervisor.get_status(&second.agent_id).unwrap();
        assert_eq!(waiting.status, AgentStatus::Initializing);

        supervisor.stop_agent(&first.agent_id, "make room").unwrap();
        wait_for(&supervisor, &second.agent_id, |t| {
            t.status != AgentStatus::Initializing
        })
        .await;
        supervisor.shutdown("test over");
    }

    #[tokio::test]
    async fn purge_only_terminal_agents() {
        let supervisor = slow_supervisor(10);
        let created = supervisor.create_agent(request("p1")).unwrap();
        assert!(matches!(
            supervisor.purge_agent(&created.agent_id),
            Err(SupervisorError::StillRunning(_))
        ));

        supervisor.stop_agent(&created.agent_id, "done").unwrap();
        let purged = supervisor.purge_agent(&created.agent_id).unwrap();
        assert_eq!(purged.status, AgentStatus::Stopped);
        assert!(matches!(
            supervisor.get_status(&created.agent_id),
            Err(SupervisorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn purge_finished_keeps_live_agents() {
        let supervisor = slow_supervisor(10);
        let a = supervisor.create_agent(request("p1")).unwrap();
        let _b = supervisor.create_agent(request("p2")).unwrap();
        supervisor.stop_agent(&a.agent_id, "done").unwrap();

        assert_eq!(supervisor.purge_finished(), 1);
        assert_eq!(supervisor.agent_count(), 1);
        assert_eq!(supervisor.live_count(), 1);
        supervisor.shutdown("test over");
        assert_eq!(supervisor.live_count(), 0);
    }

    struct PanickingProvider;

    fn explode<T>() -> Result<T, crate::ProviderError> {
        panic!("provider exploded")
    }

    impl GenerationProvider for PanickingProvider {
        fn model(&self) -> &str {
            "boom"
        }

        fn generate<'a>(
            &'a self,
            _messages: &'a [Message],
            _tools: Option<&'a [ToolDef]>,
        ) -> ProviderFuture<'a, ChatCompletion> {
            Box::pin(async { explode() })
        }

        fn generate_json<'a>(
            &'a self,
            _messages: &'a [Message],
            _schema: &'a StructuredSchema,
        ) -> ProviderFuture<'a, StructuredOutput> {
            Box::pin(async { explode() })
        }
    }

    #[tokio::test]
    async fn panicking_workflow_is_marked_failed() {
        let supervisor = supervisor_with(Arc::new(PanickingProvider), 10);
        let created = supervisor.create_agent(request("p1")).unwrap();

        let task = wait_for(&supervisor, &created.agent_id, AgentTask::is_terminal).await;
        assert_eq!(task.status, AgentStatus::Failed);
        let message = task.error_message.unwrap_or_default();
        assert!(message.contains("provider exploded"), "{message}");
    }
}
