//! In-memory fakes for the provider and contest seams.
//!
//! Compiled for this crate's tests and, behind the `test-support` feature,
//! for downstream integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::{
    GenerationProvider, ProviderFactory, ProviderFuture, StructuredOutput, StructuredSchema,
};
use crate::contest::{
    Contest, ContestConnector, ContestFuture, ContestService, ContestState, Language, Participant,
    ParticipantResult, Problem, Submission, SubmissionStatus, SubmitRequest,
};
use crate::error::ContestError;
use crate::{ChatCompletion, Message, ProviderError, ToolDef};

/// A problem with a short statement and default limits.
pub fn problem(id: &str, name: &str) -> Problem {
    Problem {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("Solve {name}."),
        time_limit_ms: 1000,
        memory_limit_mb: 256,
        tag: String::new(),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Scripted provider ──────────────────────────────────────────────

enum Scripted {
    Completion(ChatCompletion),
    Json(serde_json::Value),
    Error(ProviderError),
}

/// A [`GenerationProvider`] that replays queued responses in order.
///
/// Once the queue is empty it answers with a valid default: plain text for
/// free-form calls and a well-formed object for each structured schema the
/// workflow uses (select problem 1, a Python solution).
pub struct ScriptedProvider {
    model: String,
    queue: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    schemas: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            schemas: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then_completion(ChatCompletion::text(text))
    }

    pub fn then_completion(self, completion: ChatCompletion) -> Self {
        lock(&self.queue).push_back(Scripted::Completion(completion));
        self
    }

    pub fn then_json(self, value: serde_json::Value) -> Self {
        lock(&self.queue).push_back(Scripted::Json(value));
        self
    }

    pub fn then_error(self, error: ProviderError) -> Self {
        lock(&self.queue).push_back(Scripted::Error(error));
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls made so far, of either kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Schema names of the structured calls made so far.
    pub fn schemas(&self) -> Vec<String> {
        lock(&self.schemas).clone()
    }

    async fn next(&self) -> Option<Scripted> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        lock(&self.queue).pop_front()
    }

    fn default_json(schema: &str) -> serde_json::Value {
        match schema {
            "problem_selection" => serde_json::json!({
                "problem_number": 1,
                "reasoning": "first available",
            }),
            "problem_analysis" => serde_json::json!({
                "problem_understanding": "read input, compute, print",
                "approach": "direct simulation",
                "confidence": 7,
            }),
            "code_solution" => serde_json::json!({
                "language": "python",
                "code": "a, b = map(int, input().split())\nprint(a + b)\n",
            }),
            _ => serde_json::json!({}),
        }
    }
}

impl GenerationProvider for ScriptedProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        _messages: &'a [Message],
        _tools: Option<&'a [ToolDef]>,
    ) -> ProviderFuture<'a, ChatCompletion> {
        Box::pin(async move {
            match self.next().await {
                None => Ok(ChatCompletion::text("ok")),
                Some(Scripted::Completion(c)) => Ok(c),
                Some(Scripted::Json(v)) => Ok(ChatCompletion::text(v.to_string())),
                Some(Scripted::Error(e)) => Err(e),
            }
        })
    }

    fn generate_json<'a>(
        &'a self,
        _messages: &'a [Message],
        schema: &'a StructuredSchema,
    ) -> ProviderFuture<'a, StructuredOutput> {
        Box::pin(async move {
            lock(&self.schemas).push(schema.name.clone());
            let value = match self.next().await {
                None => Self::default_json(&schema.name),
                Some(Scripted::Json(v)) => v,
                Some(Scripted::Completion(c)) => {
                    let text = c.content.unwrap_or_default();
                    serde_json::from_str(&text).map_err(|e| {
                        ProviderError::InvalidResponse(format!("response is not JSON: {e}"))
                    })?
                }
                Some(Scripted::Error(e)) => return Err(e),
            };
            Ok(StructuredOutput { value, usage: None })
        })
    }
}

/// Hands out one shared provider for every model name except a blank one.
pub struct FixedProviderFactory {
    provider: Arc<dyn GenerationProvider>,
    created: Mutex<Vec<String>>,
}

impl FixedProviderFactory {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            provider,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Model names requested so far.
    pub fn created(&self) -> Vec<String> {
        lock(&self.created).clone()
    }
}

impl ProviderFactory for FixedProviderFactory {
    fn create(&self, model_name: &str) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        if model_name.trim().is_empty() {
            return Err(ProviderError::Config("model name must not be empty".into()));
        }
        lock(&self.created).push(model_name.to_string());
        Ok(self.provider.clone())
    }
}

// ── In-memory contest ──────────────────────────────────────────────

struct ContestData {
    contest: Contest,
    submissions: Vec<Submission>,
    verdicts: VecDeque<SubmissionStatus>,
    end_on_submit: bool,
    shorten_after_submit: Option<i64>,
    submit_failures: VecDeque<ContestError>,
    unreachable: bool,
}

/// A single-contest [`ContestService`] held in memory.
///
/// Submissions are judged instantly: each gets the next queued verdict, or
/// `ACCEPTED` when none is queued. Requests for any other contest id fail
/// with [`ContestError::NotFound`].
pub struct InMemoryContest {
    data: Mutex<ContestData>,
    calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

impl InMemoryContest {
    /// A running contest ending in one hour.
    pub fn running(id: &str, problems: Vec<Problem>) -> Self {
        let now = Utc::now();
        Self {
            data: Mutex::new(ContestData {
                contest: Contest {
                    id: id.to_string(),
                    state: ContestState::Running,
                    started_at: now,
                    ends_at: now + chrono::Duration::hours(1),
                    problems,
                    participants: Vec::new(),
                },
                submissions: Vec::new(),
                verdicts: VecDeque::new(),
                end_on_submit: false,
                shorten_after_submit: None,
                submit_failures: VecDeque::new(),
                unreachable: false,
            }),
            calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
        }
    }

    pub fn contest(&self) -> Contest {
        lock(&self.data).contest.clone()
    }

    pub fn add_participant(&self, id: &str, model_name: &str, rank: u32) {
        lock(&self.data).contest.participants.push(Participant {
            id: id.to_string(),
            model_name: model_name.to_string(),
            result: ParticipantResult {
                rank,
                ..Default::default()
            },
        });
    }

    /// Record an already-judged submission.
    pub fn add_submission(
        &self,
        participant_id: &str,
        problem_id: &str,
        language: Language,
        status: SubmissionStatus,
    ) {
        let mut data = lock(&self.data);
        let submission = Submission {
            id: format!("s{}", data.submissions.len() + 1),
            contest_id: data.contest.id.clone(),
            participant_id: participant_id.to_string(),
            problem_id: problem_id.to_string(),
            language,
            status,
            submitted_at: Utc::now(),
            verdict_message: String::new(),
            total_test_cases: 0,
            processed_test_cases: 0,
        };
        data.submissions.push(submission);
    }

    /// Verdicts for the next submissions, in order.
    pub fn queue_verdicts(&self, verdicts: impl IntoIterator<Item = SubmissionStatus>) {
        lock(&self.data).verdicts.extend(verdicts);
    }

    /// Mark the contest finished; later submissions are refused.
    pub fn end_contest(&self) {
        let mut data = lock(&self.data);
        data.contest.state = ContestState::Finished;
        data.contest.ends_at = Utc::now();
    }

    /// The next submission attempt ends the contest and is refused.
    pub fn end_on_submit(&self) {
        lock(&self.data).end_on_submit = true;
    }

    /// After each accepted submission request the contest ends `seconds`
    /// from then.
    pub fn shorten_after_submit(&self, seconds: i64) {
        lock(&self.data).shorten_after_submit = Some(seconds);
    }

    /// Refuse the next submission attempt with `error`. Queued failures are
    /// used up one per attempt before judging resumes.
    pub fn fail_next_submit(&self, error: ContestError) {
        lock(&self.data).submit_failures.push_back(error);
    }

    pub fn set_ends_at(&self, ends_at: DateTime<Utc>) {
        lock(&self.data).contest.ends_at = ends_at;
    }

    /// Make every call fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.data).unreachable = unreachable;
    }

    /// Service calls made so far, of any kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.data).submissions.clone()
    }

    /// Count the call and check reachability and the contest id.
    fn enter<'a>(&'a self, contest_id: &str) -> Result<std::sync::MutexGuard<'a, ContestData>, ContestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = lock(&self.data);
        if data.unreachable {
            return Err(ContestError::Transport("connection refused".into()));
        }
        if data.contest.id != contest_id {
            return Err(ContestError::NotFound(format!("contest {contest_id}")));
        }
        Ok(data)
    }

    fn submit_now(&self, request: &SubmitRequest) -> Result<Submission, ContestError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let mut data = self.enter(&request.contest_id)?;
        if data.end_on_submit {
            data.contest.state = ContestState::Finished;
            data.contest.ends_at = Utc::now();
        }
        if data.contest.state == ContestState::Finished {
            return Err(ContestError::ContestEnded("contest has ended".into()));
        }
        if let Some(error) = data.submit_failures.pop_front() {
            return Err(error);
        }
        if data.contest.problem(&request.problem_id).is_none() {
            return Err(ContestError::Rejected {
                status: 400,
                message: format!("unknown problem {}", request.problem_id),
            });
        }

        let status = data.verdicts.pop_front().unwrap_or(SubmissionStatus::Accepted);
        let submission = Submission {
            id: format!("s{}", data.submissions.len() + 1),
            contest_id: request.contest_id.clone(),
            participant_id: request.participant_id.clone(),
            problem_id: request.problem_id.clone(),
            language: request.language,
            status,
            submitted_at: Utc::now(),
            verdict_message: String::new(),
            total_test_cases: 10,
            processed_test_cases: 10,
        };
        data.submissions.push(submission.clone());
        if let Some(seconds) = data.shorten_after_submit {
            data.contest.ends_at = Utc::now() + chrono::Duration::seconds(seconds);
        }
        Ok(submission)
    }
}

impl ContestService for InMemoryContest {
    fn get_contest<'a>(&'a self, contest_id: &'a str) -> ContestFuture<'a, Contest> {
        let result = self.enter(contest_id).map(|data| data.contest.clone());
        Box::pin(async move { result })
    }

    fn get_submissions<'a>(
        &'a self,
        contest_id: &'a str,
        participant_id: &'a str,
        problem_id: Option<&'a str>,
    ) -> ContestFuture<'a, Vec<Submission>> {
        let result = self.enter(contest_id).map(|data| {
            data.submissions
                .iter()
                .filter(|s| s.participant_id == participant_id)
                .filter(|s| problem_id.is_none_or(|p| s.problem_id == p))
                .cloned()
                .collect()
        });
        Box::pin(async move { result })
    }

    fn submit_solution<'a>(&'a self, request: &'a SubmitRequest) -> ContestFuture<'a, Submission> {
        let result = self.submit_now(request);
        Box::pin(async move { result })
    }

    fn get_leaderboard<'a>(&'a self, contest_id: &'a str) -> ContestFuture<'a, Vec<Participant>> {
        let result = self.enter(contest_id).map(|data| data.contest.participants.clone());
        Box::pin(async move { result })
    }
}

/// Connects every host to the same [`InMemoryContest`], or refuses all.
pub struct InMemoryConnector {
    service: Option<Arc<InMemoryContest>>,
    hosts: Mutex<Vec<String>>,
}

impl InMemoryConnector {
    pub fn new(service: Arc<InMemoryContest>) -> Self {
        Self {
            service: Some(service),
            hosts: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing() -> Self {
        Self {
            service: None,
            hosts: Mutex::new(Vec::new()),
        }
    }

    /// Hosts connected to so far.
    pub fn hosts(&self) -> Vec<String> {
        lock(&self.hosts).clone()
    }
}

impl ContestConnector for InMemoryConnector {
    fn connect(&self, host: &str) -> Result<Arc<dyn ContestService>, ContestError> {
        match &self.service {
            Some(service) => {
                lock(&self.hosts).push(host.to_string());
                Ok(service.clone())
            }
            None => Err(ContestError::Connect {
                host: host.to_string(),
                reason: "connection refused".into(),
            }),
        }
    }
}
