//! Typed errors for the generation provider, the contest service, workflow
//! steps and the supervisor.

/// Phrases the contest service uses when a contest no longer accepts work.
///
/// Matched case-insensitively on substrings. This is a fallback for services
/// that don't send the structured `contest_ended` error code and is tied to
/// their exact wording.
pub const CONTEST_ENDED_PHRASES: &[&str] = &[
    "contest is not accepting submissions",
    "contest has ended",
    "contest is finished",
    "contest not found",
];

/// Whether an error message uses the contest-ended vocabulary.
pub fn mentions_contest_ended(message: &str) -> bool {
    let lower = message.to_lowercase();
    CONTEST_ENDED_PHRASES.iter().any(|p| lower.contains(p))
}

/// Failure of a generation-provider call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    #[error("provider request timed out: {0}")]
    Timeout(String),
    #[error("provider API HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("structured output did not match `{schema}`: {reason}")]
    InvalidStructuredOutput { schema: String, reason: String },
    #[error("invalid provider configuration: {0}")]
    Config(String),
    #[error("gave up after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Rate limits and timeouts are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_) | ProviderError::Timeout(_))
    }
}

/// Failure of a contest-service call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContestError {
    #[error("contest ended: {0}")]
    ContestEnded(String),
    /// The contest itself is unknown. Missing problems or submissions are
    /// [`ContestError::Rejected`].
    #[error("contest not found: {0}")]
    NotFound(String),
    #[error("contest service unreachable: {0}")]
    Transport(String),
    #[error("contest service rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid contest service response: {0}")]
    InvalidResponse(String),
    #[error("cannot connect to contest service at `{host}`: {reason}")]
    Connect { host: String, reason: String },
}

impl ContestError {
    /// Whether the contest no longer accepts work. A missing contest counts.
    pub fn is_contest_ended(&self) -> bool {
        matches!(
            self,
            ContestError::ContestEnded(_) | ContestError::NotFound(_)
        )
    }
}

/// Token counting failed while building a context window.
#[derive(Debug, thiserror::Error)]
#[error("token counting failed: {0}")]
pub struct ContextError(pub String);

/// A workflow step failed. Steps record these as the agent's error message;
/// only [`StepError::is_contest_ended`] changes control flow.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Contest(#[from] ContestError),
    #[error("generated solution is too short ({len} chars, need at least {min})")]
    SolutionTooShort { len: usize, min: usize },
    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),
    #[error("no solution to submit")]
    NoSolution,
    #[error("no problem selected")]
    NoProblemSelected,
    #[error("no submission found for problem {0}")]
    NoSubmission(String),
}

impl StepError {
    pub fn is_contest_ended(&self) -> bool {
        matches!(self, StepError::Contest(e) if e.is_contest_ended())
    }
}

/// Supervisor operation failure.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("agent {0} not found")]
    NotFound(String),
    #[error("agent {0} is still running")]
    StillRunning(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Connect(#[from] ContestError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
