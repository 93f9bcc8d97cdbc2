//! Contest-service domain types, as exchanged over the wire.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a contest still accepts submissions.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContestState {
    Running,
    Finished,
}

/// A problem statement.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Problem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub time_limit_ms: u64,
    #[serde(default)]
    pub memory_limit_mb: u64,
    #[serde(default)]
    pub tag: String,
}

/// Per-problem standing of a participant.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemStatus {
    Accepted,
    Tried,
    NonTried,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProblemResult {
    pub status: ProblemStatus,
    #[serde(default)]
    pub penalty_count: u32,
    #[serde(default)]
    pub penalty_seconds: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ParticipantResult {
    #[serde(default)]
    pub solved: u32,
    #[serde(default)]
    pub total_penalty_seconds: u64,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub problem_results: HashMap<String, ProblemResult>,
}

/// A leaderboard row.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub result: ParticipantResult,
}

/// Contest metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Contest {
    pub id: String,
    pub state: ContestState,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl Contest {
    /// Whole seconds until the contest ends, never negative.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        remaining_seconds(self.ends_at, now)
    }

    pub fn problem(&self, id: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }
}

/// `max(0, ends_at - now)` in whole seconds.
pub fn remaining_seconds(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (ends_at - now).num_seconds().max(0) as u64
}

/// Submission language accepted by the judge.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    Python,
    Cpp,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Cpp => write!(f, "cpp"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            other => Err(other.to_string()),
        }
    }
}

/// Judging status of a submission.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    Compiling,
    Running,
    Accepted,
    WrongAnswer,
    PresentationError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
    OutputLimitExceeded,
    JudgementFailed,
}

impl SubmissionStatus {
    /// Still queued or being judged.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            SubmissionStatus::Pending | SubmissionStatus::Compiling | SubmissionStatus::Running
        )
    }
}

/// A submitted solution and its verdict.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Submission {
    pub id: String,
    pub contest_id: String,
    pub participant_id: String,
    pub problem_id: String,
    pub language: Language,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub verdict_message: String,
    #[serde(default)]
    pub total_test_cases: u32,
    #[serde(default)]
    pub processed_test_cases: u32,
}

/// Body of a submit request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubmitRequest {
    pub contest_id: String,
    pub participant_id: String,
    pub problem_id: String,
    pub code: String,
    pub language: Language,
}
