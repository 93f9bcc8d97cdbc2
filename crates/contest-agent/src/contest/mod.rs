//! The external contest service: domain types and the client seam.
//!
//! The contest service owns problems, judging and the leaderboard. Agents
//! only see it through [`ContestService`]; [`ContestConnector`] builds one
//! client per agent at creation time, which is the only place a contest
//! failure is fatal.

pub mod client;
pub mod types;

pub use client::{
    ContestConnector, ContestFuture, ContestService, HttpContestClient, HttpContestConnector,
};
pub use types::{
    Contest, ContestState, Language, Participant, ParticipantResult, Problem, ProblemResult,
    ProblemStatus, Submission, SubmissionStatus, SubmitRequest, remaining_seconds,
};
