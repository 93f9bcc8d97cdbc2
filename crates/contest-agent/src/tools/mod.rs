//! Tools the model may call during problem selection.
//!
//! [`core`] holds the [`Tool`] trait and [`ToolSet`] dispatcher;
//! [`contest`] holds the read-only contest tools built on
//! [`ContestService`](crate::contest::ContestService).

pub mod contest;
pub mod core;

pub use self::contest::{
    ViewContestTool, ViewLeaderboardTool, ViewProblemTool, ViewSubmissionsTool, contest_tools,
};
pub use self::core::{
    DEFAULT_MAX_RESULT_BYTES, Tool, ToolFuture, ToolSet, parse_tool_args, truncate_result,
    validate_tool_arguments,
};
