//! Tool abstraction for LLM function calling.
//!
//! The [`Tool`] trait defines what every tool implements: a static API
//! definition (name, description, JSON schema) and an async `execute`
//! method. Tools are collected into a [`ToolSet`] which handles dispatch,
//! argument validation, definition export and result truncation.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, trace};

use crate::ToolDef;

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 16_000;

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// A capability the model can call.
pub trait Tool: Send + Sync {
    /// The tool definition sent to the LLM API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Errors are returned as `"Error: ..."` strings; the result goes back
    /// to the model either way.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    /// The tool's name (convenience, delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// A collection of tools that can be dispatched by name.
///
/// # Example
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with(ViewContestTool::new(service.clone(), "c1"))
///     .with(ViewProblemTool::new(service.clone(), "c1"));
///
/// let defs = tools.definitions();
/// let result = tools.execute("view_problem", r#"{"problem_id":"p1"}"#).await;
/// ```
pub struct ToolSet {
    tools: BTreeMap<String, Box<dyn Tool>>,
    max_result_bytes: usize,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("max_result_bytes", &self.max_result_bytes)
            .finish()
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.insert(tool.name(), Box::new(tool));
        self
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for the API request, in name order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Dispatch a call by name. Unknown tools and invalid arguments produce
    /// an error string for the model rather than failing the step.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let tool = match self.tools.get(name) {
            Some(t) => t,
            None => return format!("Error: unknown tool '{name}'"),
        };

        if let Some(error) = validate_tool_arguments(tool.as_ref(), arguments) {
            return error;
        }

        log_tool_call(name, arguments);
        let start = std::time::Instant::now();
        let result = tool.execute(arguments).await;
        debug!(
            "[tool] {name} finished in {:.2}s ({} bytes)",
            start.elapsed().as_secs_f64(),
            result.len()
        );
        truncate_result(result, self.max_result_bytes)
    }
}

/// Validate raw arguments against the tool's parameter schema.
///
/// Returns `Some(error)` for the model to read, `None` when valid.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "Error: invalid JSON arguments for tool '{}': {e}. \
                 Please provide valid JSON matching the tool's parameter schema.",
                tool.name()
            ));
        }
    };

    let schema = tool.definition().function.parameters;
    let validator = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(_) => return None,
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Error: argument validation failed for tool '{}':\n{}\n\
             Please fix the arguments and try again.",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a result to at most `max` bytes, on a char boundary.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let total = s.len();
    let mut out = s;
    out.truncate(cut);
    out.push_str(&format!("...\n[truncated: {total} bytes total]"));
    out
}

/// Parse raw JSON arguments into a typed struct, or an error string for the
/// model.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments).map_err(|e| {
        format!(
            "Error: invalid tool arguments: {e}. \
             Please provide valid JSON matching the tool's parameter schema."
        )
    })
}
