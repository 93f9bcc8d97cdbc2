//! Orchestration core for fleets of LLM-driven contest participants.
//!
//! `contest-agent` runs many independent, long-lived participant agents. Each
//! agent drives one (contest, participant) pair through a step state machine
//! (analyze the contest, pick a problem, solve it, submit, check the verdict,
//! watch the clock) against an external contest service and an
//! [OpenRouter](https://openrouter.ai/) generation provider, until the
//! contest ends or the time budget runs out.
//!
//! The hard part is not any single prompt, it is the orchestration: the
//! [`WorkflowEngine`](workflow::WorkflowEngine) state machine, the
//! [`Supervisor`](supervisor::Supervisor) that runs dozens of them
//! concurrently with cooperative cancellation, the
//! [`Broadcaster`](supervisor::Broadcaster) that fans status changes out to
//! observers, retry with backoff around every provider call, and bounded
//! conversation context.
//!
//! # Getting started
//!
//! ```ignore
//! use contest_agent::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default();
//!     let api_key = std::env::var("OPENROUTER_KEY")?;
//!
//!     let supervisor = Supervisor::new(
//!         settings.supervisor_config(),
//!         Arc::new(HttpContestConnector::new(settings.contest_timeout)),
//!         Arc::new(OpenRouterFactory::new(api_key, &settings)?),
//!     );
//!
//!     let created = supervisor.create_agent(CreateAgentRequest {
//!         contest_id: "c1".into(),
//!         participant_id: "p1".into(),
//!         model_name: "openai/gpt-4".into(),
//!         contest_host: "localhost:50051".into(),
//!         problems: vec![],
//!     })?;
//!
//!     let mut stream = supervisor.stream_status(Some("c1".into()));
//!     while let Some(event) = stream.next().await {
//!         println!("{} -> {}", event.agent_id, event.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`workflow`] | [`WorkflowEngine`](workflow::WorkflowEngine) step state machine, transition predicates, workflow events |
//! | [`supervisor`] | [`Supervisor`](supervisor::Supervisor) registry and lifecycle, [`Broadcaster`](supervisor::Broadcaster) fan-out |
//! | [`api`] | [`GenerationProvider`](api::GenerationProvider) seam, OpenRouter provider, retry with backoff |
//! | [`context`] | [`ContextWindow`](context::ContextWindow) history trimming against a token budget |
//! | [`contest`] | Contest domain types, [`ContestService`](contest::ContestService) client, LLM tools |
//! | [`config`] | [`Settings`](config::Settings) with defaults for every component |
//! | [`error`] | Typed errors for providers, the contest service, steps and the supervisor |

pub mod api;
pub mod config;
pub mod contest;
pub mod context;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod supervisor;
pub mod tools;
pub mod workflow;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub use error::ProviderError;

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for agents that don't name one.
pub const DEFAULT_MODEL: &str = "openai/gpt-4";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Used both for tool parameter schemas and for
/// structured-output response formats.
///
/// # Example
///
/// ```
/// use contest_agent::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ViewProblemArgs {
///     problem_id: String,
/// }
///
/// let schema = json_schema_for::<ViewProblemArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"problem_id".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// JSON output format type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ResponseFormatType {
    #[serde(rename = "json_object")]
    JsonObject,
    #[serde(rename = "json_schema")]
    JsonSchema,
}

/// JSON output mode, optionally constrained by a named schema.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub fmt_type: ResponseFormatType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<JsonSchemaFormat>,
}

impl ResponseFormat {
    /// Constrain the response to the given schema.
    pub fn schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            fmt_type: ResponseFormatType::JsonSchema,
            json_schema: Some(JsonSchemaFormat {
                name: name.into(),
                schema,
            }),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub schema: serde_json::Value,
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Text content, or `""` for tool-call-only messages.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Whether this is a plain human or assistant turn (no tool plumbing).
    pub fn is_conversational(&self) -> bool {
        matches!(self.role, MessageRole::User | MessageRole::Assistant)
            && self.tool_calls.is_none()
            && self.content.is_some()
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

impl ChatCompletion {
    /// A text-only completion.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
///
/// One client (and its connection pool) is shared by every agent; the
/// per-model binding lives in [`OpenRouterProvider`](api::OpenRouterProvider).
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("contest-agent/0.4")
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: "https://github.com/tacryt-socryp/contest-agent".into(),
            title: "contest-agent".into(),
        })
    }

    /// Send a chat completion request.
    ///
    /// HTTP 429 becomes [`ProviderError::RateLimited`]; client-side timeouts
    /// and 408/504 become [`ProviderError::Timeout`]. Both are retryable.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, ProviderError> {
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.tools.as_ref().map_or(0, |t| t.len()),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(OPENROUTER_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(classify_transport_error)?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), text));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        if let Some(err) = parsed.error {
            let code = err
                .code
                .as_ref()
                .and_then(|c| c.as_u64().or_else(|| c.as_str()?.parse().ok()))
                .unwrap_or(0);
            return Err(classify_status(code as u16, err.message));
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        match choice {
            Some(c) => {
                debug!(
                    "LLM output: {} chars text, {} tool call(s)",
                    c.message.content.as_ref().map_or(0, |s| s.len()),
                    c.message.tool_calls.as_ref().map_or(0, |t| t.len())
                );
                Ok(ChatCompletion {
                    content: c.message.content,
                    tool_calls: c.message.tool_calls.unwrap_or_default(),
                    usage: parsed.usage,
                    finish_reason: c.finish_reason,
                })
            }
            None => {
                debug!("LLM output: empty (no choices)");
                Ok(ChatCompletion {
                    usage: parsed.usage,
                    ..Default::default()
                })
            }
        }
    }
}

fn classify_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Transport(e.to_string())
    }
}

/// Map a non-success HTTP status (or an in-body error code) to a typed error.
pub(crate) fn classify_status(status: u16, message: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited(message),
        408 | 504 => ProviderError::Timeout(message),
        _ => ProviderError::Api { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("hello"));

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);

        let tool = Message::tool_result("call-1", "result");
        assert_eq!(tool.role, MessageRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn conversational_excludes_tool_plumbing() {
        assert!(Message::user("hi").is_conversational());
        assert!(Message::assistant_text("hello").is_conversational());
        assert!(!Message::system("rules").is_conversational());
        assert!(!Message::tool_result("c1", "data").is_conversational());
        let call = ToolCall::function("c1", "view_contest", "{}");
        assert!(!Message::assistant_tool_calls(vec![call]).is_conversational());
    }

    #[test]
    fn chat_request_skips_none_fields() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 100,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("temperature").is_none());
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn schema_response_format_serializes() {
        let format = ResponseFormat::schema("pick", serde_json::json!({"type": "object"}));
        let json = serde_json::to_value(&format).unwrap();
        assert_eq!(json["type"], "json_schema");
        assert_eq!(json["json_schema"]["name"], "pick");
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(429, "slow down".into()),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(504, "gateway".into()),
            ProviderError::Timeout(_)
        ));
        assert!(matches!(
            classify_status(400, "bad".into()),
            ProviderError::Api { status: 400, .. }
        ));
    }
}
