//! The generation-provider seam and its OpenRouter implementation.
//!
//! Workflow steps never talk to an HTTP client directly. They go through a
//! [`GenerationProvider`] (wrapped in a
//! [`ResilientProvider`](super::ResilientProvider) for retries), which keeps
//! the engine testable with scripted providers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use schemars::JsonSchema;
use tracing::debug;

use crate::config::Settings;
use crate::{
    ChatCompletion, ChatRequest, Message, OpenRouterClient, ProviderError, ResponseFormat,
    ToolDef, UsageInfo, json_schema_for,
};

/// Boxed future returned by [`GenerationProvider`] methods.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// A named JSON schema for structured generation.
#[derive(Debug, Clone)]
pub struct StructuredSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl StructuredSchema {
    /// Derive the schema from a Rust type.
    pub fn for_type<T: JsonSchema>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: json_schema_for::<T>(),
        }
    }

    /// Validate a value against the schema. An unusable schema skips validation.
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), ProviderError> {
        let validator = match jsonschema::validator_for(&self.schema) {
            Ok(v) => v,
            Err(_) => return Ok(()),
        };

        let errors: Vec<String> = validator
            .iter_errors(value)
            .map(|e| format!("{}: {e}", e.instance_path()))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::InvalidStructuredOutput {
                schema: self.name.clone(),
                reason: errors.join("; "),
            })
        }
    }
}

/// A structured response before it is validated and deserialized.
#[derive(Debug, Clone)]
pub struct StructuredOutput {
    pub value: serde_json::Value,
    pub usage: Option<UsageInfo>,
}

/// A language-generation backend bound to one model.
///
/// Uses boxed futures so the trait is dyn-compatible; agents hold an
/// `Arc<dyn GenerationProvider>`.
pub trait GenerationProvider: Send + Sync {
    /// Model identifier, used as a log label.
    fn model(&self) -> &str;

    /// Free-form generation, optionally offering tools.
    fn generate<'a>(
        &'a self,
        messages: &'a [Message],
        tools: Option<&'a [ToolDef]>,
    ) -> ProviderFuture<'a, ChatCompletion>;

    /// Generation constrained to a JSON schema.
    fn generate_json<'a>(
        &'a self,
        messages: &'a [Message],
        schema: &'a StructuredSchema,
    ) -> ProviderFuture<'a, StructuredOutput>;
}

/// Builds a provider for a model name at agent-creation time.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, model_name: &str) -> Result<Arc<dyn GenerationProvider>, ProviderError>;
}

// ── OpenRouter ─────────────────────────────────────────────────────

/// [`GenerationProvider`] over the OpenRouter chat completions API.
pub struct OpenRouterProvider {
    client: Arc<OpenRouterClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenRouterProvider {
    pub fn new(
        client: Arc<OpenRouterClient>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    fn request(&self, messages: &[Message]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
            ..Default::default()
        }
    }
}

impl GenerationProvider for OpenRouterProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        messages: &'a [Message],
        tools: Option<&'a [ToolDef]>,
    ) -> ProviderFuture<'a, ChatCompletion> {
        Box::pin(async move {
            let mut body = self.request(messages);
            body.tools = tools.filter(|t| !t.is_empty()).map(|t| t.to_vec());
            self.client.chat(&body).await
        })
    }

    fn generate_json<'a>(
        &'a self,
        messages: &'a [Message],
        schema: &'a StructuredSchema,
    ) -> ProviderFuture<'a, StructuredOutput> {
        Box::pin(async move {
            let mut body = self.request(messages);
            body.response_format = Some(ResponseFormat::schema(
                schema.name.clone(),
                schema.schema.clone(),
            ));
            let completion = self.client.chat(&body).await?;
            let content = completion.content.unwrap_or_default();
            let value = parse_json_content(&content)?;
            debug!("[{}] structured output `{}` parsed", self.model, schema.name);
            Ok(StructuredOutput {
                value,
                usage: completion.usage,
            })
        })
    }
}

/// Parse model output as JSON, tolerating a surrounding markdown code fence.
pub(crate) fn parse_json_content(content: &str) -> Result<serde_json::Value, ProviderError> {
    let trimmed = content.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.split_once('\n').map_or("", |(_, body)| body);
            rest.trim_end().strip_suffix("```").unwrap_or(rest)
        }
        None => trimmed,
    };
    if body.trim().is_empty() {
        return Err(ProviderError::InvalidResponse(
            "empty structured response".into(),
        ));
    }
    serde_json::from_str(body.trim())
        .map_err(|e| ProviderError::InvalidResponse(format!("response is not JSON: {e}")))
}

/// [`ProviderFactory`] sharing one OpenRouter client across all agents.
pub struct OpenRouterFactory {
    client: Arc<OpenRouterClient>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenRouterFactory {
    pub fn new(api_key: impl Into<String>, settings: &Settings) -> Result<Self, ProviderError> {
        let client = OpenRouterClient::new(api_key, settings.request_timeout)?;
        Ok(Self {
            client: Arc::new(client),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }
}

impl ProviderFactory for OpenRouterFactory {
    fn create(&self, model_name: &str) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        if model_name.trim().is_empty() {
            return Err(ProviderError::Config("model name must not be empty".into()));
        }
        Ok(Arc::new(OpenRouterProvider::new(
            self.client.clone(),
            model_name,
            self.temperature,
            self.max_tokens,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Pick {
        problem_number: i64,
        reasoning: String,
    }

    #[test]
    fn parses_plain_json() {
        let v = parse_json_content(r#" {"a": 1} "#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn parses_fenced_json() {
        let v = parse_json_content("```json\n{\"a\": 2}\n```").unwrap();
        assert_eq!(v["a"], 2);
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            parse_json_content("I pick problem 2"),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(parse_json_content("   ").is_err());
    }

    #[test]
    fn schema_validation_reports_violations() {
        let schema = StructuredSchema::for_type::<Pick>("pick");
        assert!(
            schema
                .validate(&serde_json::json!({"problem_number": 2, "reasoning": "easy"}))
                .is_ok()
        );
        let err = schema
            .validate(&serde_json::json!({"problem_number": "two"}))
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::InvalidStructuredOutput { ref schema, .. } if schema == "pick"
        ));
    }

    #[test]
    fn factory_rejects_blank_model() {
        let factory = OpenRouterFactory::new("key", &Settings::default()).unwrap();
        assert!(factory.create("  ").is_err());
        assert_eq!(factory.create("openai/gpt-4").unwrap().model(), "openai/gpt-4");
    }
}
