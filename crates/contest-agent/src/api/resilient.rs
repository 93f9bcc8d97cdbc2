//! Retry-wrapped provider access used by every workflow step.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::provider::{GenerationProvider, StructuredSchema};
use super::retry::{RetryConfig, invoke_with_retry};
use crate::{ChatCompletion, Message, ProviderError, ToolDef, UsageInfo};

/// A [`GenerationProvider`] behind [`invoke_with_retry`].
///
/// Rate limits and timeouts are retried with backoff; structured responses
/// are validated against their schema before deserialization. Token usage
/// is logged and otherwise ignored.
#[derive(Clone)]
pub struct ResilientProvider {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryConfig,
}

impl ResilientProvider {
    pub fn new(provider: Arc<dyn GenerationProvider>, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Free-form generation with optional tools.
    pub async fn generate(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDef]>,
    ) -> Result<ChatCompletion, ProviderError> {
        let completion = invoke_with_retry(&self.retry, self.model(), || {
            self.provider.generate(messages, tools)
        })
        .await?;
        self.log_usage(completion.usage.as_ref());
        Ok(completion)
    }

    /// Generation constrained to `T`'s JSON schema, validated and decoded.
    pub async fn generate_structured<T>(
        &self,
        messages: &[Message],
        name: &str,
    ) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = StructuredSchema::for_type::<T>(name);
        let output = invoke_with_retry(&self.retry, self.model(), || {
            self.provider.generate_json(messages, &schema)
        })
        .await?;
        self.log_usage(output.usage.as_ref());

        schema.validate(&output.value)?;
        serde_json::from_value(output.value).map_err(|e| ProviderError::InvalidStructuredOutput {
            schema: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn log_usage(&self, usage: Option<&UsageInfo>) {
        if let Some(usage) = usage {
            debug!(
                "[{}] Token usage: prompt={}, completion={}, total={}",
                self.model(),
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Pick {
        problem_number: i64,
    }

    fn instant_retry() -> RetryConfig {
        RetryConfig::immediate()
    }

    #[tokio::test]
    async fn structured_call_retries_then_decodes() {
        let scripted = Arc::new(
            ScriptedProvider::new("m")
                .then_error(ProviderError::RateLimited("429".into()))
                .then_json(serde_json::json!({"problem_number": 2})),
        );
        let resilient = ResilientProvider::new(scripted.clone(), instant_retry());

        let pick: Pick = resilient
            .generate_structured(&[Message::user("pick")], "pick")
            .await
            .unwrap();
        assert_eq!(pick.problem_number, 2);
        assert_eq!(scripted.calls(), 2);
    }

    #[tokio::test]
    async fn schema_violation_is_not_retried() {
        let scripted = Arc::new(
            ScriptedProvider::new("m").then_json(serde_json::json!({"problem_number": "two"})),
        );
        let resilient = ResilientProvider::new(scripted.clone(), instant_retry());

        let err = resilient
            .generate_structured::<Pick>(&[Message::user("pick")], "pick")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidStructuredOutput { .. }));
        assert_eq!(scripted.calls(), 1);
    }

    #[tokio::test]
    async fn sustained_rate_limit_propagates_after_three_attempts() {
        let scripted = Arc::new(
            ScriptedProvider::new("m")
                .then_error(ProviderError::RateLimited("429".into()))
                .then_error(ProviderError::RateLimited("429".into()))
                .then_error(ProviderError::RateLimited("429".into()))
                .then_text("never reached"),
        );
        let resilient = ResilientProvider::new(scripted.clone(), instant_retry());

        let err = resilient
            .generate(&[Message::user("hi")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(scripted.calls(), 3);
    }
}
