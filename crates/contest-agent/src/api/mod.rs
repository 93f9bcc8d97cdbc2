//! Generation-provider access: the provider seam, OpenRouter, and retry.
//!
//! - [`provider`]: the object-safe [`GenerationProvider`] trait, the
//!   [`OpenRouterProvider`] implementation, and [`ProviderFactory`] for
//!   building one provider per agent model.
//! - [`retry`]: [`RetryConfig`] exponential backoff and the generic
//!   [`invoke_with_retry`] loop. Only rate limits and timeouts are retried.
//! - [`resilient`]: [`ResilientProvider`], the retry-wrapped provider every
//!   workflow step calls through.

pub mod provider;
pub mod resilient;
pub mod retry;

pub use provider::{
    GenerationProvider, OpenRouterFactory, OpenRouterProvider, ProviderFactory, ProviderFuture,
    StructuredOutput, StructuredSchema,
};
pub use resilient::ResilientProvider;
pub use retry::{RetryConfig, RetryContext, invoke_with_retry};
