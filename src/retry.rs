//! Retry utilities with exponential backoff
//!
//! The session engine never retries a failed provider call: a
//! [`Error::Provider`] is fatal to the session. When retries are wanted
//! they belong in a decorator around the provider, which is what
//! [`RetryingProvider`] is. Only transient failures (network errors,
//! timeouts, 5xx responses) are retried.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bmad_runtime::retry::{RetryConfig, RetryingProvider};
//! use bmad_runtime::{OpenAiCompatibleProvider, ProviderConfig};
//! use std::time::Duration;
//!
//! # fn example() -> bmad_runtime::Result<()> {
//! let provider = OpenAiCompatibleProvider::new(
//!     ProviderConfig::openai_compatible("qwen2.5-32b-instruct"),
//! )?;
//!
//! let resilient = RetryingProvider::new(
//!     provider,
//!     RetryConfig::new()
//!         .with_max_attempts(3)
//!         .with_initial_delay(Duration::from_secs(1)),
//! );
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::executor::ToolDefinition;
use crate::provider::{LLMProvider, ModelInfo, RequestOptions};
use crate::types::{Message, ProviderResponse};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (e.g. 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,

    /// Random jitter fraction to prevent thundering herd (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set jitter factor (clamped to 0.0..=1.0)
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay for a given attempt with exponential backoff and jitter
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);

        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// Determine if an error is retryable
///
/// Returns true for transient errors: network failures, timeouts, and 5xx
/// provider responses. Configuration, validation, and state errors are not
/// retryable.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(_) => true,
        Error::Timeout => true,
        Error::Provider(msg) => {
            msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("504")
                || msg.contains("failed")
        }
        _ => false,
    }
}

/// Retry an async operation with exponential backoff, retrying only on
/// transient ([`is_retryable_error`]) failures.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable_error(&err) {
                    return Err(err);
                }
                last_error = Some(err);

                // Don't sleep after the last attempt
                if attempt < config.max_attempts - 1 {
                    let delay = config.calculate_delay(attempt);
                    log::debug!(
                        "retryable failure on attempt {}, sleeping {delay:?}",
                        attempt + 1
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::other("Retry failed with no error")))
}

/// [`LLMProvider`] decorator that retries transient `send_message` failures.
///
/// Pricing and model info pass straight through to the wrapped provider.
pub struct RetryingProvider<P: LLMProvider> {
    inner: P,
    config: RetryConfig,
}

impl<P: LLMProvider> RetryingProvider<P> {
    /// Wraps a provider with retry behavior.
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: LLMProvider> LLMProvider for RetryingProvider<P> {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        retry_with_backoff(self.config.clone(), || {
            self.inner.send_message(messages, tools, options)
        })
        .await
    }

    fn model_info(&self) -> ModelInfo {
        self.inner.model_info()
    }

    fn provider_type(&self) -> &str {
        self.inner.provider_type()
    }
}
