//! # LLM provider contract
//!
//! The engine depends only on the [`LLMProvider`] trait: one call per turn,
//! a complete response back, deterministic pricing. Transport details
//! (HTTP, SDKs, wire formats) live in adapters such as
//! [`OpenAiCompatibleProvider`](crate::OpenAiCompatibleProvider).
//!
//! Contract notes:
//!
//! - Each call returns a complete [`ProviderResponse`]; streaming deltas are
//!   not part of the contract.
//! - Tool-result blocks on the user side round-trip with ids matching the
//!   originating `tool_use.id`.
//! - A call with no tools must still be accepted.
//! - Transport failures surface as [`Error::Provider`]; the engine does not
//!   retry; wrap the provider in
//!   [`RetryingProvider`](crate::retry::RetryingProvider) if retries are
//!   wanted.
//!
//! [`ProviderConfig`] carries the connection settings for the bundled
//! OpenAI-compatible adapter, with well-known local-server defaults and
//! environment variable support (`BMAD_BASE_URL`, `BMAD_MODEL`,
//! `BMAD_API_KEY`).

use crate::error::{Error, Result};
use crate::executor::ToolDefinition;
use crate::types::{Message, ProviderResponse, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Static facts about the model a provider is serving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Model name as reported to cost breakdowns and session state.
    pub name: String,

    /// Context window size in tokens.
    pub max_context_tokens: u32,

    /// Price per 1,000 input tokens.
    pub input_cost_per_1k: f64,

    /// Price per 1,000 output tokens.
    pub output_cost_per_1k: f64,
}

/// Per-call options recognized by every provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Maximum tokens to generate for this turn.
    pub max_output_tokens: u32,

    /// Sampling temperature; `None` uses the provider default.
    pub temperature: Option<f32>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_output_tokens: 4096,
            temperature: None,
        }
    }
}

/// Transport-agnostic interface the session engine drives.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Sends the conversation and tool catalog, returning one complete
    /// assistant turn.
    ///
    /// The system message (if present) is delivered however the backend
    /// expects it; the engine does not care which.
    async fn send_message(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &RequestOptions,
    ) -> Result<ProviderResponse>;

    /// Static model facts, including per-1k pricing.
    fn model_info(&self) -> ModelInfo;

    /// Short tag identifying the transport, recorded in serialized session
    /// state (e.g. `"openai-compatible"`).
    fn provider_type(&self) -> &str;

    /// Deterministic cost of a usage record at this model's pricing.
    fn calculate_cost(&self, usage: &Usage) -> f64 {
        let info = self.model_info();
        usage.input_tokens as f64 / 1000.0 * info.input_cost_per_1k
            + usage.output_tokens as f64 / 1000.0 * info.output_cost_per_1k
    }
}

// ============================================================================
// ENDPOINT DEFAULTS
// ============================================================================

/// Well-known local OpenAI-compatible servers and their default endpoints.
///
/// | Endpoint | Default URL |
/// |----------|-------------|
/// | LMStudio | <http://localhost:1234/v1> |
/// | Ollama | <http://localhost:11434/v1> |
/// | LlamaCpp | <http://localhost:8080/v1> |
/// | VLLM | <http://localhost:8000/v1> |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEndpoint {
    /// LM Studio (default port 1234)
    LMStudio,
    /// Ollama (default port 11434)
    Ollama,
    /// llama.cpp server mode (default port 8080)
    LlamaCpp,
    /// vLLM (default port 8000)
    VLLM,
}

impl ProviderEndpoint {
    /// The standard localhost URL for this server, `/v1` suffix included.
    pub fn default_url(&self) -> &'static str {
        match self {
            ProviderEndpoint::LMStudio => "http://localhost:1234/v1",
            ProviderEndpoint::Ollama => "http://localhost:11434/v1",
            ProviderEndpoint::LlamaCpp => "http://localhost:8080/v1",
            ProviderEndpoint::VLLM => "http://localhost:8000/v1",
        }
    }
}

impl FromStr for ProviderEndpoint {
    type Err = String;

    /// Case-insensitive; accepts common dash/underscore/dot variations.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(ProviderEndpoint::LMStudio),
            "ollama" => Ok(ProviderEndpoint::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(ProviderEndpoint::LlamaCpp),
            "vllm" => Ok(ProviderEndpoint::VLLM),
            _ => Err(format!("Unknown provider endpoint: {s}")),
        }
    }
}

/// Resolve the API base URL.
///
/// Priority: `BMAD_BASE_URL` environment variable, then the endpoint's
/// default, then the explicit fallback, then LM Studio's default.
pub fn get_base_url(endpoint: Option<ProviderEndpoint>, fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("BMAD_BASE_URL") {
        return url;
    }
    if let Some(e) = endpoint {
        return e.default_url().to_string();
    }
    fallback
        .unwrap_or(ProviderEndpoint::LMStudio.default_url())
        .to_string()
}

/// Resolve the model name, optionally preferring the `BMAD_MODEL`
/// environment variable over the fallback.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var("BMAD_MODEL") {
            return Some(model);
        }
    }
    fallback.map(|s| s.to_string())
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Connection settings for the bundled OpenAI-compatible adapter.
///
/// ```
/// use bmad_runtime::{ProviderConfig, ProviderEndpoint};
///
/// let config = ProviderConfig::for_endpoint(ProviderEndpoint::Ollama, "llama3:8b")
///     .with_pricing(0.003, 0.015)
///     .with_timeout_secs(120);
/// assert_eq!(config.base_url, "http://localhost:11434/v1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// OpenAI-compatible endpoint URL.
    pub base_url: String,

    /// API key; local servers typically accept the default `"not-needed"`.
    pub api_key: String,

    /// Model identifier available at the endpoint.
    pub model: String,

    /// HTTP timeout per provider call, in seconds.
    pub timeout_secs: u64,

    /// Context window advertised in [`ModelInfo`].
    pub max_context_tokens: u32,

    /// Price per 1,000 input tokens. Local servers default to 0.
    pub input_cost_per_1k: f64,

    /// Price per 1,000 output tokens. Local servers default to 0.
    pub output_cost_per_1k: f64,
}

impl ProviderConfig {
    /// Creates a config for a model, resolving the base URL from
    /// `BMAD_BASE_URL` or the LM Studio default, and the API key from
    /// `BMAD_API_KEY`.
    pub fn openai_compatible(model: impl Into<String>) -> Self {
        Self {
            base_url: get_base_url(None, None),
            api_key: env::var("BMAD_API_KEY").unwrap_or_else(|_| "not-needed".to_string()),
            model: model.into(),
            timeout_secs: 60,
            max_context_tokens: 32_768,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
        }
    }

    /// Creates a config pointed at a well-known local server.
    pub fn for_endpoint(endpoint: ProviderEndpoint, model: impl Into<String>) -> Self {
        let mut config = Self::openai_compatible(model);
        if env::var("BMAD_BASE_URL").is_err() {
            config.base_url = endpoint.default_url().to_string();
        }
        config
    }

    /// Overrides the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Overrides the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// Sets per-1k pricing used for cost accounting.
    pub fn with_pricing(mut self, input_per_1k: f64, output_per_1k: f64) -> Self {
        self.input_cost_per_1k = input_per_1k;
        self.output_cost_per_1k = output_per_1k;
        self
    }

    /// Sets the advertised context window.
    pub fn with_max_context_tokens(mut self, tokens: u32) -> Self {
        self.max_context_tokens = tokens;
        self
    }

    /// Sets the per-call HTTP timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// The [`ModelInfo`] this configuration advertises.
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            max_context_tokens: self.max_context_tokens,
            input_cost_per_1k: self.input_cost_per_1k,
            output_cost_per_1k: self.output_cost_per_1k,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("model is required"));
        }
        if self.base_url.trim().is_empty() {
            return Err(Error::config("base_url is required"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::invalid_input(
                "base_url must start with http:// or https://",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_default_urls() {
        assert_eq!(
            ProviderEndpoint::LMStudio.default_url(),
            "http://localhost:1234/v1"
        );
        assert_eq!(
            ProviderEndpoint::Ollama.default_url(),
            "http://localhost:11434/v1"
        );
        assert_eq!(
            ProviderEndpoint::LlamaCpp.default_url(),
            "http://localhost:8080/v1"
        );
        assert_eq!(
            ProviderEndpoint::VLLM.default_url(),
            "http://localhost:8000/v1"
        );
    }

    #[test]
    fn test_endpoint_from_str() {
        assert_eq!(
            "lmstudio".parse::<ProviderEndpoint>(),
            Ok(ProviderEndpoint::LMStudio)
        );
        assert_eq!(
            "LM-Studio".parse::<ProviderEndpoint>(),
            Ok(ProviderEndpoint::LMStudio)
        );
        assert_eq!(
            "llama.cpp".parse::<ProviderEndpoint>(),
            Ok(ProviderEndpoint::LlamaCpp)
        );
        assert!("unknown".parse::<ProviderEndpoint>().is_err());
    }

    #[test]
    fn test_config_validation() {
        // SAFETY: test-local env mutation; the variable belongs to this
        // library and nothing else in the process reads it.
        unsafe {
            env::remove_var("BMAD_BASE_URL");
        }

        let config = ProviderConfig::openai_compatible("qwen2.5-32b-instruct");
        assert!(config.validate().is_ok());

        let bad = config.clone().with_base_url("localhost:1234");
        assert!(bad.validate().is_err());

        let mut empty = config;
        empty.model = String::new();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_config_pricing_flows_into_model_info() {
        let config =
            ProviderConfig::openai_compatible("test-model").with_pricing(0.003, 0.015);
        let info = config.model_info();
        assert_eq!(info.input_cost_per_1k, 0.003);
        assert_eq!(info.output_cost_per_1k, 0.015);
        assert_eq!(info.name, "test-model");
    }

    #[test]
    fn test_get_model_fallback() {
        assert_eq!(
            get_model(Some("qwen2.5-32b"), false),
            Some("qwen2.5-32b".to_string())
        );
        assert_eq!(get_model(None, false), None);
    }
}
