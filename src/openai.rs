//! Non-streaming OpenAI-compatible provider adapter.
//!
//! Speaks the chat-completions API implemented by LM Studio, Ollama,
//! llama.cpp, vLLM, and cloud providers following OpenAI's conventions.
//! Each call returns one complete assistant turn; tool calls round-trip
//! through the `tool_calls` / `tool`-role wire format with ids preserved.
//!
//! The engine-side message model keeps tool results inside user messages as
//! content blocks; this adapter splits them into the separate `tool`-role
//! messages the wire format expects, and folds the response's `tool_calls`
//! back into `tool_use` blocks.

use crate::error::{Error, Result};
use crate::executor::ToolDefinition;
use crate::provider::{LLMProvider, ModelInfo, ProviderConfig, RequestOptions};
use crate::types::{
    ContentBlock, Message, MessageRole, ProviderResponse, StopReason, TextBlock, ToolUseBlock,
    Usage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Flattens engine messages into the wire shape.
///
/// Tool-result blocks become separate `tool`-role messages carrying the
/// originating call id; block order within each message is preserved.
fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    let mut wire = Vec::new();
    for message in messages {
        match message.role {
            MessageRole::System => wire.push(WireMessage {
                role: "system".to_string(),
                content: Some(message.text()),
                tool_calls: None,
                tool_call_id: None,
            }),
            MessageRole::User => {
                let mut text_parts: Vec<&str> = Vec::new();
                for block in &message.content {
                    match block {
                        ContentBlock::Text(t) => text_parts.push(&t.text),
                        ContentBlock::ToolResult(result) => wire.push(WireMessage {
                            role: "tool".to_string(),
                            content: Some(result.content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(result.tool_use_id.clone()),
                        }),
                        ContentBlock::ToolUse(_) => {}
                    }
                }
                if !text_parts.is_empty() {
                    wire.push(WireMessage {
                        role: "user".to_string(),
                        content: Some(text_parts.join("\n")),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
            }
            MessageRole::Assistant => {
                let text = message.text();
                let tool_calls: Vec<WireToolCall> = message
                    .tool_uses()
                    .into_iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: WireFunction {
                            name: call.name.clone(),
                            arguments: call.input.to_string(),
                        },
                    })
                    .collect();
                wire.push(WireMessage {
                    role: "assistant".to_string(),
                    content: if text.is_empty() { None } else { Some(text) },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                });
            }
        }
    }
    wire
}

/// Publishes a tool declaration in the function-calling wire format.
fn tool_to_wire(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

/// Folds a wire response into the engine's [`ProviderResponse`].
fn response_to_provider(response: ChatResponse) -> Result<ProviderResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::provider("response contained no choices"))?;

    let mut blocks = Vec::new();
    if let Some(content) = choice.message.content {
        if !content.is_empty() {
            blocks.push(ContentBlock::Text(TextBlock::new(content)));
        }
    }

    let mut has_tool_use = false;
    if let Some(tool_calls) = choice.message.tool_calls {
        for call in tool_calls {
            has_tool_use = true;
            let input: Value = if call.function.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    Error::provider(format!(
                        "tool call {} carried undecodable arguments: {e}",
                        call.function.name
                    ))
                })?
            };
            blocks.push(ContentBlock::ToolUse(ToolUseBlock::new(
                call.id,
                call.function.name,
                input,
            )));
        }
    }

    let stop_reason = if has_tool_use {
        StopReason::ToolUse
    } else {
        match choice.finish_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            Some("stop") | Some("content_filter") | None => StopReason::EndTurn,
            Some(other) => {
                log::debug!("unrecognized finish_reason '{other}', treating as end_turn");
                StopReason::EndTurn
            }
        }
    };

    let usage = response.usage.unwrap_or_default();
    Ok(ProviderResponse {
        message: Message::assistant(blocks),
        usage: Usage::new(usage.prompt_tokens, usage.completion_tokens),
        stop_reason,
    })
}

// ============================================================================
// PROVIDER
// ============================================================================

/// [`LLMProvider`] over any OpenAI-compatible chat-completions endpoint.
///
/// ```no_run
/// use bmad_runtime::{OpenAiCompatibleProvider, ProviderConfig, ProviderEndpoint};
///
/// let provider = OpenAiCompatibleProvider::new(
///     ProviderConfig::for_endpoint(ProviderEndpoint::Ollama, "llama3:8b"),
/// ).unwrap();
/// ```
pub struct OpenAiCompatibleProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Validates the configuration and builds the HTTP client.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::Http)?;
        Ok(Self { config, http })
    }

    /// The configuration this provider was built from.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[async_trait]
impl LLMProvider for OpenAiCompatibleProvider {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: to_wire_messages(messages),
            stream: false,
            max_tokens: Some(options.max_output_tokens),
            temperature: options.temperature,
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.iter().map(tool_to_wire).collect())
            },
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::provider(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::provider(format!("API error {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("undecodable response body: {e}")))?;
        response_to_provider(parsed)
    }

    fn model_info(&self) -> ModelInfo {
        self.config.model_info()
    }

    fn provider_type(&self) -> &str {
        "openai-compatible"
    }
}
