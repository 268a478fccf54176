//! Shared test doubles and fixtures for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use bmad_runtime::{
    Client, ContentBlock, Error, LLMProvider, Message, ModelInfo, ProviderResponse,
    RequestOptions, Result, StopReason, TextBlock, ToolDefinition, ToolUseBlock, Usage,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Sonnet-class pricing used across cost assertions.
pub const INPUT_PER_1K: f64 = 0.003;
pub const OUTPUT_PER_1K: f64 = 0.015;

pub const PM_AGENT: &str = r#"---
agent:
  name: Product Manager
  id: pm
  title: Product strategy and PRDs
persona:
  role: Senior product manager
commands:
  - create-prd
---
"#;

pub const ANALYST_AGENT: &str = r#"---
agent:
  name: Analyst
  id: analyst
persona:
  role: Research analyst
---
"#;

/// Builds a complete assistant text turn.
pub fn text_turn(text: &str, input: u64, output: u64) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(vec![ContentBlock::Text(TextBlock::new(text))]),
        usage: Usage::new(input, output),
        stop_reason: StopReason::EndTurn,
    }
}

/// A text turn cut off by the output token limit.
pub fn max_tokens_turn(text: &str, input: u64, output: u64) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(vec![ContentBlock::Text(TextBlock::new(text))]),
        usage: Usage::new(input, output),
        stop_reason: StopReason::MaxTokens,
    }
}

/// Builds an assistant turn requesting the given tool calls, in order.
pub fn tool_turn(calls: Vec<(&str, &str, Value)>, input: u64, output: u64) -> ProviderResponse {
    let blocks = calls
        .into_iter()
        .map(|(id, name, args)| ContentBlock::ToolUse(ToolUseBlock::new(id, name, args)))
        .collect();
    ProviderResponse {
        message: Message::assistant(blocks),
        usage: Usage::new(input, output),
        stop_reason: StopReason::ToolUse,
    }
}

/// Scripted [`LLMProvider`]: hands out queued responses in order and logs
/// the message history of every call for invariant assertions.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    repeat: Option<ProviderResponse>,
    call_log: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// A provider that returns clones of one response forever.
    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Message histories of every call made so far.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _options: &RequestOptions,
    ) -> Result<ProviderResponse> {
        self.call_log.lock().unwrap().push(messages.to_vec());
        if let Some(repeat) = &self.repeat {
            return Ok(repeat.clone());
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::provider("scripted responses exhausted"))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "test-model".to_string(),
            max_context_tokens: 200_000,
            input_cost_per_1k: INPUT_PER_1K,
            output_cost_per_1k: OUTPUT_PER_1K,
        }
    }

    fn provider_type(&self) -> &str {
        "scripted"
    }
}

/// A client with the scripted provider and the two fixture agents, with
/// all disk search paths pointed away from the checkout.
pub fn client_with(provider: Arc<ScriptedProvider>) -> Arc<Client> {
    Client::builder()
        .provider(provider)
        .local_agents_dir("/nonexistent/.bmad-core/agents")
        .shared_agents_dir("/nonexistent/shared/.bmad-core/agents")
        .bundled_agent("pm", PM_AGENT)
        .bundled_agent("analyst", ANALYST_AGENT)
        .build()
        .expect("client builds")
}
