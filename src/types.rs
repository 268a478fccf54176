//! Core type definitions for the agent orchestration runtime.
//!
//! This module contains the fundamental data structures used throughout the
//! runtime, organized into three main categories:
//!
//! # Message System
//!
//! - [`Message`]: Container for conversation messages with role and content
//! - [`MessageRole`]: Enum defining who sent the message (System, User, Assistant)
//! - [`ContentBlock`]: Enum for different content types (text, tool use, tool results)
//! - [`TextBlock`], [`ToolUseBlock`], [`ToolResultBlock`]: The individual block types
//!
//! Ordering inside a message is semantically meaningful: tool results appear
//! in the same order as the tool calls they answer, though matching is by id.
//!
//! # Provider Exchange
//!
//! - [`ProviderResponse`]: One complete assistant turn with usage and stop reason
//! - [`Usage`]: Token counts for a single provider call
//! - [`StopReason`]: Why the provider stopped generating
//!
//! # Session Model
//!
//! - [`SessionOptions`]: Per-session configuration (cost limit, autosave, context)
//! - [`SessionState`]: The serialized wire form of a session, used for crash
//!   recovery; `serialize -> persist -> load -> deserialize` round-trips
//!   byte-identically
//! - [`SessionResult`]: What a session execution returns, success or failure
//! - [`Document`]: A user-visible artifact emitted from the virtual filesystem

use crate::cost::{ChildSessionCost, CostReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// MESSAGE SYSTEM
// ============================================================================

/// Identifies the sender/role of a message in the conversation.
///
/// Serializes to lowercase strings (`"system"`, `"user"`, `"assistant"`).
/// Tool results travel inside user messages as [`ContentBlock::ToolResult`]
/// blocks rather than under a separate role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message that establishes agent behavior and context.
    /// Always the first message of a session, and there is exactly one.
    System,

    /// User message: the initial command, tool results, or host-provided turns.
    User,

    /// Assistant message containing the model's response. May include text,
    /// tool use requests, or both.
    Assistant,
}

/// Content blocks that can appear in messages.
///
/// Uses serde's internally tagged format with a `"type"` field:
/// ```json
/// {"type": "text", "text": "Hello"}
/// {"type": "tool_use", "id": "call_1", "name": "read_file", "input": {...}}
/// {"type": "tool_result", "tool_use_id": "call_1", "content": "..."}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text content.
    Text(TextBlock),

    /// Tool use request from the model.
    ToolUse(ToolUseBlock),

    /// Tool execution result sent back to the model.
    ToolResult(ToolResultBlock),
}

/// Simple text content in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextBlock {
    /// The text content.
    pub text: String,
}

impl TextBlock {
    /// Creates a new text block from any string-like type.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Tool use request from the model.
///
/// When the model wants to call a tool it emits a `ToolUseBlock` naming the
/// tool and carrying its decoded input. The executor runs the tool and the
/// engine answers with a [`ToolResultBlock`] carrying the same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseBlock {
    /// Opaque identifier, unique within a provider turn. Used to correlate
    /// the result back to this specific request.
    pub id: String,

    /// Name of the tool to execute. Must match the executor's catalog.
    pub name: String,

    /// Decoded JSON input for the tool.
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    /// Creates a new tool use block.
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Tool execution result sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultBlock {
    /// ID of the tool use request this result corresponds to.
    pub tool_use_id: String,

    /// Textual result of the tool execution, suitable for the model to read.
    pub content: String,

    /// Set to `Some(true)` when the tool failed and `content` carries the
    /// error string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResultBlock {
    /// Creates a successful tool result block.
    pub fn new(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: None,
        }
    }

    /// Creates an error tool result block.
    pub fn error(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: Some(true),
        }
    }
}

/// A complete message in a conversation.
///
/// Content is an ordered sequence of blocks; a flat string message is
/// represented as a single text block. Ordering is significant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The role/sender of this message.
    pub role: MessageRole,

    /// The content blocks that make up this message.
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Creates a system message from plain text.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: vec![ContentBlock::Text(TextBlock::new(text))],
        }
    }

    /// Creates a user message from plain text.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::Text(TextBlock::new(text))],
        }
    }

    /// Creates a user message from explicit content blocks (tool results).
    pub fn user_with_blocks(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }

    /// Creates an assistant message from explicit content blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
        }
    }

    /// Concatenates all text blocks in this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns references to all tool use blocks in this message, in order.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// PROVIDER EXCHANGE
// ============================================================================

/// Why the provider stopped generating a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its answer.
    EndTurn,

    /// Generation was cut off by the output token limit.
    MaxTokens,

    /// A configured stop sequence was produced.
    StopSequence,

    /// At least one `tool_use` block is present and must be serviced before
    /// the conversation can continue.
    ToolUse,
}

/// Token counts for a single provider call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens consumed by the request.
    pub input_tokens: u64,

    /// Tokens generated in the response.
    pub output_tokens: u64,
}

impl Usage {
    /// Creates a usage record from input/output token counts.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// One complete assistant turn from the provider.
///
/// Each turn is a complete response; the runtime does not consume streaming
/// token deltas.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// The assistant message, content blocks verbatim.
    pub message: Message,

    /// Token usage for this call.
    pub usage: Usage,

    /// Why generation stopped.
    pub stop_reason: StopReason,
}

// ============================================================================
// DOCUMENTS
// ============================================================================

/// A user-visible artifact produced by a session.
///
/// Paths are absolute, case-sensitive POSIX-style strings; directories are
/// implicit. Content is UTF-8 text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Absolute path of the document inside the session's VFS.
    pub path: String,

    /// UTF-8 document content.
    pub content: String,
}

impl Document {
    /// Creates a document.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

// ============================================================================
// SESSION MODEL
// ============================================================================

/// Lifecycle state of a one-shot session.
///
/// `Paused` holds exactly when a question is pending for the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created but not yet executed.
    Pending,
    /// The tool-call loop is in flight.
    Running,
    /// Suspended on `ask_user`, waiting for the host to answer.
    Paused,
    /// Terminated successfully.
    Completed,
    /// Terminated with an error.
    Failed,
}

/// Lifecycle state of a conversational session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationalStatus {
    /// Ready to accept `send` or `end`.
    Idle,
    /// A turn is in flight; further `send` calls are rejected.
    Processing,
    /// Suspended on `ask_user`; only `answer` is accepted.
    WaitingForAnswer,
    /// The conversation was ended by the host.
    Ended,
    /// A turn failed; the conversation is unusable.
    Error,
}

/// Per-session configuration.
///
/// Constructed with [`SessionOptions::new`] and the chainable `with_*`
/// methods:
///
/// ```
/// use bmad_runtime::SessionOptions;
///
/// let options = SessionOptions::new()
///     .with_cost_limit(5.0)
///     .with_auto_save(true);
/// assert_eq!(options.cost_limit, Some(5.0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    /// Hard ceiling on session cost in the provider's currency. Enforced
    /// after every provider turn and after every child-cost credit; `None`
    /// means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_limit: Option<f64>,

    /// Free-form context passed to the agent and inherited (augmented) by
    /// sub-agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,

    /// Snapshot session state to storage after every provider turn and on
    /// terminal transitions.
    pub auto_save: bool,

    /// Persist emitted documents to storage at completion.
    pub save_documents: bool,

    /// Maximum tokens the provider may generate per turn.
    pub max_output_tokens: u32,

    /// Sampling temperature; `None` uses the provider default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cost_limit: None,
            context: None,
            auto_save: false,
            save_documents: false,
            max_output_tokens: 4096,
            temperature: None,
        }
    }
}

impl SessionOptions {
    /// Creates options with defaults: no cost limit, no context, autosave
    /// and document persistence off, 4096 output tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cost limit.
    pub fn with_cost_limit(mut self, limit: f64) -> Self {
        self.cost_limit = Some(limit);
        self
    }

    /// Sets the session context object.
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Enables or disables autosave.
    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    /// Enables or disables document persistence at completion.
    pub fn with_save_documents(mut self, save: bool) -> Self {
        self.save_documents = save;
        self
    }

    /// Sets the per-turn output token ceiling.
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A question the session is suspended on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuestion {
    /// The question text presented to the host.
    pub question: String,

    /// Optional clarifying context from the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Serialized form of a session, used for crash recovery.
///
/// This is the JSON wire format: `serialize -> persist -> load ->
/// deserialize` must round-trip byte-identically, so every field has a
/// deterministic serialization (ordered maps, fixed field order).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Globally unique session id (`sess_` or `conv_` prefix).
    pub id: String,

    /// Id of the agent definition driving the session.
    pub agent_id: String,

    /// The command the session is executing.
    pub command: String,

    /// Lifecycle status at snapshot time.
    pub status: SessionStatus,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Set when execution started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set while suspended on a question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,

    /// Set on terminal transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Full conversation history. `messages[0]` is the system prompt.
    pub messages: Vec<Message>,

    /// VFS contents as path -> content (ordered for determinism).
    pub vfs_files: std::collections::BTreeMap<String, String>,

    /// Input tokens consumed by this session's own provider calls.
    pub total_input_tokens: u64,

    /// Output tokens generated by this session's own provider calls.
    pub total_output_tokens: u64,

    /// Total cost including child sessions.
    pub total_cost: f64,

    /// Number of provider calls made by this session.
    pub api_call_count: u64,

    /// Costs credited from completed sub-agent sessions.
    pub child_session_costs: Vec<ChildSessionCost>,

    /// Present exactly when `status` is `Paused`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<PendingQuestion>,

    /// The options the session was created with.
    pub options: SessionOptions,

    /// Provider type tag (for reconstruction sanity checks).
    pub provider_type: String,

    /// Model the session was running against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

/// What a session execution returns, success or failure.
///
/// A result is always produced; failures carry the error string alongside
/// whatever artifacts and costs accrued before the failure.
#[derive(Debug, Clone)]
pub struct SessionResult {
    /// The session id.
    pub session_id: String,

    /// Terminal status (`Completed` or `Failed`).
    pub status: SessionStatus,

    /// Concatenated text blocks of the last assistant message, if any.
    pub final_response: Option<String>,

    /// User-visible artifacts from the VFS, with agent-definition files
    /// excluded.
    pub documents: Vec<Document>,

    /// Full cost accounting including child sessions.
    pub costs: CostReport,

    /// Wall-clock duration of the execution in milliseconds.
    pub duration_ms: u64,

    /// Storage paths of persisted documents, when persistence is enabled.
    pub storage_urls: Vec<String>,

    /// Error string when `status` is `Failed`.
    pub error: Option<String>,
}
