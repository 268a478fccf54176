//! # BMAD Runtime
//!
//! An agent orchestration runtime: it drives a large-language-model through
//! a tool-using dialogue to produce documents according to a declarative
//! role definition. Each *session* is a bounded conversation in which the
//! model reads and writes an in-memory virtual filesystem, delegates to
//! sub-agents, asks the user questions, and runs whitelisted system
//! commands, all under cost tracking with hard limit enforcement.
//!
//! ## Overview
//!
//! - **Sessions**: one-shot ([`AgentSession`]) executes a single command to
//!   completion; conversational ([`ConversationalSession`]) preserves state
//!   across user turns. Both run the same tool-call loop.
//! - **Virtual filesystem**: every session owns a [`VirtualFileSystem`] the
//!   model manipulates exclusively through tools; its contents surface as
//!   the session's documents.
//! - **Pause/resume**: the `ask_user` tool suspends the session until the
//!   host supplies an answer; sessions serialize to [`SessionState`] for
//!   crash recovery at any point.
//! - **Sub-agents**: `invoke_agent` runs a nested session whose costs and
//!   artifacts flow back into the parent, with hierarchical budget
//!   enforcement.
//! - **Storage**: documents and session state persist through the
//!   [`StorageBackend`] contract (in-memory and object-store adapters
//!   included).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bmad_runtime::{Client, ProviderConfig, ProviderEndpoint, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> bmad_runtime::Result<()> {
//!     let client = Client::builder()
//!         .provider_config(ProviderConfig::for_endpoint(
//!             ProviderEndpoint::LMStudio,
//!             "qwen2.5-32b-instruct",
//!         ))
//!         .build()?;
//!
//!     let session = client.create_session(
//!         "pm",
//!         "create-prd",
//!         SessionOptions::new().with_cost_limit(5.0),
//!     )?;
//!
//!     let result = session.execute().await?;
//!     for doc in &result.documents {
//!         println!("{}: {} bytes", doc.path, doc.content.len());
//!     }
//!     println!("total cost: ${:.4}", result.costs.total_cost);
//!     Ok(())
//! }
//! ```

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// Agent-definition records, YAML front-matter parsing, and the locator
/// that resolves and discovers definitions.
mod agent;

/// The client registry: provider/storage ownership and session factories.
mod client;

/// Whitelist-only subprocess runner backing the `execute_command` tool.
mod command;

/// Multi-turn conversational sessions over the same engine.
mod conversation;

/// Cost tracking, warning thresholds, and limit enforcement.
mod cost;

/// Error types and conversions used across all public APIs.
mod error;

/// Session lifecycle events for host observation.
mod events;

/// The tool executor: catalog, dispatch, and the session back-reference.
mod executor;

/// Non-streaming OpenAI-compatible provider adapter.
mod openai;

/// System-prompt composition (the stable contract with the model).
mod prompt;

/// The transport-agnostic LLM provider contract and configuration.
mod provider;

/// The one-shot session engine: tool loop, pause/resume, serialization.
mod session;

/// Pluggable persistence for documents and session state.
mod storage;

/// Core data model: messages, content blocks, session state and results.
mod types;

/// The in-memory virtual filesystem sessions operate on.
mod vfs;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

/// Retry utilities with exponential backoff and the provider retry
/// decorator. Public as a module so hosts can reuse the backoff helpers
/// for their own operations.
pub mod retry;

// --- Client & sessions ---

pub use client::{Client, ClientBuilder};
pub use conversation::{ConversationResult, ConversationalSession, TurnRecord};
pub use session::{AgentSession, MAX_LOOP_ITERATIONS};

// --- Agent definitions ---

pub use agent::{AgentDefinition, AgentLocator, Dependencies, DiscoveredAgent, Persona,
    parse_agent_definition};

// --- Tools & VFS ---

pub use command::{
    CONTENT_CREATION_COMMANDS, CommandExecutor, CommandResult, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_MAX_STREAM_BYTES, READ_ONLY_COMMANDS,
};
pub use executor::{SessionHost, SubAgentOutcome, ToolDefinition, ToolExecutor, ToolResult};
pub use vfs::{DIRECTORY_SENTINEL, VfsEntry, VfsEntryKind, VirtualFile, VirtualFileSystem};

// --- Provider contract ---

pub use openai::OpenAiCompatibleProvider;
pub use provider::{
    LLMProvider, ModelInfo, ProviderConfig, ProviderEndpoint, RequestOptions, get_base_url,
    get_model,
};

// --- Costs ---

pub use cost::{
    ChildSessionCost, CostReport, CostTracker, DEFAULT_WARNING_THRESHOLDS, ModelCost,
};

// --- Storage ---

pub use storage::{
    MemoryStorage, ObjectStorage, ObjectStorageConfig, SessionListResult, SessionQueryOptions,
    SessionSummary, StorageBackend, StorageEntry, StorageListResult, StorageMetadata,
    StorageQueryOptions, StorageResult, mime_type_for_path,
};

// --- Events ---

pub use events::{
    CompletedEvent, CostLimitExceededEvent, CostWarningEvent, FailedEvent, MessageEvent,
    QuestionEvent, ResumedEvent, SessionEvents, StartedEvent,
};

// --- Prompt composition ---

pub use prompt::compose_system_prompt;

// --- Core types ---

pub use error::{Error, Result};
pub use types::{
    ContentBlock, ConversationalStatus, Document, Message, MessageRole, PendingQuestion,
    ProviderResponse, SessionOptions, SessionResult, SessionState, SessionStatus, StopReason,
    TextBlock, ToolResultBlock, ToolUseBlock, Usage,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The most commonly used types and functions. Import with
/// `use bmad_runtime::prelude::*;`.
pub mod prelude {
    pub use crate::{
        AgentSession, Client, ContentBlock, ConversationalSession, Document, Error, LLMProvider,
        MemoryStorage, Message, ProviderConfig, ProviderEndpoint, Result, SessionEvents,
        SessionOptions, SessionResult, SessionStatus, StorageBackend, TextBlock,
        VirtualFileSystem,
    };
}
