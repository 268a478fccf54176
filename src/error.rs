//! Error types for the agent orchestration runtime

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the runtime
#[derive(Error, Debug)]
pub enum Error {
    /// LLM provider transport or parse failure. Fatal to the session.
    #[error("Provider error: {0}")]
    Provider(String),

    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML front-matter error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Path is not absolute or otherwise malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// VFS read/edit target does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// `edit` target string does not occur in the file
    #[error("String not found in {path}")]
    StringNotFound { path: String },

    /// `edit` target string occurs more than once
    #[error("Ambiguous edit in {path}: found {occurrences} occurrences of the target string")]
    AmbiguousEdit { path: String, occurrences: usize },

    /// Agent definition could not be resolved
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Accumulated session cost reached the configured limit
    #[error("Cost limit exceeded: ${total:.4} >= ${limit:.4}")]
    CostLimitExceeded { total: f64, limit: f64 },

    /// Tool-call loop ran past the safety bound
    #[error("Tool loop exceeded {0} iterations without completing")]
    LoopBoundExceeded(u32),

    /// Command is not on the executor whitelist
    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation is invalid for the session's current state
    #[error("Invalid session state: {0}")]
    State(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Error::Provider(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new invalid-path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Error::InvalidPath(path.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a new state error
    pub fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }
}
