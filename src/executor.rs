//! # Tool executor
//!
//! The executor holds the session's [`VirtualFileSystem`] and exposes the
//! fixed tool catalog to the model, dispatching on tool name. Every dispatch
//! returns a uniform [`ToolResult`]; internal failures are converted into
//! `success=false` results with a textual error; the model never sees a raw
//! error value, and tool-level failures never terminate the session loop.
//!
//! Tools are dispatched sequentially within a provider turn; there is no
//! intra-turn parallelism, which keeps ordering and cost accounting
//! deterministic.
//!
//! ## Catalog
//!
//! | name | semantics |
//! |------|-----------|
//! | `read_file` | VFS content or error |
//! | `write_file` | create/overwrite |
//! | `edit_file` | unique-match replace |
//! | `list_files` | direct children with sizes |
//! | `glob_pattern` | lexically sorted matches |
//! | `bash_command` | mini-shell over the VFS: `mkdir [-p]`, `ls`, `pwd`, `echo` |
//! | `execute_command` | whitelisted host subprocess (when configured) |
//! | `ask_user` | suspends the session until the host answers |
//! | `invoke_agent` | delegates to a nested session |
//!
//! ## Session back-reference
//!
//! `ask_user` and `invoke_agent` need to call back into the enclosing
//! session. The executor holds a [`Weak`] reference to an abstract
//! [`SessionHost`] capability with just the methods it needs, not the session
//! type, which keeps the dependency acyclic at the type level.

use crate::command::CommandExecutor;
use crate::cost::ChildSessionCost;
use crate::error::Result;
use crate::types::{Document, ToolResultBlock, ToolUseBlock};
use crate::vfs::{VfsEntryKind, VirtualFileSystem};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::{Arc, Weak};

/// A tool declaration published to the provider and the system prompt.
///
/// `input_schema` is a JSON-schema object (`type`, `properties`,
/// `required`); all semantic validation happens in the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Unique tool name the model dispatches on.
    pub name: String,

    /// Human description sent to the model.
    pub description: String,

    /// JSON schema of the tool's input object.
    pub input_schema: Value,

    /// One usage example, included in the system prompt.
    pub example: String,
}

impl ToolDefinition {
    fn new(
        name: &str,
        description: &str,
        input_schema: Value,
        example: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
            example: example.to_string(),
        }
    }
}

/// Uniform result of one tool dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// Whether the tool succeeded.
    pub success: bool,

    /// Output for the model on success (and partial output on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Error string on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Structured extras (sizes, exit codes, match counts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    /// A successful result with content.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
            metadata: None,
        }
    }

    /// A failed result with an error string.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    /// Attaches metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Converts into the `tool_result` content block answering `tool_use_id`.
    pub fn into_block(self, tool_use_id: &str) -> ToolResultBlock {
        if self.success {
            ToolResultBlock::new(tool_use_id, self.content.unwrap_or_default())
        } else {
            ToolResultBlock::error(
                tool_use_id,
                self.error.unwrap_or_else(|| "Tool failed".to_string()),
            )
        }
    }
}

/// Artifacts and accounting a sub-agent hands back to the parent.
///
/// The cost record is credited to the parent whether the child completed
/// or failed; the spend is real either way.
#[derive(Debug, Clone)]
pub struct SubAgentOutcome {
    /// Structured JSON summary returned as the tool result content.
    pub summary: Value,

    /// Child documents to merge into the parent VFS (empty on failure).
    pub documents: Vec<Document>,

    /// The child's cost record to credit against the parent budget.
    pub child_cost: ChildSessionCost,

    /// The child's error string when it terminated in `failed`.
    pub error: Option<String>,
}

/// The narrow capability the executor needs from its enclosing session.
///
/// Injected as a [`Weak`] back-reference after construction.
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Suspends until the host answers the model's question.
    async fn request_user_answer(
        &self,
        question: String,
        context: Option<String>,
    ) -> Result<String>;

    /// Runs a sub-agent session to a terminal state. An `Err` means the
    /// child could not be created or driven at all; a child that ran and
    /// failed comes back as an outcome carrying its error and costs.
    async fn run_sub_agent(
        &self,
        agent_id: &str,
        command: &str,
        context: Option<Value>,
    ) -> Result<SubAgentOutcome>;

    /// Credits a child's costs and re-enforces the parent limit. An `Err`
    /// here is fatal to the parent session.
    async fn add_child_cost(&self, cost: ChildSessionCost) -> Result<()>;

    /// Budget left for delegation, `None` when unlimited.
    fn remaining_budget(&self) -> Option<f64>;

    /// The closed set of agent ids `invoke_agent` accepts.
    fn known_agent_ids(&self) -> Vec<String>;
}

/// Dispatches the fixed tool catalog against the session's VFS.
pub struct ToolExecutor {
    vfs: VirtualFileSystem,
    command_executor: Option<CommandExecutor>,
    host: Option<Weak<dyn SessionHost>>,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("vfs_entries", &self.vfs.len())
            .field("command_executor", &self.command_executor.is_some())
            .field("host", &self.host.is_some())
            .finish()
    }
}

fn str_arg<'a>(input: &'a Value, key: &str) -> std::result::Result<&'a str, String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing required parameter '{key}'"))
}

fn opt_str_arg<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

impl ToolExecutor {
    /// Creates an executor with an empty VFS and no external command runner.
    pub fn new() -> Self {
        Self {
            vfs: VirtualFileSystem::new(),
            command_executor: None,
            host: None,
        }
    }

    /// Enables `execute_command` with the given runner.
    pub fn with_command_executor(mut self, executor: CommandExecutor) -> Self {
        self.command_executor = Some(executor);
        self
    }

    /// Injects the session back-reference. Called once, after construction.
    pub fn set_host(&mut self, host: Weak<dyn SessionHost>) {
        self.host = Some(host);
    }

    fn host(&self) -> Option<Arc<dyn SessionHost>> {
        self.host.as_ref().and_then(Weak::upgrade)
    }

    /// The session's virtual filesystem.
    pub fn vfs(&self) -> &VirtualFileSystem {
        &self.vfs
    }

    /// Mutable access to the virtual filesystem.
    pub fn vfs_mut(&mut self) -> &mut VirtualFileSystem {
        &mut self.vfs
    }

    /// The tool catalog as currently configured. `execute_command` is
    /// published only when a command runner is present.
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        let mut tools = vec![
            ToolDefinition::new(
                "read_file",
                "Read the content of a file from the workspace. The path must be absolute.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string", "description": "Absolute path of the file to read"}
                    },
                    "required": ["file_path"]
                }),
                r#"read_file {"file_path": "/docs/prd.md"}"#,
            ),
            ToolDefinition::new(
                "write_file",
                "Write content to a file, creating it or overwriting the previous content. Parent directories are implicit.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string", "description": "Absolute path of the file to write"},
                        "content": {"type": "string", "description": "Full UTF-8 content of the file"}
                    },
                    "required": ["file_path", "content"]
                }),
                r##"write_file {"file_path": "/docs/prd.md", "content": "# PRD\n"}"##,
            ),
            ToolDefinition::new(
                "edit_file",
                "Replace a string in a file. The old string must occur exactly once; read the file first to pick an unambiguous target.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string", "description": "Absolute path of the file to edit"},
                        "old_string": {"type": "string", "description": "Exact text to replace (must be unique in the file)"},
                        "new_string": {"type": "string", "description": "Replacement text"}
                    },
                    "required": ["file_path", "old_string", "new_string"]
                }),
                r#"edit_file {"file_path": "/docs/prd.md", "old_string": "Draft", "new_string": "Final"}"#,
            ),
            ToolDefinition::new(
                "list_files",
                "List the direct children of a directory with file sizes. Not recursive.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Absolute directory path"}
                    },
                    "required": ["path"]
                }),
                r#"list_files {"path": "/docs"}"#,
            ),
            ToolDefinition::new(
                "glob_pattern",
                "Find files matching a glob pattern (*, **, ?, [...]). Matches are returned sorted, one per line.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string", "description": "Glob pattern, absolute or relative to path"},
                        "path": {"type": "string", "description": "Base directory for relative patterns (default /)"}
                    },
                    "required": ["pattern"]
                }),
                r#"glob_pattern {"pattern": "/.bmad-core/agents/*.md"}"#,
            ),
            ToolDefinition::new(
                "bash_command",
                "Run a restricted shell command against the workspace. Supported: mkdir [-p] PATH, ls [PATH], pwd, echo ARGS... Anything else is rejected.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "The command line to run"},
                        "description": {"type": "string", "description": "Optional note on why the command is needed"}
                    },
                    "required": ["command"]
                }),
                r#"bash_command {"command": "mkdir -p /docs/archive"}"#,
            ),
        ];

        if self.command_executor.is_some() {
            tools.push(ToolDefinition::new(
                "execute_command",
                "Run a whitelisted system command on the host (document converters, typesetters). Arguments are passed as a vector; no shell interpretation.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "Executable name from the whitelist"},
                        "args": {"type": "array", "items": {"type": "string"}, "description": "Argument vector"},
                        "working_directory": {"type": "string", "description": "Working directory (created if missing)"}
                    },
                    "required": ["command"]
                }),
                r#"execute_command {"command": "pandoc", "args": ["/tmp/prd.md", "-o", "/tmp/prd.pdf"]}"#,
            ));
        }

        tools.push(ToolDefinition::new(
            "ask_user",
            "Ask the user a question and wait for their answer. Use when a decision genuinely requires user input.",
            json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string", "description": "The question to ask"},
                    "context": {"type": "string", "description": "Optional context explaining why you are asking"}
                },
                "required": ["question"]
            }),
            r#"ask_user {"question": "Which database should the service use?"}"#,
        ));
        tools.push(ToolDefinition::new(
            "invoke_agent",
            "Delegate a command to another agent. The child runs to completion and its documents are merged into this workspace.",
            json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string", "description": "Id of the agent to invoke"},
                    "command": {"type": "string", "description": "Command for the child agent to execute"},
                    "context": {"type": "object", "description": "Optional context object passed to the child"}
                },
                "required": ["agent_id", "command"]
            }),
            r#"invoke_agent {"agent_id": "pm", "command": "create-prd"}"#,
        ));

        tools
    }

    /// Dispatches one tool call.
    ///
    /// Tool-level failures come back as `Ok(ToolResult { success: false })`.
    /// The only `Err` paths are engine-fatal: a cost-limit breach raised
    /// while crediting a sub-agent.
    pub async fn execute(&mut self, call: &ToolUseBlock) -> Result<ToolResult> {
        log::debug!("dispatching tool {} (id {})", call.name, call.id);
        let result = match call.name.as_str() {
            "read_file" => self.read_file(&call.input),
            "write_file" => self.write_file(&call.input),
            "edit_file" => self.edit_file(&call.input),
            "list_files" => self.list_files(&call.input),
            "glob_pattern" => self.glob_pattern(&call.input),
            "bash_command" => self.bash_command(&call.input),
            "execute_command" => self.execute_command(&call.input).await,
            "ask_user" => self.ask_user(&call.input).await,
            "invoke_agent" => return self.invoke_agent(&call.input).await,
            other => ToolResult::fail(format!("Unknown tool: {other}")),
        };
        Ok(result)
    }

    fn read_file(&self, input: &Value) -> ToolResult {
        let path = match str_arg(input, "file_path") {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e),
        };
        match self.vfs.read(path) {
            Ok(content) => ToolResult::ok(content),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    fn write_file(&mut self, input: &Value) -> ToolResult {
        let path = match str_arg(input, "file_path") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolResult::fail(e),
        };
        let content = match str_arg(input, "content") {
            Ok(c) => c.to_string(),
            Err(e) => return ToolResult::fail(e),
        };
        match self.vfs.write(&path, &content) {
            Ok(()) => ToolResult::ok(format!("Wrote {} bytes to {path}", content.len()))
                .with_metadata(json!({"path": path, "bytes": content.len()})),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    fn edit_file(&mut self, input: &Value) -> ToolResult {
        let path = match str_arg(input, "file_path") {
            Ok(p) => p.to_string(),
            Err(e) => return ToolResult::fail(e),
        };
        let old_string = match str_arg(input, "old_string") {
            Ok(s) => s.to_string(),
            Err(e) => return ToolResult::fail(e),
        };
        let new_string = match str_arg(input, "new_string") {
            Ok(s) => s.to_string(),
            Err(e) => return ToolResult::fail(e),
        };
        match self.vfs.edit(&path, &old_string, &new_string) {
            Ok(()) => ToolResult::ok(format!("Edited {path}")),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    fn format_listing(&self, path: &str) -> std::result::Result<String, String> {
        let entries = self.vfs.list(path).map_err(|e| e.to_string())?;
        if entries.is_empty() {
            return Ok("(empty)".to_string());
        }
        Ok(entries
            .iter()
            .map(|entry| match entry.kind {
                VfsEntryKind::Directory => format!("{}/", entry.name),
                VfsEntryKind::File => {
                    format!("{} ({} bytes)", entry.name, entry.size_bytes.unwrap_or(0))
                }
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn list_files(&self, input: &Value) -> ToolResult {
        let path = match str_arg(input, "path") {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e),
        };
        match self.format_listing(path) {
            Ok(listing) => ToolResult::ok(listing),
            Err(e) => ToolResult::fail(e),
        }
    }

    fn glob_pattern(&self, input: &Value) -> ToolResult {
        let pattern = match str_arg(input, "pattern") {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e),
        };
        let base = opt_str_arg(input, "path");
        match self.vfs.glob(pattern, base) {
            Ok(matches) => {
                let count = matches.len();
                ToolResult::ok(matches.join("\n")).with_metadata(json!({"matches": count}))
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    /// The built-in mini-shell: whitespace splitting only, no quoting, no
    /// substitution, four verbs. It acts on the VFS, never the host.
    fn bash_command(&mut self, input: &Value) -> ToolResult {
        let command = match str_arg(input, "command") {
            Ok(c) => c,
            Err(e) => return ToolResult::fail(e),
        };
        let mut parts = command.split_whitespace();
        let Some(verb) = parts.next() else {
            return ToolResult::fail("Empty command");
        };

        match verb {
            "mkdir" => {
                let args: Vec<&str> = parts.filter(|arg| *arg != "-p").collect();
                let [path] = args.as_slice() else {
                    return ToolResult::fail("Usage: mkdir [-p] PATH");
                };
                match self.vfs.mkdir(path) {
                    Ok(()) => ToolResult::ok(format!("Created directory {path}")),
                    Err(e) => ToolResult::fail(e.to_string()),
                }
            }
            "ls" => {
                let path = parts.next().unwrap_or("/");
                match self.format_listing(path) {
                    Ok(listing) => ToolResult::ok(listing),
                    Err(e) => ToolResult::fail(e),
                }
            }
            "pwd" => ToolResult::ok("/"),
            "echo" => ToolResult::ok(parts.collect::<Vec<_>>().join(" ")),
            other => ToolResult::fail(format!(
                "Command not allowed: {other}. The built-in shell supports only: mkdir, ls, pwd, echo"
            )),
        }
    }

    async fn execute_command(&self, input: &Value) -> ToolResult {
        let Some(runner) = &self.command_executor else {
            return ToolResult::fail(
                "execute_command is not enabled for this session (no command executor configured)",
            );
        };
        let command = match str_arg(input, "command") {
            Ok(c) => c,
            Err(e) => return ToolResult::fail(e),
        };
        let args: Vec<String> = match input.get("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => {
                let mut args = Vec::with_capacity(values.len());
                for value in values {
                    match value.as_str() {
                        Some(s) => args.push(s.to_string()),
                        None => return ToolResult::fail("'args' must be an array of strings"),
                    }
                }
                args
            }
            Some(_) => return ToolResult::fail("'args' must be an array of strings"),
        };
        let working_directory = opt_str_arg(input, "working_directory").map(Path::new);

        match runner.execute(command, &args, working_directory).await {
            Ok(result) => {
                let metadata = json!({
                    "exitCode": result.exit_code,
                    "durationMs": result.duration_ms,
                    "timedOut": result.timed_out,
                });
                if result.success {
                    ToolResult::ok(result.stdout).with_metadata(metadata)
                } else {
                    ToolResult {
                        success: false,
                        content: Some(result.stdout),
                        error: Some(result.error.unwrap_or_else(|| {
                            format!(
                                "Command failed (exit code {:?}): {}",
                                result.exit_code,
                                result.stderr.trim()
                            )
                        })),
                        metadata: Some(metadata),
                    }
                }
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn ask_user(&self, input: &Value) -> ToolResult {
        let question = match str_arg(input, "question") {
            Ok(q) => q.to_string(),
            Err(e) => return ToolResult::fail(e),
        };
        let context = opt_str_arg(input, "context").map(String::from);
        let Some(host) = self.host() else {
            return ToolResult::fail("ask_user is not available: no session host attached");
        };
        match host.request_user_answer(question, context).await {
            Ok(answer) => ToolResult::ok(answer),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn invoke_agent(&mut self, input: &Value) -> Result<ToolResult> {
        let agent_id = match str_arg(input, "agent_id") {
            Ok(a) => a.to_string(),
            Err(e) => return Ok(ToolResult::fail(e)),
        };
        let command = match str_arg(input, "command") {
            Ok(c) => c.to_string(),
            Err(e) => return Ok(ToolResult::fail(e)),
        };
        let context = input.get("context").filter(|v| !v.is_null()).cloned();

        let Some(host) = self.host() else {
            return Ok(ToolResult::fail(
                "invoke_agent is not available: no session host attached",
            ));
        };
        if !host.known_agent_ids().iter().any(|id| id == &agent_id) {
            return Ok(ToolResult::fail(format!("Agent not found: {agent_id}")));
        }

        match host.run_sub_agent(&agent_id, &command, context).await {
            Ok(outcome) => {
                // The child's spend is credited whether it completed or not;
                // a budget breach here fails the whole session, not just the
                // tool.
                host.add_child_cost(outcome.child_cost.clone()).await?;
                match outcome.error {
                    None => {
                        for doc in &outcome.documents {
                            if let Err(e) = self.vfs.write(&doc.path, &doc.content) {
                                log::warn!(
                                    "failed to merge sub-agent document {}: {e}",
                                    doc.path
                                );
                            }
                        }
                        Ok(ToolResult::ok(outcome.summary.to_string()))
                    }
                    Some(error) => Ok(ToolResult::fail(format!("Sub-agent failed: {error}"))),
                }
            }
            Err(e) => Ok(ToolResult::fail(format!("Sub-agent failed: {e}"))),
        }
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, input: Value) -> ToolUseBlock {
        ToolUseBlock::new("call_1", name, input)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let mut executor = ToolExecutor::new();
        let result = executor
            .execute(&call(
                "write_file",
                json!({"file_path": "/docs/prd.md", "content": "# PRD"}),
            ))
            .await
            .unwrap();
        assert!(result.success);

        let result = executor
            .execute(&call("read_file", json!({"file_path": "/docs/prd.md"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some("# PRD"));
    }

    #[tokio::test]
    async fn test_non_absolute_path_fails_with_absolute_in_error() {
        let mut executor = ToolExecutor::new();
        for (name, input) in [
            ("read_file", json!({"file_path": "docs/prd.md"})),
            ("write_file", json!({"file_path": "docs/prd.md", "content": "x"})),
            (
                "edit_file",
                json!({"file_path": "docs/prd.md", "old_string": "a", "new_string": "b"}),
            ),
            ("list_files", json!({"path": "docs"})),
        ] {
            let result = executor.execute(&call(name, input)).await.unwrap();
            assert!(!result.success, "{name} should fail");
            assert!(
                result.error.as_deref().unwrap_or("").contains("absolute"),
                "{name} error should mention 'absolute'"
            );
        }
    }

    #[tokio::test]
    async fn test_missing_parameter() {
        let mut executor = ToolExecutor::new();
        let result = executor
            .execute(&call("read_file", json!({})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("file_path"));
    }

    #[tokio::test]
    async fn test_edit_ambiguity_reports_count() {
        let mut executor = ToolExecutor::new();
        executor
            .execute(&call(
                "write_file",
                json!({"file_path": "/t.md", "content": "test test test"}),
            ))
            .await
            .unwrap();

        let result = executor
            .execute(&call(
                "edit_file",
                json!({"file_path": "/t.md", "old_string": "test", "new_string": "x"}),
            ))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains('3'));
        assert_eq!(executor.vfs().read("/t.md").unwrap(), "test test test");
    }

    #[tokio::test]
    async fn test_glob_sorted_output() {
        let mut executor = ToolExecutor::new();
        for path in ["/a/b.md", "/a/aa.md", "/a/c.md"] {
            executor
                .execute(&call(
                    "write_file",
                    json!({"file_path": path, "content": ""}),
                ))
                .await
                .unwrap();
        }
        let result = executor
            .execute(&call("glob_pattern", json!({"pattern": "/a/*.md"})))
            .await
            .unwrap();
        assert_eq!(
            result.content.as_deref(),
            Some("/a/aa.md\n/a/b.md\n/a/c.md")
        );
    }

    #[tokio::test]
    async fn test_list_files_output() {
        let mut executor = ToolExecutor::new();
        executor.vfs_mut().write("/a/one.md", "12345").unwrap();
        executor.vfs_mut().write("/a/sub/x.md", "").unwrap();

        let result = executor
            .execute(&call("list_files", json!({"path": "/a"})))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("one.md (5 bytes)\nsub/"));
    }

    #[tokio::test]
    async fn test_bash_mini_shell() {
        let mut executor = ToolExecutor::new();

        let result = executor
            .execute(&call("bash_command", json!({"command": "mkdir -p /out"})))
            .await
            .unwrap();
        assert!(result.success);

        let result = executor
            .execute(&call("bash_command", json!({"command": "pwd"})))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("/"));

        let result = executor
            .execute(&call("bash_command", json!({"command": "echo hello world"})))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some("hello world"));

        let result = executor
            .execute(&call("bash_command", json!({"command": "ls /out"})))
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_bash_rejects_everything_else() {
        let mut executor = ToolExecutor::new();
        let result = executor
            .execute(&call("bash_command", json!({"command": "rm -rf /"})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not allowed"));
    }

    #[tokio::test]
    async fn test_execute_command_disabled_without_runner() {
        let mut executor = ToolExecutor::new();
        let result = executor
            .execute(&call("execute_command", json!({"command": "echo"})))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let mut executor = ToolExecutor::new();
        let result = executor
            .execute(&call("teleport", json!({})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_ask_user_without_host() {
        let mut executor = ToolExecutor::new();
        let result = executor
            .execute(&call("ask_user", json!({"question": "Which DB?"})))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_invoke_agent_without_host() {
        let mut executor = ToolExecutor::new();
        let result = executor
            .execute(&call(
                "invoke_agent",
                json!({"agent_id": "pm", "command": "create-prd"}),
            ))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_catalog_names() {
        let executor = ToolExecutor::new();
        let names: Vec<String> = executor.catalog().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "read_file",
                "write_file",
                "edit_file",
                "list_files",
                "glob_pattern",
                "bash_command",
                "ask_user",
                "invoke_agent",
            ]
        );
    }

    #[test]
    fn test_tool_result_into_block() {
        let block = ToolResult::ok("fine").into_block("call_9");
        assert_eq!(block.tool_use_id, "call_9");
        assert_eq!(block.content, "fine");
        assert_eq!(block.is_error, None);

        let block = ToolResult::fail("broken").into_block("call_9");
        assert_eq!(block.content, "broken");
        assert_eq!(block.is_error, Some(true));
    }
}
