//! One-shot session engine: the tool-call loop that drives an agent from
//! an initial command to a terminal state.
//!
//! # Lifecycle
//!
//! `pending -> running` on [`AgentSession::execute`]; the session may
//! oscillate `running <-> paused` through `ask_user` any number of times and
//! terminates in `completed` or `failed`. A [`SessionResult`] is produced
//! either way; failures carry the error string alongside whatever
//! artifacts and costs accrued.
//!
//! # The loop
//!
//! Each iteration sends the full message history plus the tool catalog to
//! the provider, records usage, snapshots state (when autosave is on),
//! enforces the cost limit, then branches on the stop reason. `tool_use`
//! turns execute every requested tool in order and answer them all in a
//! single user message, ids preserved. A safety bound of
//! [`MAX_LOOP_ITERATIONS`] turns fails the session with
//! [`Error::LoopBoundExceeded`].
//!
//! # Suspension and locking
//!
//! The mutable engine core sits behind one async lock taken per step, never
//! across a park. `ask_user` suspends on a oneshot channel with no lock
//! held, so the host can [`answer`](AgentSession::answer),
//! [`serialize`](AgentSession::serialize), or inspect the session while it
//! is paused.
//!
//! # Persistence
//!
//! [`AgentSession::serialize`] captures the full [`SessionState`];
//! [`AgentSession::restore`] rebuilds a session from it, VFS and costs
//! included. A session restored in `paused` is re-entered with
//! [`AgentSession::resume`], which re-dispatches the pending assistant
//! turn's tool calls so the stored question is asked again through a live
//! channel.

use crate::agent::AgentDefinition;
use crate::client::Client;
use crate::cost::{ChildSessionCost, CostReport, CostTracker};
use crate::error::{Error, Result};
use crate::events::{
    CompletedEvent, CostLimitExceededEvent, CostWarningEvent, FailedEvent, QuestionEvent,
    ResumedEvent, SessionEvents, StartedEvent,
};
use crate::executor::{SessionHost, SubAgentOutcome, ToolExecutor, ToolResult};
use crate::prompt::compose_system_prompt;
use crate::provider::{LLMProvider, RequestOptions};
use crate::storage::StorageMetadata;
use crate::types::{
    ContentBlock, Document, Message, MessageRole, PendingQuestion, SessionOptions, SessionResult,
    SessionState, SessionStatus, StopReason, ToolUseBlock,
};
use crate::vfs::VirtualFileSystem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, oneshot};

/// Safety bound on provider turns per execution.
pub const MAX_LOOP_ITERATIONS: u32 = 50;

/// Mutable engine state behind the session's async lock.
pub(crate) struct SessionCore {
    pub(crate) executor: ToolExecutor,
    pub(crate) messages: Vec<Message>,
    initialized: bool,
    agent: Option<AgentDefinition>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Timestamps {
    started_at: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct PendingAsk {
    question: PendingQuestion,
    /// Live answer channel; `None` on sessions restored from state.
    tx: Option<oneshot::Sender<String>>,
}

/// Holds the pending question outside the core lock, so the host can answer
/// while the executor is parked.
#[derive(Default)]
struct AskGate {
    pending: StdMutex<Option<PendingAsk>>,
}

impl AskGate {
    fn set(&self, question: PendingQuestion, tx: oneshot::Sender<String>) -> Result<()> {
        let mut pending = self.pending.lock().expect("ask gate lock poisoned");
        if pending.is_some() {
            return Err(Error::state("a question is already pending"));
        }
        *pending = Some(PendingAsk {
            question,
            tx: Some(tx),
        });
        Ok(())
    }

    fn restore(&self, question: PendingQuestion) {
        *self.pending.lock().expect("ask gate lock poisoned") =
            Some(PendingAsk { question, tx: None });
    }

    fn take_live(&self) -> Result<PendingAsk> {
        let mut pending = self.pending.lock().expect("ask gate lock poisoned");
        match pending.as_ref() {
            None => Err(Error::state("no pending question to answer")),
            Some(ask) if ask.tx.is_none() => Err(Error::state(
                "session was restored while paused; call resume() to re-ask the question",
            )),
            Some(_) => Ok(pending.take().expect("checked above")),
        }
    }

    fn clear(&self) {
        self.pending.lock().expect("ask gate lock poisoned").take();
    }

    fn question(&self) -> Option<PendingQuestion> {
        self.pending
            .lock()
            .expect("ask gate lock poisoned")
            .as_ref()
            .map(|ask| ask.question.clone())
    }
}

fn last_assistant_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|message| message.role == MessageRole::Assistant)
        .map(Message::text)
        .filter(|text| !text.is_empty())
}

/// Per-turn accounting deltas handed to the conversational driver.
pub(crate) struct TurnDelta {
    pub(crate) assistant_text: String,
    pub(crate) tool_calls: Vec<String>,
    pub(crate) tokens_used: u64,
    pub(crate) cost: f64,
}

/// A one-shot agent session: executes one command to completion.
///
/// Created through [`Client::create_session`]. All methods take `&self`;
/// internal locking keeps the tool loop strictly ordered while the host
/// answers questions or reads state concurrently.
pub struct AgentSession {
    id: String,
    agent_id: String,
    command: String,
    client: Arc<Client>,
    options: SessionOptions,
    events: SessionEvents,
    provider: Arc<dyn LLMProvider>,
    cost: Arc<CostTracker>,
    core: AsyncMutex<SessionCore>,
    status: StdMutex<SessionStatus>,
    timestamps: StdMutex<Timestamps>,
    ask: AskGate,
    created_at: DateTime<Utc>,
    last_error: StdMutex<Option<String>>,
}

impl AgentSession {
    pub(crate) fn new(
        client: Arc<Client>,
        id: String,
        agent_id: String,
        command: String,
        options: SessionOptions,
        events: SessionEvents,
    ) -> Arc<Self> {
        let provider = client.provider();
        let cost = Arc::new(CostTracker::new(&provider.model_info()));
        Arc::new_cyclic(|weak: &Weak<AgentSession>| {
            let mut executor = ToolExecutor::new();
            if let Some(runner) = client.command_executor() {
                executor = executor.with_command_executor(runner);
            }
            let host: Weak<dyn SessionHost> = weak.clone();
            executor.set_host(host);
            AgentSession {
                id,
                agent_id,
                command,
                client,
                options,
                events,
                provider,
                cost,
                core: AsyncMutex::new(SessionCore {
                    executor,
                    messages: Vec::new(),
                    initialized: false,
                    agent: None,
                }),
                status: StdMutex::new(SessionStatus::Pending),
                timestamps: StdMutex::new(Timestamps::default()),
                ask: AskGate::default(),
                created_at: Utc::now(),
                last_error: StdMutex::new(None),
            }
        })
    }

    /// Rebuilds a session from serialized state.
    pub(crate) fn restore(
        client: Arc<Client>,
        state: SessionState,
        events: SessionEvents,
    ) -> Result<Arc<Self>> {
        let provider = client.provider();
        if state.provider_type != provider.provider_type() {
            log::warn!(
                "session {} was serialized with provider '{}', restoring with '{}'",
                state.id,
                state.provider_type,
                provider.provider_type()
            );
        }
        let info = provider.model_info();
        let model = state.model_name.clone().unwrap_or_else(|| info.name.clone());
        let cost = Arc::new(CostTracker::restore(
            &info,
            &model,
            state.total_input_tokens,
            state.total_output_tokens,
            state.api_call_count,
            state.child_session_costs.clone(),
        ));

        let session = Arc::new_cyclic(|weak: &Weak<AgentSession>| {
            let mut executor = ToolExecutor::new();
            if let Some(runner) = client.command_executor() {
                executor = executor.with_command_executor(runner);
            }
            let host: Weak<dyn SessionHost> = weak.clone();
            executor.set_host(host);
            *executor.vfs_mut() = VirtualFileSystem::from_snapshot(state.vfs_files.clone());
            AgentSession {
                id: state.id.clone(),
                agent_id: state.agent_id.clone(),
                command: state.command.clone(),
                client,
                options: state.options.clone(),
                events,
                provider,
                cost,
                core: AsyncMutex::new(SessionCore {
                    executor,
                    messages: state.messages.clone(),
                    initialized: !state.messages.is_empty(),
                    agent: None,
                }),
                status: StdMutex::new(state.status),
                timestamps: StdMutex::new(Timestamps {
                    started_at: state.started_at,
                    paused_at: state.paused_at,
                    completed_at: state.completed_at,
                }),
                ask: AskGate::default(),
                created_at: state.created_at,
                last_error: StdMutex::new(None),
            }
        });
        if let Some(question) = state.pending_question {
            session.ask.restore(question);
        }
        Ok(session)
    }

    /// The session id (`sess_` prefixed, `conv_` for conversation engines).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The agent this session runs.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The command this session executes.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    /// The options the session was created with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Current cost accounting.
    pub fn cost_report(&self) -> CostReport {
        self.cost.report()
    }

    /// The question the session is paused on, if any.
    pub fn pending_question(&self) -> Option<PendingQuestion> {
        self.ask.question()
    }

    /// True while an `ask_user` pause is outstanding.
    pub fn has_pending_question(&self) -> bool {
        self.ask.question().is_some()
    }

    /// Current user-visible documents (agent definitions excluded).
    pub async fn documents(&self) -> Vec<Document> {
        self.core.lock().await.executor.vfs().documents()
    }

    /// The resolved agent definition, available once execution has started.
    pub async fn agent_definition(&self) -> Option<AgentDefinition> {
        self.core.lock().await.agent.clone()
    }

    /// The error string of the last failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("error lock poisoned").clone()
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().expect("status lock poisoned") = status;
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Runs the session to a terminal state.
    ///
    /// Always produces a [`SessionResult`] for execution outcomes, success
    /// or failure. The only `Err` is a state violation (the session was not
    /// `pending`), which leaves the session untouched.
    pub async fn execute(&self) -> Result<SessionResult> {
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            if *status != SessionStatus::Pending {
                return Err(Error::state(format!(
                    "execute requires a pending session (status is {:?})",
                    *status
                )));
            }
            *status = SessionStatus::Running;
        }
        self.timestamps
            .lock()
            .expect("timestamps lock poisoned")
            .started_at = Some(Utc::now());

        let started = Instant::now();
        self.events
            .emit_started(StartedEvent {
                session_id: self.id.clone(),
                agent_id: self.agent_id.clone(),
                command: self.command.clone(),
            })
            .await;

        let outcome: Result<()> = async {
            {
                let mut core = self.core.lock().await;
                self.ensure_initialized(&mut core)?;
                core.messages.push(Message::user(self.initial_user_message()));
            }
            self.run_loop().await
        }
        .await;

        match outcome {
            Ok(()) => Ok(self.finish(started).await),
            Err(error) => Ok(self.fail(error, started).await),
        }
    }

    /// Continues a completed session with an appended user message.
    ///
    /// Only permitted when the status is `completed`; the session runs the
    /// loop again and terminates normally.
    pub async fn continue_with(&self, message: impl Into<String>) -> Result<SessionResult> {
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            if *status != SessionStatus::Completed {
                return Err(Error::state(format!(
                    "continue_with requires a completed session (status is {:?})",
                    *status
                )));
            }
            *status = SessionStatus::Running;
        }

        let message = message.into();
        let started = Instant::now();
        let outcome: Result<()> = async {
            self.core.lock().await.messages.push(Message::user(message));
            self.run_loop().await
        }
        .await;

        match outcome {
            Ok(()) => Ok(self.finish(started).await),
            Err(error) => Ok(self.fail(error, started).await),
        }
    }

    /// Re-enters a session restored in the `paused` state.
    ///
    /// The pending assistant turn's tool calls are dispatched again in
    /// order; the stored question is re-asked through a live channel, and
    /// the host answers it with [`AgentSession::answer`] as usual.
    pub async fn resume(&self) -> Result<SessionResult> {
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            if *status != SessionStatus::Paused {
                return Err(Error::state(format!(
                    "resume requires a paused session (status is {:?})",
                    *status
                )));
            }
            *status = SessionStatus::Running;
        }
        self.ask.clear();
        self.timestamps
            .lock()
            .expect("timestamps lock poisoned")
            .paused_at = None;

        let started = Instant::now();
        let outcome: Result<()> = async {
            let calls: Vec<ToolUseBlock> = {
                let core = self.core.lock().await;
                core.messages
                    .last()
                    .filter(|message| message.role == MessageRole::Assistant)
                    .map(|message| message.tool_uses().into_iter().cloned().collect())
                    .unwrap_or_default()
            };

            if !calls.is_empty() {
                let blocks = self.dispatch_tool_calls(&calls).await?;
                self.core
                    .lock()
                    .await
                    .messages
                    .push(Message::user_with_blocks(blocks));
                self.enforce_costs().await?;
            }
            self.run_loop().await
        }
        .await;

        match outcome {
            Ok(()) => Ok(self.finish(started).await),
            Err(error) => Ok(self.fail(error, started).await),
        }
    }

    /// Answers the pending `ask_user` question, resuming the loop.
    ///
    /// Raises a state error when no question is pending; the session is
    /// unchanged in that case.
    pub async fn answer(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        let pending = self.ask.take_live()?;
        self.set_status(SessionStatus::Running);
        self.timestamps
            .lock()
            .expect("timestamps lock poisoned")
            .paused_at = None;

        pending
            .tx
            .expect("take_live only returns live channels")
            .send(text.clone())
            .map_err(|_| Error::state("session is no longer waiting for an answer"))?;

        self.events
            .emit_resumed(ResumedEvent {
                session_id: self.id.clone(),
                answer: text,
            })
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Engine internals
    // ------------------------------------------------------------------

    fn initial_user_message(&self) -> String {
        let mut text = format!("Execute command: {}", self.command);
        if let Some(context) = &self.options.context {
            if let Ok(rendered) = serde_json::to_string_pretty(context) {
                text.push_str("\n\nContext:\n");
                text.push_str(&rendered);
            }
        }
        text
    }

    /// Resolves the agent, populates the VFS with every discovered
    /// definition (bundled, then expansion packs, then local; later writes win), and
    /// seeds the system prompt.
    fn ensure_initialized(&self, core: &mut SessionCore) -> Result<()> {
        if core.initialized {
            return Ok(());
        }
        let locator = self.client.locator();
        let agent = locator.resolve(&self.agent_id)?;

        for discovered in locator.discover() {
            core.executor
                .vfs_mut()
                .write(&discovered.vfs_path, &discovered.source)?;
        }

        let system_prompt = compose_system_prompt(&agent, &core.executor.catalog());
        core.messages.push(Message::system(system_prompt));
        core.agent = Some(agent);
        core.initialized = true;
        Ok(())
    }

    /// The tool-call loop. The core lock is taken per step and never held
    /// across an `ask_user` park, so the host stays able to observe and
    /// serialize the session mid-run.
    pub(crate) async fn run_loop(&self) -> Result<()> {
        let request_options = RequestOptions {
            max_output_tokens: self.options.max_output_tokens,
            temperature: self.options.temperature,
        };
        let model = self.provider.model_info().name;

        for _ in 0..MAX_LOOP_ITERATIONS {
            let (messages, tools) = {
                let core = self.core.lock().await;
                (core.messages.clone(), core.executor.catalog())
            };
            let response = self
                .provider
                .send_message(&messages, &tools, &request_options)
                .await?;

            self.cost.record_usage(&response.usage, &model);
            {
                let mut core = self.core.lock().await;
                core.messages.push(response.message.clone());
                self.autosave(&core).await;
            }
            self.enforce_costs().await?;

            match response.stop_reason {
                StopReason::EndTurn | StopReason::StopSequence => return Ok(()),
                StopReason::MaxTokens => {
                    log::warn!("session {}: response cut off by max_tokens", self.id);
                    return Ok(());
                }
                StopReason::ToolUse => {
                    let calls: Vec<ToolUseBlock> = response
                        .message
                        .tool_uses()
                        .into_iter()
                        .cloned()
                        .collect();
                    if calls.is_empty() {
                        log::warn!(
                            "session {}: stop_reason tool_use without tool_use blocks",
                            self.id
                        );
                        return Ok(());
                    }

                    let blocks = self.dispatch_tool_calls(&calls).await?;
                    self.core
                        .lock()
                        .await
                        .messages
                        .push(Message::user_with_blocks(blocks));
                    self.enforce_costs().await?;
                }
            }
        }

        Err(Error::LoopBoundExceeded(MAX_LOOP_ITERATIONS))
    }

    /// Executes one turn's tool calls sequentially, in declared order.
    ///
    /// `ask_user` is intercepted here and parked without the core lock;
    /// everything else dispatches through the executor under the lock.
    async fn dispatch_tool_calls(&self, calls: &[ToolUseBlock]) -> Result<Vec<ContentBlock>> {
        let mut blocks = Vec::with_capacity(calls.len());
        for call in calls {
            let result = if call.name == "ask_user" {
                self.ask_user_unlocked(&call.input).await
            } else {
                let mut core = self.core.lock().await;
                core.executor.execute(call).await?
            };
            blocks.push(ContentBlock::ToolResult(result.into_block(&call.id)));
        }
        Ok(blocks)
    }

    async fn ask_user_unlocked(&self, input: &Value) -> ToolResult {
        let Some(question) = input.get("question").and_then(Value::as_str) else {
            return ToolResult::fail("Missing required parameter 'question'");
        };
        let context = input
            .get("context")
            .and_then(Value::as_str)
            .map(String::from);
        match self.request_user_answer(question.to_string(), context).await {
            Ok(answer) => ToolResult::ok(answer),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }

    async fn enforce_costs(&self) -> Result<()> {
        let crossed = self.cost.enforce(self.options.cost_limit)?;
        for threshold in crossed {
            self.events
                .emit_cost_warning(CostWarningEvent {
                    session_id: self.id.clone(),
                    threshold,
                    total_cost: self.cost.total_cost(),
                    limit: self.options.cost_limit.unwrap_or_default(),
                })
                .await;
        }
        Ok(())
    }

    async fn autosave(&self, core: &SessionCore) {
        if !self.options.auto_save {
            return;
        }
        let Some(storage) = self.client.storage() else {
            return;
        };
        let state = self.snapshot_locked(core);
        if let Err(e) = storage.save_session_state(&state).await {
            log::warn!("session {}: autosave failed: {e}", self.id);
        }
    }

    fn snapshot_locked(&self, core: &SessionCore) -> SessionState {
        let (total_input_tokens, total_output_tokens, api_call_count) = self.cost.own_totals();
        let timestamps = *self.timestamps.lock().expect("timestamps lock poisoned");
        SessionState {
            id: self.id.clone(),
            agent_id: self.agent_id.clone(),
            command: self.command.clone(),
            status: self.status(),
            created_at: self.created_at,
            started_at: timestamps.started_at,
            paused_at: timestamps.paused_at,
            completed_at: timestamps.completed_at,
            messages: core.messages.clone(),
            vfs_files: core.executor.vfs().snapshot(),
            total_input_tokens,
            total_output_tokens,
            total_cost: self.cost.total_cost(),
            api_call_count,
            child_session_costs: self.cost.children(),
            pending_question: self.ask.question(),
            options: self.options.clone(),
            provider_type: self.provider.provider_type().to_string(),
            model_name: Some(self.provider.model_info().name),
        }
    }

    /// Full serialized state, usable for crash recovery at any point,
    /// including while the session is paused on a question.
    pub async fn serialize(&self) -> SessionState {
        let core = self.core.lock().await;
        self.snapshot_locked(&core)
    }

    async fn finish(&self, started: Instant) -> SessionResult {
        let documents = self.core.lock().await.executor.vfs().documents();

        let mut storage_urls = Vec::new();
        if self.options.save_documents && !documents.is_empty() {
            if let Some(storage) = self.client.storage() {
                // Documents are namespaced by session id in storage.
                let batch: Vec<(Document, StorageMetadata)> = documents
                    .iter()
                    .map(|doc| {
                        let stored =
                            Document::new(format!("/{}{}", self.id, doc.path), doc.content.clone());
                        let metadata = StorageMetadata::for_document(
                            &stored,
                            &self.id,
                            &self.agent_id,
                            &self.command,
                        );
                        (stored, metadata)
                    })
                    .collect();
                match storage.save_batch(&batch).await {
                    Ok(results) => {
                        storage_urls = results
                            .into_iter()
                            .map(|result| result.url.unwrap_or(result.path))
                            .collect();
                    }
                    Err(e) => log::warn!("session {}: document persistence failed: {e}", self.id),
                }
            }
        }

        self.set_status(SessionStatus::Completed);
        self.timestamps
            .lock()
            .expect("timestamps lock poisoned")
            .completed_at = Some(Utc::now());

        let final_response = {
            let core = self.core.lock().await;
            self.autosave(&core).await;
            last_assistant_text(&core.messages)
        };

        let costs = self.cost.report();
        self.events
            .emit_completed(CompletedEvent {
                session_id: self.id.clone(),
                total_cost: costs.total_cost,
                document_count: documents.len(),
            })
            .await;

        SessionResult {
            session_id: self.id.clone(),
            status: SessionStatus::Completed,
            final_response,
            documents,
            costs,
            duration_ms: started.elapsed().as_millis() as u64,
            storage_urls,
            error: None,
        }
    }

    async fn fail(&self, error: Error, started: Instant) -> SessionResult {
        let error_text = error.to_string();
        log::error!("session {} failed: {error_text}", self.id);

        self.set_status(SessionStatus::Failed);
        self.timestamps
            .lock()
            .expect("timestamps lock poisoned")
            .completed_at = Some(Utc::now());
        *self.last_error.lock().expect("error lock poisoned") = Some(error_text.clone());
        self.ask.clear();

        if let Error::CostLimitExceeded { total, limit } = &error {
            self.events
                .emit_cost_limit_exceeded(CostLimitExceededEvent {
                    session_id: self.id.clone(),
                    total_cost: *total,
                    limit: *limit,
                })
                .await;
        }

        let (final_response, documents) = {
            let core = self.core.lock().await;
            self.autosave(&core).await;
            (
                last_assistant_text(&core.messages),
                core.executor.vfs().documents(),
            )
        };

        self.events
            .emit_failed(FailedEvent {
                session_id: self.id.clone(),
                error: error_text.clone(),
            })
            .await;

        SessionResult {
            session_id: self.id.clone(),
            status: SessionStatus::Failed,
            final_response,
            documents,
            costs: self.cost.report(),
            duration_ms: started.elapsed().as_millis() as u64,
            storage_urls: Vec::new(),
            error: Some(error_text),
        }
    }

    // ------------------------------------------------------------------
    // Conversational driver support
    // ------------------------------------------------------------------

    /// Seeds the system prompt (first call only), appends a user message,
    /// and runs the loop once, reporting per-turn deltas.
    pub(crate) async fn run_conversation_turn(&self, text: &str) -> Result<TurnDelta> {
        let cost_before = self.cost.total_cost();
        let (input_before, output_before, _) = self.cost.own_totals();

        let turn_start = {
            let mut core = self.core.lock().await;
            self.ensure_initialized(&mut core)?;
            let turn_start = core.messages.len();
            core.messages.push(Message::user(text));
            turn_start
        };
        self.run_loop().await?;

        let (assistant_text, tool_calls) = {
            let core = self.core.lock().await;
            let turn_messages = &core.messages[turn_start..];
            let assistant_text = last_assistant_text(turn_messages).unwrap_or_default();
            let tool_calls: Vec<String> = turn_messages
                .iter()
                .filter(|message| message.role == MessageRole::Assistant)
                .flat_map(|message| {
                    message
                        .tool_uses()
                        .into_iter()
                        .map(|call| call.name.clone())
                })
                .collect();
            (assistant_text, tool_calls)
        };

        let (input_after, output_after, _) = self.cost.own_totals();
        Ok(TurnDelta {
            assistant_text,
            tool_calls,
            tokens_used: (input_after - input_before) + (output_after - output_before),
            cost: self.cost.total_cost() - cost_before,
        })
    }
}

#[async_trait]
impl SessionHost for AgentSession {
    async fn request_user_answer(
        &self,
        question: String,
        context: Option<String>,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.ask.set(
            PendingQuestion {
                question: question.clone(),
                context: context.clone(),
            },
            tx,
        )?;
        self.set_status(SessionStatus::Paused);
        self.timestamps
            .lock()
            .expect("timestamps lock poisoned")
            .paused_at = Some(Utc::now());

        log::debug!("session {} paused on question: {question}", self.id);
        self.events
            .emit_question(QuestionEvent {
                session_id: self.id.clone(),
                question,
                context,
            })
            .await;

        rx.await
            .map_err(|_| Error::state("the pending question was dropped without an answer"))
    }

    async fn run_sub_agent(
        &self,
        agent_id: &str,
        command: &str,
        context: Option<Value>,
    ) -> Result<SubAgentOutcome> {
        // Child context: the parent's context augmented with the delegation
        // markers, plus whatever the model passed along.
        let mut child_context = match (&self.options.context, context) {
            (Some(Value::Object(parent)), Some(Value::Object(extra))) => {
                let mut merged = parent.clone();
                merged.extend(extra);
                Value::Object(merged)
            }
            (Some(parent), None) => parent.clone(),
            (None, Some(extra)) => extra,
            (Some(parent), Some(extra)) => json!({"parent": parent, "request": extra}),
            (None, None) => json!({}),
        };
        if let Value::Object(map) = &mut child_context {
            map.insert("parentSessionId".to_string(), json!(self.id));
            map.insert("isSubAgent".to_string(), json!(true));
        }

        let mut child_options = SessionOptions::new()
            .with_context(child_context)
            .with_auto_save(self.options.auto_save)
            .with_max_output_tokens(self.options.max_output_tokens);
        if let Some(temperature) = self.options.temperature {
            child_options = child_options.with_temperature(temperature);
        }
        if let Some(remaining) = self.remaining_budget() {
            child_options = child_options.with_cost_limit(remaining);
        }

        log::debug!(
            "session {}: delegating '{command}' to agent {agent_id}",
            self.id
        );
        // The child shares the parent's event sink: its question events carry
        // the child session id, and the host answers through the client
        // registry.
        let child = self
            .client
            .create_session_with_events(agent_id, command, child_options, self.events.clone())?;
        let result = child.execute().await?;

        let child_cost = ChildSessionCost {
            session_id: result.session_id.clone(),
            agent: agent_id.to_string(),
            command: command.to_string(),
            total_cost: result.costs.total_cost,
            input_tokens: result.costs.input_tokens,
            output_tokens: result.costs.output_tokens,
            api_calls: result.costs.api_calls,
        };
        let failed = result.status != SessionStatus::Completed;
        let summary = json!({
            "status": if failed { "failed" } else { "completed" },
            "agent": agent_id,
            "command": command,
            "documents": result
                .documents
                .iter()
                .map(|doc| json!({"path": doc.path, "size": doc.content.len()}))
                .collect::<Vec<_>>(),
            "costs": {
                "totalCost": child_cost.total_cost,
                "inputTokens": child_cost.input_tokens,
                "outputTokens": child_cost.output_tokens,
                "apiCalls": child_cost.api_calls,
            },
            "duration": result.duration_ms,
        });

        Ok(SubAgentOutcome {
            summary,
            documents: if failed { Vec::new() } else { result.documents },
            child_cost,
            error: if failed {
                Some(
                    result
                        .error
                        .unwrap_or_else(|| "sub-agent terminated without completing".to_string()),
                )
            } else {
                None
            },
        })
    }

    async fn add_child_cost(&self, cost: ChildSessionCost) -> Result<()> {
        self.cost.add_child(cost);
        self.enforce_costs().await
    }

    fn remaining_budget(&self) -> Option<f64> {
        self.cost.remaining(self.options.cost_limit)
    }

    fn known_agent_ids(&self) -> Vec<String> {
        self.client.known_agent_ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_gate_single_pending_question() {
        let gate = AskGate::default();
        let (tx, _rx) = oneshot::channel();
        gate.set(
            PendingQuestion {
                question: "Which DB?".to_string(),
                context: None,
            },
            tx,
        )
        .unwrap();

        let (tx2, _rx2) = oneshot::channel();
        let err = gate
            .set(
                PendingQuestion {
                    question: "another".to_string(),
                    context: None,
                },
                tx2,
            )
            .unwrap_err();
        assert!(err.to_string().contains("already pending"));

        assert!(gate.take_live().is_ok());
        assert!(gate.take_live().is_err());
    }

    #[test]
    fn test_ask_gate_restored_question_needs_resume() {
        let gate = AskGate::default();
        gate.restore(PendingQuestion {
            question: "Which DB?".to_string(),
            context: None,
        });
        let err = gate.take_live().unwrap_err();
        assert!(err.to_string().contains("resume"));
        // The question stays pending until resume clears it.
        assert!(gate.question().is_some());
    }

    #[test]
    fn test_last_assistant_text() {
        let messages = vec![
            Message::system("s"),
            Message::user("u"),
            Message::assistant(vec![ContentBlock::Text(crate::types::TextBlock::new(
                "first",
            ))]),
            Message::user("u2"),
            Message::assistant(vec![ContentBlock::Text(crate::types::TextBlock::new(
                "second",
            ))]),
        ];
        assert_eq!(last_assistant_text(&messages).as_deref(), Some("second"));
        assert_eq!(last_assistant_text(&[Message::user("u")]), None);
    }
}
