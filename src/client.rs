//! Client: the process-wide registry and session factory.
//!
//! One [`Client`] owns the LLM provider, the optional storage backend, the
//! agent locator, and the active-session registry, the only process-wide
//! state in the runtime, kept as a single owned map with explicit
//! lifecycle. Sessions are created through the client and hold a reference
//! back to it for sub-agent delegation and persistence.
//!
//! # Example
//!
//! ```no_run
//! use bmad_runtime::{Client, ProviderConfig, SessionOptions};
//!
//! # async fn example() -> bmad_runtime::Result<()> {
//! let client = Client::builder()
//!     .provider_config(ProviderConfig::openai_compatible("qwen2.5-32b-instruct"))
//!     .build()?;
//!
//! let session = client.create_session("pm", "create-prd", SessionOptions::new())?;
//! let result = session.execute().await?;
//! println!("{} documents", result.documents.len());
//! # Ok(())
//! # }
//! ```

use crate::agent::AgentLocator;
use crate::command::CommandExecutor;
use crate::conversation::ConversationalSession;
use crate::error::{Error, Result};
use crate::events::SessionEvents;
use crate::openai::OpenAiCompatibleProvider;
use crate::provider::{LLMProvider, ProviderConfig};
use crate::session::AgentSession;
use crate::storage::StorageBackend;
use crate::types::{SessionOptions, SessionState};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use uuid::Uuid;

enum SessionEntry {
    OneShot(Weak<AgentSession>),
    Conversational(Weak<ConversationalSession>),
}

impl SessionEntry {
    fn alive(&self) -> bool {
        match self {
            SessionEntry::OneShot(weak) => weak.strong_count() > 0,
            SessionEntry::Conversational(weak) => weak.strong_count() > 0,
        }
    }
}

/// Builder for [`Client`].
///
/// A provider (instance or configuration) is required; everything else has
/// defaults.
pub struct ClientBuilder {
    provider: Option<Arc<dyn LLMProvider>>,
    provider_config: Option<ProviderConfig>,
    storage: Option<Arc<dyn StorageBackend>>,
    locator: AgentLocator,
    command_executor: Option<CommandExecutor>,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            provider: None,
            provider_config: None,
            storage: None,
            locator: AgentLocator::new(),
            command_executor: None,
        }
    }

    /// Injects a pre-built provider instance (takes precedence over
    /// [`ClientBuilder::provider_config`]).
    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Configures the bundled OpenAI-compatible provider.
    pub fn provider_config(mut self, config: ProviderConfig) -> Self {
        self.provider_config = Some(config);
        self
    }

    /// Attaches a storage backend for autosave, session loading, and
    /// document persistence.
    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Overrides the local agents directory (default `./.bmad-core/agents`).
    pub fn local_agents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.locator = self.locator.with_local_dir(dir);
        self
    }

    /// Overrides the shared authoring directory
    /// (default `../bmad-export-author/.bmad-core/agents`).
    pub fn shared_agents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.locator = self.locator.with_shared_dir(dir);
        self
    }

    /// Adds an expansion pack root scanned for `.bmad-*/agents/`.
    pub fn expansion_pack(mut self, dir: impl Into<PathBuf>) -> Self {
        self.locator.add_expansion_pack(dir);
        self
    }

    /// Registers an in-memory bundled agent definition.
    pub fn bundled_agent(mut self, id: impl Into<String>, source: impl Into<String>) -> Self {
        self.locator.add_bundled(id, source);
        self
    }

    /// Enables the `execute_command` tool with the given runner.
    pub fn command_executor(mut self, executor: CommandExecutor) -> Self {
        self.command_executor = Some(executor);
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> Result<Arc<Client>> {
        let provider: Arc<dyn LLMProvider> = match (self.provider, self.provider_config) {
            (Some(provider), _) => provider,
            (None, Some(config)) => Arc::new(OpenAiCompatibleProvider::new(config)?),
            (None, None) => {
                return Err(Error::config(
                    "a provider instance or provider configuration is required",
                ));
            }
        };

        Ok(Arc::new_cyclic(|weak| Client {
            self_ref: weak.clone(),
            provider,
            storage: self.storage,
            locator: self.locator,
            command_executor: self.command_executor,
            sessions: StdMutex::new(HashMap::new()),
        }))
    }
}

/// Owns the provider, storage, agent locator, and active-session registry;
/// the factory for all sessions. Safe for concurrent session creation.
pub struct Client {
    self_ref: Weak<Client>,
    provider: Arc<dyn LLMProvider>,
    storage: Option<Arc<dyn StorageBackend>>,
    locator: AgentLocator,
    command_executor: Option<CommandExecutor>,
    sessions: StdMutex<HashMap<String, SessionEntry>>,
}

impl Client {
    /// Starts a builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn arc(&self) -> Arc<Client> {
        self.self_ref
            .upgrade()
            .expect("client self-reference should outlive its sessions")
    }

    pub(crate) fn provider(&self) -> Arc<dyn LLMProvider> {
        self.provider.clone()
    }

    /// The configured storage backend, if any.
    pub fn storage(&self) -> Option<Arc<dyn StorageBackend>> {
        self.storage.clone()
    }

    pub(crate) fn locator(&self) -> &AgentLocator {
        &self.locator
    }

    pub(crate) fn command_executor(&self) -> Option<CommandExecutor> {
        self.command_executor.clone()
    }

    /// The closed set of agent ids visible to sessions.
    pub fn known_agent_ids(&self) -> Vec<String> {
        self.locator.known_ids()
    }

    fn register(&self, id: String, entry: SessionEntry) {
        let mut sessions = self.sessions.lock().expect("registry lock poisoned");
        sessions.retain(|_, existing| existing.alive());
        sessions.insert(id, entry);
    }

    /// Creates a one-shot session in the `pending` state.
    pub fn create_session(
        &self,
        agent_id: &str,
        command: &str,
        options: SessionOptions,
    ) -> Result<Arc<AgentSession>> {
        self.create_session_with_events(agent_id, command, options, SessionEvents::new())
    }

    /// Creates a one-shot session with event subscriptions.
    pub fn create_session_with_events(
        &self,
        agent_id: &str,
        command: &str,
        options: SessionOptions,
        events: SessionEvents,
    ) -> Result<Arc<AgentSession>> {
        if agent_id.trim().is_empty() {
            return Err(Error::invalid_input("agent_id cannot be empty"));
        }
        let id = format!("sess_{}", Uuid::new_v4().simple());
        let session = AgentSession::new(
            self.arc(),
            id.clone(),
            agent_id.to_string(),
            command.to_string(),
            options,
            events,
        );
        self.register(id, SessionEntry::OneShot(Arc::downgrade(&session)));
        Ok(session)
    }

    /// Creates a conversational session in the `idle` state.
    pub fn create_conversation(
        &self,
        agent_id: &str,
        options: SessionOptions,
    ) -> Result<Arc<ConversationalSession>> {
        self.create_conversation_with_events(agent_id, options, SessionEvents::new())
    }

    /// Creates a conversational session with event subscriptions.
    pub fn create_conversation_with_events(
        &self,
        agent_id: &str,
        options: SessionOptions,
        events: SessionEvents,
    ) -> Result<Arc<ConversationalSession>> {
        if agent_id.trim().is_empty() {
            return Err(Error::invalid_input("agent_id cannot be empty"));
        }
        let id = format!("conv_{}", Uuid::new_v4().simple());
        let engine = AgentSession::new(
            self.arc(),
            id.clone(),
            agent_id.to_string(),
            "conversation".to_string(),
            options,
            events.clone(),
        );
        let conversation = Arc::new(ConversationalSession::new(engine, events));
        self.register(
            id,
            SessionEntry::Conversational(Arc::downgrade(&conversation)),
        );
        Ok(conversation)
    }

    /// Reconstructs a session from serialized state.
    pub fn restore_session(
        &self,
        state: SessionState,
        events: SessionEvents,
    ) -> Result<Arc<AgentSession>> {
        let session = AgentSession::restore(self.arc(), state, events)?;
        self.register(
            session.id().to_string(),
            SessionEntry::OneShot(Arc::downgrade(&session)),
        );
        Ok(session)
    }

    /// Loads a serialized session from storage and reconstructs it.
    pub async fn load_session(&self, id: &str) -> Result<Arc<AgentSession>> {
        let storage = self
            .storage
            .clone()
            .ok_or_else(|| Error::config("no storage backend configured"))?;
        let state = storage.load_session_state(id).await?;
        self.restore_session(state, SessionEvents::new())
    }

    /// Looks up a live one-shot session by id.
    pub fn get_session(&self, id: &str) -> Option<Arc<AgentSession>> {
        let sessions = self.sessions.lock().expect("registry lock poisoned");
        match sessions.get(id)? {
            SessionEntry::OneShot(weak) => weak.upgrade(),
            SessionEntry::Conversational(_) => None,
        }
    }

    /// Looks up a live conversational session by id.
    pub fn get_conversation(&self, id: &str) -> Option<Arc<ConversationalSession>> {
        let sessions = self.sessions.lock().expect("registry lock poisoned");
        match sessions.get(id)? {
            SessionEntry::Conversational(weak) => weak.upgrade(),
            SessionEntry::OneShot(_) => None,
        }
    }

    /// Ids of sessions still alive in this process, sorted.
    pub fn active_session_ids(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock().expect("registry lock poisoned");
        sessions.retain(|_, entry| entry.alive());
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("provider_type", &self.provider.provider_type())
            .field("storage", &self.storage.is_some())
            .field("command_executor", &self.command_executor.is_some())
            .field(
                "active_sessions",
                &self.sessions.lock().expect("registry lock poisoned").len(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ToolDefinition;
    use crate::provider::{ModelInfo, RequestOptions};
    use crate::types::{Message, ProviderResponse};
    use async_trait::async_trait;

    struct NullProvider;

    #[async_trait]
    impl LLMProvider for NullProvider {
        async fn send_message(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _options: &RequestOptions,
        ) -> crate::Result<ProviderResponse> {
            Err(Error::provider("null provider"))
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                name: "null".to_string(),
                max_context_tokens: 1000,
                input_cost_per_1k: 0.0,
                output_cost_per_1k: 0.0,
            }
        }

        fn provider_type(&self) -> &str {
            "null"
        }
    }

    const PM: &str = "---\nagent:\n  name: PM\n  id: pm\n---\n";

    #[test]
    fn test_builder_requires_provider() {
        assert!(Client::builder().build().is_err());
    }

    #[test]
    fn test_session_ids_are_prefixed_and_registered() {
        let client = Client::builder()
            .provider(Arc::new(NullProvider))
            .bundled_agent("pm", PM)
            .build()
            .unwrap();

        let session = client
            .create_session("pm", "create-prd", SessionOptions::new())
            .unwrap();
        assert!(session.id().starts_with("sess_"));

        let conversation = client
            .create_conversation("pm", SessionOptions::new())
            .unwrap();
        assert!(conversation.id().starts_with("conv_"));

        assert_eq!(client.active_session_ids().len(), 2);
        assert!(client.get_session(session.id()).is_some());
        assert!(client.get_conversation(conversation.id()).is_some());
        // Wrong-kind lookups miss.
        assert!(client.get_session(conversation.id()).is_none());
    }

    #[test]
    fn test_registry_prunes_dropped_sessions() {
        let client = Client::builder()
            .provider(Arc::new(NullProvider))
            .bundled_agent("pm", PM)
            .build()
            .unwrap();

        let id = {
            let session = client
                .create_session("pm", "create-prd", SessionOptions::new())
                .unwrap();
            session.id().to_string()
        };
        assert!(client.get_session(&id).is_none());
        assert!(client.active_session_ids().is_empty());
    }

    #[test]
    fn test_known_agent_ids_from_bundled() {
        let client = Client::builder()
            .provider(Arc::new(NullProvider))
            .bundled_agent("pm", PM)
            .bundled_agent("analyst", "---\nagent:\n  name: A\n  id: analyst\n---\n")
            .build()
            .unwrap();
        assert_eq!(client.known_agent_ids(), vec!["analyst", "pm"]);
    }

    #[test]
    fn test_empty_agent_id_rejected() {
        let client = Client::builder()
            .provider(Arc::new(NullProvider))
            .build()
            .unwrap();
        assert!(client.create_session("", "x", SessionOptions::new()).is_err());
    }
}
