//! Multi-turn conversational sessions.
//!
//! A conversational session drives the same engine as a one-shot session
//! but preserves state across user turns instead of executing a single
//! command. The system prompt is seeded on the first `send`; each turn
//! pushes a user message, runs the tool-call loop, and records a
//! [`TurnRecord`].
//!
//! # State machine
//!
//! - `idle` accepts [`send`](ConversationalSession::send) and
//!   [`end`](ConversationalSession::end)
//! - `processing` rejects further sends and ends
//! - `waiting_for_answer` (reported while an `ask_user` pause is pending)
//!   accepts only [`answer`](ConversationalSession::answer)
//! - `ended` / `error` are terminal
//!
//! # Question events
//!
//! Besides the explicit `ask_user` pause, a `question` event is emitted
//! when a turn's final assistant text ends with `?`, a heuristic for
//! proactive elicitation, so a clear question is never silently dropped.

use crate::cost::CostReport;
use crate::error::{Error, Result};
use crate::events::{FailedEvent, MessageEvent, QuestionEvent, SessionEvents};
use crate::session::AgentSession;
use crate::types::{ConversationalStatus, Document, PendingQuestion, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

/// One completed conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    /// Turn id, `turn_1` onward.
    pub id: String,

    /// What the user sent.
    pub user_message: String,

    /// The final assistant text of the turn.
    pub agent_response: String,

    /// Names of the tools called during the turn, in order.
    pub tool_calls: Vec<String>,

    /// Tokens consumed by the turn (input + output).
    pub tokens_used: u64,

    /// Cost of the turn, child sessions included.
    pub cost: f64,

    /// When the turn completed.
    pub timestamp: DateTime<Utc>,
}

/// What [`ConversationalSession::end`] returns.
#[derive(Debug, Clone)]
pub struct ConversationResult {
    /// The conversation's session id (`conv_` prefixed).
    pub session_id: String,

    /// All completed turns, in order.
    pub turns: Vec<TurnRecord>,

    /// Aggregate user-visible documents from the conversation's VFS.
    pub documents: Vec<Document>,

    /// Full cost accounting.
    pub costs: CostReport,

    /// Wall-clock lifetime of the conversation in milliseconds.
    pub duration_ms: u64,
}

/// A multi-turn session sharing the one-shot engine.
///
/// Created through [`Client::create_conversation`](crate::Client::create_conversation).
pub struct ConversationalSession {
    engine: Arc<AgentSession>,
    events: SessionEvents,
    status: StdMutex<ConversationalStatus>,
    turns: StdMutex<Vec<TurnRecord>>,
    started: Instant,
}

impl ConversationalSession {
    pub(crate) fn new(engine: Arc<AgentSession>, events: SessionEvents) -> Self {
        Self {
            engine,
            events,
            status: StdMutex::new(ConversationalStatus::Idle),
            turns: StdMutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    /// The conversation's session id (`conv_` prefixed).
    pub fn id(&self) -> &str {
        self.engine.id()
    }

    /// The agent driving the conversation.
    pub fn agent_id(&self) -> &str {
        self.engine.agent_id()
    }

    /// Current conversational status.
    ///
    /// Reports `waiting_for_answer` whenever an `ask_user` pause is
    /// outstanding, regardless of the stored turn state.
    pub fn status(&self) -> ConversationalStatus {
        if self.engine.has_pending_question() {
            return ConversationalStatus::WaitingForAnswer;
        }
        *self.status.lock().expect("status lock poisoned")
    }

    /// The question the conversation is suspended on, if any.
    pub fn pending_question(&self) -> Option<PendingQuestion> {
        self.engine.pending_question()
    }

    /// Completed turns so far.
    pub fn turns(&self) -> Vec<TurnRecord> {
        self.turns.lock().expect("turns lock poisoned").clone()
    }

    /// Sends a user message and runs one full turn.
    ///
    /// Rejected while another turn is processing or after the conversation
    /// has ended; the state error leaves the conversation unchanged.
    pub async fn send(&self, message: impl Into<String>) -> Result<TurnRecord> {
        let message = message.into();
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            match *status {
                ConversationalStatus::Idle => *status = ConversationalStatus::Processing,
                ConversationalStatus::Processing | ConversationalStatus::WaitingForAnswer => {
                    return Err(Error::state("a turn is already processing"));
                }
                ConversationalStatus::Ended => {
                    return Err(Error::state("conversation has ended"));
                }
                ConversationalStatus::Error => {
                    return Err(Error::state("conversation is in an error state"));
                }
            }
        }

        let turn_number = self.turns.lock().expect("turns lock poisoned").len() + 1;
        match self.engine.run_conversation_turn(&message).await {
            Ok(delta) => {
                let record = TurnRecord {
                    id: format!("turn_{turn_number}"),
                    user_message: message,
                    agent_response: delta.assistant_text.clone(),
                    tool_calls: delta.tool_calls,
                    tokens_used: delta.tokens_used,
                    cost: delta.cost,
                    timestamp: Utc::now(),
                };
                self.turns
                    .lock()
                    .expect("turns lock poisoned")
                    .push(record.clone());
                *self.status.lock().expect("status lock poisoned") =
                    ConversationalStatus::Idle;

                if !delta.assistant_text.is_empty() {
                    self.events
                        .emit_message(MessageEvent {
                            session_id: self.id().to_string(),
                            text: delta.assistant_text.clone(),
                        })
                        .await;
                    if delta.assistant_text.trim_end().ends_with('?') {
                        self.events
                            .emit_question(QuestionEvent {
                                session_id: self.id().to_string(),
                                question: delta.assistant_text,
                                context: None,
                            })
                            .await;
                    }
                }
                Ok(record)
            }
            Err(error) => {
                *self.status.lock().expect("status lock poisoned") =
                    ConversationalStatus::Error;
                self.events
                    .emit_failed(FailedEvent {
                        session_id: self.id().to_string(),
                        error: error.to_string(),
                    })
                    .await;
                Err(error)
            }
        }
    }

    /// Answers the pending `ask_user` question of the in-flight turn.
    pub async fn answer(&self, text: impl Into<String>) -> Result<()> {
        self.engine.answer(text).await
    }

    /// Ends the conversation and returns its aggregate result.
    ///
    /// Valid only when no turn is processing.
    pub async fn end(&self) -> Result<ConversationResult> {
        {
            let mut status = self.status.lock().expect("status lock poisoned");
            match *status {
                ConversationalStatus::Processing | ConversationalStatus::WaitingForAnswer => {
                    return Err(Error::state("cannot end while a turn is processing"));
                }
                ConversationalStatus::Ended => {
                    return Err(Error::state("conversation has already ended"));
                }
                ConversationalStatus::Idle | ConversationalStatus::Error => {
                    *status = ConversationalStatus::Ended;
                }
            }
        }

        Ok(ConversationResult {
            session_id: self.id().to_string(),
            turns: self.turns(),
            documents: self.engine.documents().await,
            costs: self.engine.cost_report(),
            duration_ms: self.started.elapsed().as_millis() as u64,
        })
    }

    /// Serialized engine state for crash recovery.
    pub async fn serialize(&self) -> SessionState {
        self.engine.serialize().await
    }
}

impl std::fmt::Debug for ConversationalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationalSession")
            .field("id", &self.id())
            .field("agent_id", &self.agent_id())
            .field("status", &self.status())
            .field(
                "turns",
                &self.turns.lock().expect("turns lock poisoned").len(),
            )
            .finish()
    }
}
