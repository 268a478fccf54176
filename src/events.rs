//! Session events for host observation
//!
//! Hosts can subscribe async callbacks to lifecycle points of a session:
//! start, question/resume, assistant messages (conversational), completion,
//! failure, and cost warnings. Events are purely observational; they are
//! never a substitute for the returned `SessionResult`.
//!
//! # Examples
//!
//! ```rust
//! use bmad_runtime::{SessionEvents, QuestionEvent};
//!
//! let events = SessionEvents::new().on_question(|event: QuestionEvent| async move {
//!     println!("agent asks: {}", event.question);
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Fired when a session transitions `pending -> running`.
#[derive(Debug, Clone)]
pub struct StartedEvent {
    pub session_id: String,
    pub agent_id: String,
    pub command: String,
}

/// Fired when the model asks the user a question and the session pauses.
#[derive(Debug, Clone)]
pub struct QuestionEvent {
    pub session_id: String,
    pub question: String,
    pub context: Option<String>,
}

/// Fired when the host answers a pending question and the session resumes.
#[derive(Debug, Clone)]
pub struct ResumedEvent {
    pub session_id: String,
    pub answer: String,
}

/// Fired for assistant text produced during a conversational turn.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub session_id: String,
    pub text: String,
}

/// Fired on successful terminal transition.
#[derive(Debug, Clone)]
pub struct CompletedEvent {
    pub session_id: String,
    pub total_cost: f64,
    pub document_count: usize,
}

/// Fired on failed terminal transition.
#[derive(Debug, Clone)]
pub struct FailedEvent {
    pub session_id: String,
    pub error: String,
}

/// Fired once per crossed warning threshold of the cost limit.
#[derive(Debug, Clone)]
pub struct CostWarningEvent {
    pub session_id: String,
    /// The crossed fraction of the limit (0.5, 0.75, 0.9).
    pub threshold: f64,
    pub total_cost: f64,
    pub limit: f64,
}

/// Fired when the cost limit is reached and the session fails.
#[derive(Debug, Clone)]
pub struct CostLimitExceededEvent {
    pub session_id: String,
    pub total_cost: f64,
    pub limit: f64,
}

/// Type alias for event handler functions
type EventHandler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Container for all session event subscriptions.
///
/// Cloning shares the registered handlers.
#[derive(Clone, Default)]
pub struct SessionEvents {
    started: Vec<EventHandler<StartedEvent>>,
    question: Vec<EventHandler<QuestionEvent>>,
    resumed: Vec<EventHandler<ResumedEvent>>,
    message: Vec<EventHandler<MessageEvent>>,
    completed: Vec<EventHandler<CompletedEvent>>,
    failed: Vec<EventHandler<FailedEvent>>,
    cost_warning: Vec<EventHandler<CostWarningEvent>>,
    cost_limit_exceeded: Vec<EventHandler<CostLimitExceededEvent>>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to session start.
    pub fn on_started<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(StartedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.started
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Subscribe to questions (pause points).
    pub fn on_question<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(QuestionEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.question
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Subscribe to resumes.
    pub fn on_resumed<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ResumedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.resumed
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Subscribe to assistant messages (conversational sessions).
    pub fn on_message<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.message
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Subscribe to successful completion.
    pub fn on_completed<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(CompletedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.completed
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Subscribe to failures.
    pub fn on_failed<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(FailedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.failed
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Subscribe to cost warnings.
    pub fn on_cost_warning<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(CostWarningEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cost_warning
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Subscribe to cost-limit breaches.
    pub fn on_cost_limit_exceeded<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(CostLimitExceededEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cost_limit_exceeded
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub(crate) async fn emit_started(&self, event: StartedEvent) {
        for handler in &self.started {
            handler(event.clone()).await;
        }
    }

    pub(crate) async fn emit_question(&self, event: QuestionEvent) {
        for handler in &self.question {
            handler(event.clone()).await;
        }
    }

    pub(crate) async fn emit_resumed(&self, event: ResumedEvent) {
        for handler in &self.resumed {
            handler(event.clone()).await;
        }
    }

    pub(crate) async fn emit_message(&self, event: MessageEvent) {
        for handler in &self.message {
            handler(event.clone()).await;
        }
    }

    pub(crate) async fn emit_completed(&self, event: CompletedEvent) {
        for handler in &self.completed {
            handler(event.clone()).await;
        }
    }

    pub(crate) async fn emit_failed(&self, event: FailedEvent) {
        for handler in &self.failed {
            handler(event.clone()).await;
        }
    }

    pub(crate) async fn emit_cost_warning(&self, event: CostWarningEvent) {
        for handler in &self.cost_warning {
            handler(event.clone()).await;
        }
    }

    pub(crate) async fn emit_cost_limit_exceeded(&self, event: CostLimitExceededEvent) {
        for handler in &self.cost_limit_exceeded {
            handler(event.clone()).await;
        }
    }
}

impl std::fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvents")
            .field("started", &format!("{} handlers", self.started.len()))
            .field("question", &format!("{} handlers", self.question.len()))
            .field("resumed", &format!("{} handlers", self.resumed.len()))
            .field("message", &format!("{} handlers", self.message.len()))
            .field("completed", &format!("{} handlers", self.completed.len()))
            .field("failed", &format!("{} handlers", self.failed.len()))
            .field(
                "cost_warning",
                &format!("{} handlers", self.cost_warning.len()),
            )
            .field(
                "cost_limit_exceeded",
                &format!("{} handlers", self.cost_limit_exceeded.len()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_handlers_fire_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = seen.clone();
        let second = seen.clone();

        let events = SessionEvents::new()
            .on_question(move |event: QuestionEvent| {
                let seen = first.clone();
                async move {
                    seen.lock().unwrap().push(format!("a:{}", event.question));
                }
            })
            .on_question(move |event: QuestionEvent| {
                let seen = second.clone();
                async move {
                    seen.lock().unwrap().push(format!("b:{}", event.question));
                }
            });

        events
            .emit_question(QuestionEvent {
                session_id: "sess_1".to_string(),
                question: "Which DB?".to_string(),
                context: None,
            })
            .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:Which DB?".to_string(), "b:Which DB?".to_string()]
        );
    }

    #[tokio::test]
    async fn test_emit_with_no_handlers_is_noop() {
        let events = SessionEvents::new();
        events
            .emit_completed(CompletedEvent {
                session_id: "sess_1".to_string(),
                total_cost: 0.0,
                document_count: 0,
            })
            .await;
    }

    #[test]
    fn test_debug_shows_handler_counts() {
        let events = SessionEvents::new().on_started(|_| async {});
        let debug = format!("{events:?}");
        assert!(debug.contains("1 handlers"));
    }
}
