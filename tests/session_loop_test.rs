//! End-to-end tests of the one-shot session engine's tool-call loop.

mod common;

use bmad_runtime::{
    ContentBlock, MAX_LOOP_ITERATIONS, MessageRole, QuestionEvent, SessionEvents, SessionOptions,
    SessionStatus,
};
use common::{ScriptedProvider, client_with, max_tokens_turn, text_turn, tool_turn};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn single_turn_completion() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_turn("ok", 100, 50)]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.final_response.as_deref(), Some("ok"));
    assert!(result.documents.is_empty());
    assert_eq!(result.costs.api_calls, 1);
    assert_eq!(result.costs.input_tokens, 100);
    assert_eq!(result.costs.output_tokens, 50);

    // messages = [system, user, assistant], exactly one system message
    let state = session.serialize().await;
    assert_eq!(state.messages.len(), 3);
    assert_eq!(state.messages[0].role, MessageRole::System);
    assert_eq!(
        state
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .count(),
        1
    );
    assert!(state.messages[1].text().contains("Execute command: create-prd"));
}

#[tokio::test]
async fn write_then_complete_surfaces_document() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![(
                "call_1",
                "write_file",
                json!({"file_path": "/docs/prd.md", "content": "# PRD"}),
            )],
            100,
            50,
        ),
        text_turn("done", 100, 50),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.documents[0].path, "/docs/prd.md");
    assert_eq!(result.documents[0].content, "# PRD");
    assert_eq!(result.costs.api_calls, 2);

    let state = session.serialize().await;
    assert_eq!(state.messages.len(), 5);
}

#[tokio::test]
async fn tool_results_match_tool_use_ids_in_one_user_message() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![
                (
                    "call_a",
                    "write_file",
                    json!({"file_path": "/a.md", "content": "A"}),
                ),
                (
                    "call_b",
                    "write_file",
                    json!({"file_path": "/b.md", "content": "B"}),
                ),
            ],
            10,
            5,
        ),
        text_turn("done", 10, 5),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();
    session.execute().await.unwrap();

    let state = session.serialize().await;
    // [system, user, assistant(2 tool_use), user(2 tool_result), assistant]
    let assistant = &state.messages[2];
    let answers = &state.messages[3];
    assert_eq!(answers.role, MessageRole::User);

    let use_ids: Vec<&str> = assistant.tool_uses().iter().map(|c| c.id.as_str()).collect();
    let result_ids: Vec<&str> = answers
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result.tool_use_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(use_ids, vec!["call_a", "call_b"]);
    assert_eq!(result_ids, use_ids);
}

#[tokio::test]
async fn pause_on_ask_user_and_resume_on_answer() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![("call_1", "ask_user", json!({"question": "Which DB?"}))],
            10,
            5,
        ),
        text_turn("Using Postgres", 10, 5),
    ]));
    let client = client_with(provider.clone());

    let questions: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = questions.clone();
    let events = SessionEvents::new().on_question(move |event: QuestionEvent| {
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(event.question);
        }
    });

    let session = client
        .create_session_with_events("pm", "create-prd", SessionOptions::new(), events)
        .unwrap();

    let runner = session.clone();
    let handle = tokio::spawn(async move { runner.execute().await });

    // Wait for the pause.
    for _ in 0..200 {
        if session.status() == SessionStatus::Paused {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(session.status(), SessionStatus::Paused);
    assert_eq!(
        session.pending_question().unwrap().question,
        "Which DB?"
    );
    assert_eq!(*questions.lock().unwrap(), vec!["Which DB?".to_string()]);

    session.answer("Postgres").await.unwrap();
    let result = handle.await.unwrap().unwrap();

    assert_eq!(result.status, SessionStatus::Completed);
    assert!(result.final_response.unwrap().contains("Postgres"));
    assert!(session.pending_question().is_none());

    // The answer flowed back to the model as the tool result.
    let state = session.serialize().await;
    let answer_block = state.messages[3]
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result.content.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(answer_block, "Postgres");
}

#[tokio::test]
async fn answer_without_pending_question_is_a_state_error() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_turn("ok", 1, 1)]));
    let client = client_with(provider);
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let err = session.answer("nobody asked").await.unwrap_err();
    assert!(err.to_string().contains("no pending question"));
    assert_eq!(session.status(), SessionStatus::Pending);
}

#[tokio::test]
async fn loop_bound_fails_after_fifty_turns() {
    let provider = Arc::new(ScriptedProvider::repeating(tool_turn(
        vec![("call_1", "bash_command", json!({"command": "pwd"}))],
        1,
        1,
    )));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();

    assert_eq!(result.status, SessionStatus::Failed);
    assert!(result
        .error
        .unwrap()
        .contains(&MAX_LOOP_ITERATIONS.to_string()));
    assert_eq!(provider.call_count(), MAX_LOOP_ITERATIONS as usize);
    assert_eq!(result.costs.api_calls, MAX_LOOP_ITERATIONS as u64);
}

#[tokio::test]
async fn unknown_agent_fails_the_session() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_turn("ok", 1, 1)]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("ghost", "haunt", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Failed);
    assert!(result.error.unwrap().contains("Agent not found"));
    // Resolution failed before any provider call.
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn execute_twice_is_a_state_error() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_turn("ok", 1, 1)]));
    let client = client_with(provider);
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    session.execute().await.unwrap();
    let err = session.execute().await.unwrap_err();
    assert!(err.to_string().contains("pending"));
    // The completed result is untouched by the misuse.
    assert_eq!(session.status(), SessionStatus::Completed);
}

#[tokio::test]
async fn continue_with_reenters_the_loop() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_turn("first", 10, 5),
        text_turn("second", 10, 5),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    session.execute().await.unwrap();
    let result = session.continue_with("refine the draft").await.unwrap();

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.final_response.as_deref(), Some("second"));
    assert_eq!(result.costs.api_calls, 2);

    let state = session.serialize().await;
    assert_eq!(state.messages.len(), 5);
    assert!(state.messages[3].text().contains("refine the draft"));
}

#[tokio::test]
async fn continue_with_requires_completed_status() {
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let client = client_with(provider);
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let err = session.continue_with("too early").await.unwrap_err();
    assert!(err.to_string().contains("completed"));
    assert_eq!(session.status(), SessionStatus::Pending);
}

#[tokio::test]
async fn max_tokens_stop_completes_with_truncated_response() {
    let provider = Arc::new(ScriptedProvider::new(vec![max_tokens_turn(
        "partial answer", 10, 5,
    )]));
    let client = client_with(provider);
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.final_response.as_deref(), Some("partial answer"));
}

#[tokio::test]
async fn provider_error_is_fatal_to_the_session() {
    // Empty script: the first provider call fails.
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let client = client_with(provider);
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Failed);
    assert!(result.error.unwrap().contains("Provider error"));
}

#[tokio::test]
async fn tool_failures_do_not_terminate_the_loop() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![("call_1", "read_file", json!({"file_path": "/missing.md"}))],
            10,
            5,
        ),
        text_turn("recovered", 10, 5),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.final_response.as_deref(), Some("recovered"));

    let state = session.serialize().await;
    let error_result = state.messages[3]
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(error_result.is_error, Some(true));
    assert!(error_result.content.contains("not found") || error_result.content.contains("File"));
}

#[tokio::test]
async fn agent_discovery_populates_vfs_for_globbing() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![(
                "call_1",
                "glob_pattern",
                json!({"pattern": "/.bmad-core/agents/*.md"}),
            )],
            10,
            5,
        ),
        text_turn("found peers", 10, 5),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Completed);

    let state = session.serialize().await;
    let listing = state.messages[3]
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result.content.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        listing,
        "/.bmad-core/agents/analyst.md\n/.bmad-core/agents/pm.md"
    );
    // Discovery entries never surface as documents.
    assert!(result.documents.is_empty());
}
