//! Cost accounting and enforcement across sessions and sub-agents.

mod common;

use bmad_runtime::{
    ContentBlock, CostWarningEvent, SessionEvents, SessionOptions, SessionStatus,
};
use common::{ScriptedProvider, client_with, text_turn, tool_turn};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn relative_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * b.abs().max(1.0)
}

#[tokio::test]
async fn total_cost_equals_breakdown_plus_children() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![(
                "call_1",
                "invoke_agent",
                json!({"agent_id": "analyst", "command": "research"}),
            )],
            1000,
            500,
        ),
        // Child turn.
        text_turn("child done", 2000, 1000),
        // Parent resumes after the delegation.
        text_turn("parent done", 1000, 500),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Completed);

    let costs = &result.costs;
    let breakdown_sum: f64 = costs
        .breakdown
        .iter()
        .map(|line| line.input_cost + line.output_cost)
        .sum();
    let children_sum: f64 = costs.child_sessions.iter().map(|c| c.total_cost).sum();
    assert!(relative_eq(costs.total_cost, breakdown_sum + children_sum));

    assert_eq!(costs.child_sessions.len(), 1);
    assert_eq!(costs.child_sessions[0].agent, "analyst");
    // Aggregates credit the child's tokens and calls.
    assert_eq!(costs.input_tokens, 4000);
    assert_eq!(costs.output_tokens, 2000);
    assert_eq!(costs.api_calls, 3);
}

/// Parent limit $1.00; parent turn costs $0.105, the delegated child burns
/// $2.10. Crediting the child breaches the parent budget and fails the
/// parent session, with the offending child record retained.
#[tokio::test]
async fn child_cost_breaches_parent_limit() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![(
                "call_1",
                "invoke_agent",
                json!({"agent_id": "analyst", "command": "research"}),
            )],
            10_000,
            5_000,
        ),
        // Child single turn: 200k in, 100k out = $0.600 + $1.500.
        text_turn("child burned the budget", 200_000, 100_000),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session(
            "pm",
            "create-prd",
            SessionOptions::new().with_cost_limit(1.0),
        )
        .unwrap();

    let result = session.execute().await.unwrap();

    assert_eq!(result.status, SessionStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.contains("Cost limit exceeded"), "got: {error}");

    let costs = &result.costs;
    assert!(relative_eq(costs.total_cost, 2.205));
    assert_eq!(costs.child_sessions.len(), 1);
    assert!(relative_eq(costs.child_sessions[0].total_cost, 2.1));
}

#[tokio::test]
async fn child_inherits_remaining_budget() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![(
                "call_1",
                "invoke_agent",
                json!({"agent_id": "analyst", "command": "research"}),
            )],
            10_000, // $0.03
            0,
        ),
        // Child turn exceeding the inherited (not the full) budget.
        text_turn("expensive child", 100_000, 0), // $0.30
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session(
            "pm",
            "create-prd",
            SessionOptions::new().with_cost_limit(0.2),
        )
        .unwrap();

    let result = session.execute().await.unwrap();

    // The child's own enforcement trips on the inherited remainder
    // ($0.17), it fails, and crediting its real spend then fails the
    // parent too.
    assert_eq!(result.status, SessionStatus::Failed);
    assert!(result.error.unwrap().contains("Cost limit exceeded"));
    assert_eq!(result.costs.child_sessions.len(), 1);
    assert!(relative_eq(result.costs.child_sessions[0].total_cost, 0.30));
}

#[tokio::test]
async fn sub_agent_documents_merge_into_parent() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        // Parent delegates.
        tool_turn(
            vec![(
                "call_1",
                "invoke_agent",
                json!({"agent_id": "analyst", "command": "research"}),
            )],
            100,
            50,
        ),
        // Child writes a document, then finishes.
        tool_turn(
            vec![(
                "call_c1",
                "write_file",
                json!({"file_path": "/research/notes.md", "content": "# Notes"}),
            )],
            100,
            50,
        ),
        text_turn("research complete", 100, 50),
        // Parent finishes.
        text_turn("all done", 100, 50),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.documents[0].path, "/research/notes.md");

    // The tool result carried a structured summary.
    let state = session.serialize().await;
    let summary = state.messages[3]
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result.content.clone()),
            _ => None,
        })
        .unwrap();
    let summary: serde_json::Value = serde_json::from_str(&summary).unwrap();
    assert_eq!(summary["status"], "completed");
    assert_eq!(summary["agent"], "analyst");
    assert_eq!(summary["documents"][0]["path"], "/research/notes.md");
}

#[tokio::test]
async fn unknown_sub_agent_is_a_tool_failure_not_a_session_failure() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn(
            vec![(
                "call_1",
                "invoke_agent",
                json!({"agent_id": "ghost", "command": "haunt"}),
            )],
            10,
            5,
        ),
        text_turn("recovered without the ghost", 10, 5),
    ]));
    let client = client_with(provider.clone());
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Completed);
    assert!(result.costs.child_sessions.is_empty());

    let state = session.serialize().await;
    let tool_result = state.messages[3]
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(tool_result.is_error, Some(true));
    assert!(tool_result.content.contains("Agent not found"));
}

#[tokio::test]
async fn warning_thresholds_emit_events_once() {
    // One turn of 550 input tokens = $0.00165 against a $0.002 limit
    // (82.5% of it): crosses 0.5 and 0.75, not 0.9.
    let provider = Arc::new(ScriptedProvider::new(vec![text_turn("cheap", 550, 0)]));
    let client = client_with(provider);

    let warnings: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = warnings.clone();
    let events = SessionEvents::new().on_cost_warning(move |event: CostWarningEvent| {
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push(event.threshold);
        }
    });

    let session = client
        .create_session_with_events(
            "pm",
            "create-prd",
            SessionOptions::new().with_cost_limit(0.002),
            events,
        )
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(*warnings.lock().unwrap(), vec![0.5, 0.75]);
}

#[tokio::test]
async fn limit_breach_by_own_usage_fails_the_session() {
    let provider = Arc::new(ScriptedProvider::new(vec![text_turn(
        "expensive", 1_000_000, 0,
    )]));
    let client = client_with(provider);
    let session = client
        .create_session(
            "pm",
            "create-prd",
            SessionOptions::new().with_cost_limit(1.0),
        )
        .unwrap();

    let result = session.execute().await.unwrap();
    assert_eq!(result.status, SessionStatus::Failed);
    assert!(result.error.unwrap().contains("Cost limit exceeded"));
    // $3.00 of input spend was still recorded.
    assert!(relative_eq(result.costs.total_cost, 3.0));
}
