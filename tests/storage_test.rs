//! Contract tests for the in-memory storage adapter.

mod common;

use bmad_runtime::{
    Document, MemoryStorage, SessionOptions, SessionQueryOptions, SessionStatus, StorageBackend,
    StorageMetadata, StorageQueryOptions,
};
use common::{ScriptedProvider, client_with, text_turn};
use std::sync::Arc;

fn doc(path: &str, content: &str) -> Document {
    Document::new(path, content)
}

#[tokio::test]
async fn save_load_exists_delete_cycle() {
    let storage = MemoryStorage::new();
    storage.initialize().await.unwrap();

    let document = doc("/sess_1/docs/prd.md", "# PRD");
    let metadata = StorageMetadata::for_document(&document, "sess_1", "pm", "create-prd");

    let result = storage.save(&document, &metadata).await.unwrap();
    assert_eq!(result.path, "/sess_1/docs/prd.md");
    assert_eq!(result.size, 5);
    assert!(result.url.is_none());

    assert!(storage.exists("/sess_1/docs/prd.md").await.unwrap());
    let loaded = storage.load("/sess_1/docs/prd.md").await.unwrap();
    assert_eq!(loaded.content, "# PRD");

    let stored_metadata = storage.get_metadata("/sess_1/docs/prd.md").await.unwrap();
    assert_eq!(stored_metadata.session_id, "sess_1");
    assert_eq!(stored_metadata.mime_type, "text/markdown");

    assert!(storage.delete("/sess_1/docs/prd.md").await.unwrap());
    assert!(!storage.delete("/sess_1/docs/prd.md").await.unwrap());
    assert!(!storage.exists("/sess_1/docs/prd.md").await.unwrap());
    assert!(storage.load("/sess_1/docs/prd.md").await.is_err());

    storage.close().await.unwrap();
}

#[tokio::test]
async fn get_url_is_none_for_memory() {
    let storage = MemoryStorage::new();
    assert_eq!(storage.get_url("/x.md", Some(60)).await.unwrap(), None);
}

#[tokio::test]
async fn save_batch_persists_everything() {
    let storage = MemoryStorage::new();
    let batch: Vec<(Document, StorageMetadata)> = (1..=3)
        .map(|n| {
            let document = doc(&format!("/sess_1/{n}.md"), "x");
            let metadata = StorageMetadata::for_document(&document, "sess_1", "pm", "create-prd");
            (document, metadata)
        })
        .collect();

    let results = storage.save_batch(&batch).await.unwrap();
    assert_eq!(results.len(), 3);
    for n in 1..=3 {
        assert!(storage.exists(&format!("/sess_1/{n}.md")).await.unwrap());
    }
}

#[tokio::test]
async fn listing_filters_by_session_agent_and_tag() {
    let storage = MemoryStorage::new();

    let a = doc("/sess_1/a.md", "a");
    storage
        .save(
            &a,
            &StorageMetadata::for_document(&a, "sess_1", "pm", "create-prd").with_tag("draft"),
        )
        .await
        .unwrap();
    let b = doc("/sess_1/b.md", "b");
    storage
        .save(
            &b,
            &StorageMetadata::for_document(&b, "sess_1", "pm", "create-prd"),
        )
        .await
        .unwrap();
    let c = doc("/sess_2/c.md", "c");
    storage
        .save(
            &c,
            &StorageMetadata::for_document(&c, "sess_2", "analyst", "research"),
        )
        .await
        .unwrap();

    // Listing by session id returns exactly that session's documents.
    let by_session = storage
        .list(&StorageQueryOptions::new().with_session_id("sess_1"))
        .await
        .unwrap();
    assert_eq!(by_session.total, 2);
    let paths: Vec<&str> = by_session.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/sess_1/a.md", "/sess_1/b.md"]);

    let by_agent = storage
        .list(&StorageQueryOptions::new().with_agent_id("analyst"))
        .await
        .unwrap();
    assert_eq!(by_agent.total, 1);

    let by_tag = storage
        .list(&StorageQueryOptions::new().with_tag("draft"))
        .await
        .unwrap();
    assert_eq!(by_tag.total, 1);
    assert_eq!(by_tag.entries[0].path, "/sess_1/a.md");

    // Pagination: total stays the full match count.
    let paged = storage
        .list(
            &StorageQueryOptions::new()
                .with_session_id("sess_1")
                .with_limit(1)
                .with_offset(1),
        )
        .await
        .unwrap();
    assert_eq!(paged.total, 2);
    assert_eq!(paged.entries.len(), 1);
    assert_eq!(paged.entries[0].path, "/sess_1/b.md");
}

#[tokio::test]
async fn time_range_filters() {
    let storage = MemoryStorage::new();
    let early = doc("/early.md", "e");
    let mut early_meta = StorageMetadata::for_document(&early, "sess_1", "pm", "create-prd");
    early_meta.timestamp = chrono::DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    storage.save(&early, &early_meta).await.unwrap();

    let late = doc("/late.md", "l");
    let mut late_meta = StorageMetadata::for_document(&late, "sess_1", "pm", "create-prd");
    late_meta.timestamp = chrono::DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    storage.save(&late, &late_meta).await.unwrap();

    let cutoff = chrono::DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);

    let after = storage
        .list(&StorageQueryOptions::new().with_after(cutoff))
        .await
        .unwrap();
    assert_eq!(after.total, 1);
    assert_eq!(after.entries[0].path, "/late.md");

    let before = storage
        .list(&StorageQueryOptions::new().with_before(cutoff))
        .await
        .unwrap();
    assert_eq!(before.total, 1);
    assert_eq!(before.entries[0].path, "/early.md");
}

#[tokio::test]
async fn session_state_lifecycle() {
    // Produce a real state through a session run.
    let provider = Arc::new(ScriptedProvider::new(vec![text_turn("ok", 10, 5)]));
    let client = client_with(provider);
    let session = client
        .create_session("pm", "create-prd", SessionOptions::new())
        .unwrap();
    session.execute().await.unwrap();
    let state = session.serialize().await;

    let storage = MemoryStorage::new();
    storage.save_session_state(&state).await.unwrap();

    let loaded = storage.load_session_state(&state.id).await.unwrap();
    assert_eq!(loaded, state);

    let listed = storage
        .list_sessions(&SessionQueryOptions::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.sessions[0].id, state.id);
    assert_eq!(listed.sessions[0].agent_id, "pm");
    assert_eq!(listed.sessions[0].status, SessionStatus::Completed);

    let by_agent = storage
        .list_sessions(&SessionQueryOptions {
            agent_id: Some("analyst".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_agent.total, 0);

    assert!(storage.delete_session(&state.id).await.unwrap());
    assert!(!storage.delete_session(&state.id).await.unwrap());
    assert!(storage.load_session_state(&state.id).await.is_err());
}

#[tokio::test]
async fn persisted_documents_are_namespaced_by_session_id() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        common::tool_turn(
            vec![(
                "call_1",
                "write_file",
                serde_json::json!({"file_path": "/docs/prd.md", "content": "# PRD"}),
            )],
            10,
            5,
        ),
        text_turn("done", 10, 5),
    ]));
    let storage = Arc::new(MemoryStorage::new());
    let client = bmad_runtime::Client::builder()
        .provider(provider)
        .storage(storage.clone())
        .local_agents_dir("/nonexistent/.bmad-core/agents")
        .shared_agents_dir("/nonexistent/shared/.bmad-core/agents")
        .bundled_agent("pm", common::PM_AGENT)
        .build()
        .unwrap();

    let session = client
        .create_session(
            "pm",
            "create-prd",
            SessionOptions::new().with_save_documents(true),
        )
        .unwrap();
    let result = session.execute().await.unwrap();

    let expected_path = format!("/{}/docs/prd.md", session.id());
    assert_eq!(result.storage_urls, vec![expected_path.clone()]);
    assert!(storage.exists(&expected_path).await.unwrap());

    // Listing by session id returns exactly the documents saved under it.
    let listed = storage
        .list(&StorageQueryOptions::new().with_session_id(session.id()))
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.entries[0].path, expected_path);
    assert_eq!(listed.entries[0].metadata.command, "create-prd");
}
