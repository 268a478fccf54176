//! Pluggable persistence for documents and serialized session state.
//!
//! The engine talks to storage only through the [`StorageBackend`] trait.
//! Two adapters ship with the runtime:
//!
//! - [`MemoryStorage`]: a single locked map, safe for concurrent calls
//!   from different sessions. The default for tests and embedded use.
//! - [`ObjectStorage`]: an HTTP object-store gateway adapter: documents
//!   and session states travel as JSON envelopes, listing and filtering are
//!   server-side, and [`StorageBackend::get_url`] asks the gateway to sign
//!   a download URL.
//!
//! Storage failures during engine autosave are logged and never fail the
//! session; `save`/`load` calls made directly by the host surface their
//! errors normally.

use crate::error::{Error, Result};
use crate::types::{Document, SessionState, SessionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// MIME type inferred from a path extension.
///
/// Unknown extensions fall back to `application/octet-stream`.
pub fn mime_type_for_path(path: &str) -> &'static str {
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("yaml") | Some("yml") => "text/yaml",
        Some("txt") => "text/plain",
        Some("html") => "text/html",
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Metadata stored alongside every document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageMetadata {
    /// Session that produced the document.
    pub session_id: String,

    /// Agent the session ran.
    pub agent_id: String,

    /// Command the session executed.
    pub command: String,

    /// When the document was saved.
    pub timestamp: DateTime<Utc>,

    /// Content size in bytes.
    pub size: u64,

    /// MIME type inferred from the path extension.
    pub mime_type: String,

    /// Free-form tags for filtering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl StorageMetadata {
    /// Builds metadata for a document produced by a session, inferring size
    /// and MIME type and stamping the current time.
    pub fn for_document(
        document: &Document,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            command: command.into(),
            timestamp: Utc::now(),
            size: document.content.len() as u64,
            mime_type: mime_type_for_path(&document.path).to_string(),
            tags: Vec::new(),
        }
    }

    /// Adds a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageResult {
    /// The storage path the document landed at.
    pub path: String,

    /// A download URL, when the backend can produce one.
    pub url: Option<String>,

    /// Stored size in bytes.
    pub size: u64,
}

/// Filters for [`StorageBackend::list`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageQueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Only documents saved at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,

    /// Only documents saved before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,

    /// Only documents carrying this tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default)]
    pub offset: usize,
}

impl StorageQueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn matches(&self, metadata: &StorageMetadata) -> bool {
        if let Some(session_id) = &self.session_id {
            if &metadata.session_id != session_id {
                return false;
            }
        }
        if let Some(agent_id) = &self.agent_id {
            if &metadata.agent_id != agent_id {
                return false;
            }
        }
        if let Some(after) = &self.after {
            if metadata.timestamp < *after {
                return false;
            }
        }
        if let Some(before) = &self.before {
            if metadata.timestamp >= *before {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !metadata.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        true
    }
}

/// One listing entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
    pub path: String,
    pub metadata: StorageMetadata,
}

/// Result of [`StorageBackend::list`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageListResult {
    /// Matching entries after offset/limit, sorted by path.
    pub entries: Vec<StorageEntry>,

    /// Total matches before pagination.
    pub total: usize,
}

/// Filters for [`StorageBackend::list_sessions`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionQueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default)]
    pub offset: usize,
}

/// Condensed view of a stored session state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub agent_id: String,
    pub command: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            id: state.id.clone(),
            agent_id: state.agent_id.clone(),
            command: state.command.clone(),
            status: state.status,
            created_at: state.created_at,
        }
    }
}

/// Result of [`StorageBackend::list_sessions`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResult {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

/// Contract for persisting documents and serialized session state.
///
/// Backends must be safe for concurrent calls from different sessions.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Lifecycle hook called once before first use.
    async fn initialize(&self) -> Result<()>;

    /// Lifecycle hook called at shutdown.
    async fn close(&self) -> Result<()>;

    /// Persists one document with its metadata.
    async fn save(&self, document: &Document, metadata: &StorageMetadata)
    -> Result<StorageResult>;

    /// Persists a batch of documents.
    async fn save_batch(
        &self,
        documents: &[(Document, StorageMetadata)],
    ) -> Result<Vec<StorageResult>>;

    /// Loads a document by storage path.
    async fn load(&self, path: &str) -> Result<Document>;

    /// True when a document exists at the path.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Deletes a document; returns whether it existed.
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Lists documents matching the filters.
    async fn list(&self, options: &StorageQueryOptions) -> Result<StorageListResult>;

    /// Metadata of a stored document.
    async fn get_metadata(&self, path: &str) -> Result<StorageMetadata>;

    /// A time-limited download URL, when the backend supports one.
    async fn get_url(&self, path: &str, expires_seconds: Option<u64>) -> Result<Option<String>>;

    /// Persists a serialized session state, keyed by session id.
    async fn save_session_state(&self, state: &SessionState) -> Result<()>;

    /// Loads a serialized session state by id.
    async fn load_session_state(&self, id: &str) -> Result<SessionState>;

    /// Lists stored sessions matching the filters.
    async fn list_sessions(&self, options: &SessionQueryOptions) -> Result<SessionListResult>;

    /// Deletes a stored session state; returns whether it existed.
    async fn delete_session(&self, id: &str) -> Result<bool>;
}

// ============================================================================
// IN-MEMORY ADAPTER
// ============================================================================

/// In-memory [`StorageBackend`]: a single locked map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: RwLock<BTreeMap<String, (Document, StorageMetadata)>>,
    sessions: RwLock<BTreeMap<String, SessionState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn save(
        &self,
        document: &Document,
        metadata: &StorageMetadata,
    ) -> Result<StorageResult> {
        let mut documents = self.documents.write().await;
        documents.insert(
            document.path.clone(),
            (document.clone(), metadata.clone()),
        );
        Ok(StorageResult {
            path: document.path.clone(),
            url: None,
            size: document.content.len() as u64,
        })
    }

    async fn save_batch(
        &self,
        documents: &[(Document, StorageMetadata)],
    ) -> Result<Vec<StorageResult>> {
        let mut results = Vec::with_capacity(documents.len());
        for (document, metadata) in documents {
            results.push(self.save(document, metadata).await?);
        }
        Ok(results)
    }

    async fn load(&self, path: &str) -> Result<Document> {
        let documents = self.documents.read().await;
        documents
            .get(path)
            .map(|(document, _)| document.clone())
            .ok_or_else(|| Error::storage(format!("no document at {path}")))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.documents.read().await.contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        Ok(self.documents.write().await.remove(path).is_some())
    }

    async fn list(&self, options: &StorageQueryOptions) -> Result<StorageListResult> {
        let documents = self.documents.read().await;
        let matching: Vec<StorageEntry> = documents
            .iter()
            .filter(|(_, (_, metadata))| options.matches(metadata))
            .map(|(path, (_, metadata))| StorageEntry {
                path: path.clone(),
                metadata: metadata.clone(),
            })
            .collect();
        let total = matching.len();
        let entries = matching
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(StorageListResult { entries, total })
    }

    async fn get_metadata(&self, path: &str) -> Result<StorageMetadata> {
        let documents = self.documents.read().await;
        documents
            .get(path)
            .map(|(_, metadata)| metadata.clone())
            .ok_or_else(|| Error::storage(format!("no document at {path}")))
    }

    async fn get_url(&self, _path: &str, _expires_seconds: Option<u64>) -> Result<Option<String>> {
        Ok(None)
    }

    async fn save_session_state(&self, state: &SessionState) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(state.id.clone(), state.clone());
        Ok(())
    }

    async fn load_session_state(&self, id: &str) -> Result<SessionState> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::storage(format!("no session state for {id}")))
    }

    async fn list_sessions(&self, options: &SessionQueryOptions) -> Result<SessionListResult> {
        let sessions = self.sessions.read().await;
        let matching: Vec<SessionSummary> = sessions
            .values()
            .filter(|state| {
                options
                    .agent_id
                    .as_ref()
                    .is_none_or(|agent_id| &state.agent_id == agent_id)
                    && options.status.is_none_or(|status| state.status == status)
            })
            .map(SessionSummary::from)
            .collect();
        let total = matching.len();
        let sessions = matching
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(SessionListResult { sessions, total })
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}

// ============================================================================
// OBJECT-STORE ADAPTER
// ============================================================================

/// Connection settings for the object-store gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStorageConfig {
    /// Gateway base URL, e.g. `https://docs.internal/v1`.
    pub base_url: String,

    /// Bearer token for the gateway.
    pub api_key: String,

    /// Prefix applied to every storage path (may be empty).
    pub prefix: String,

    /// HTTP timeout per call, in seconds.
    pub timeout_secs: u64,
}

impl ObjectStorageConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            prefix: String::new(),
            timeout_secs: 30,
        }
    }

    /// Sets the base path prefix (e.g. `/team-docs`).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// JSON envelope a document travels in.
#[derive(Debug, Serialize, Deserialize)]
struct StoredObject {
    content: String,
    metadata: StorageMetadata,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    url: String,
}

/// [`StorageBackend`] over an HTTP object-store gateway.
pub struct ObjectStorage {
    config: ObjectStorageConfig,
    http: reqwest::Client,
}

impl ObjectStorage {
    /// Builds the adapter; fails on an invalid base URL.
    pub fn new(config: ObjectStorageConfig) -> Result<Self> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(Error::config(
                "object storage base_url must start with http:// or https://",
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::Http)?;
        Ok(Self { config, http })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/objects{}{}",
            self.config.base_url, self.config.prefix, path
        )
    }

    fn session_url(&self, id: &str) -> String {
        format!("{}/sessions/{id}", self.config.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    async fn check(&self, response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::storage(format!("{action} failed ({status}): {body}")))
    }
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    async fn initialize(&self) -> Result<()> {
        let url = format!("{}/healthz", self.config.base_url);
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .await
            .map_err(|e| Error::storage(format!("gateway unreachable: {e}")))?;
        self.check(response, "initialize").await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn save(
        &self,
        document: &Document,
        metadata: &StorageMetadata,
    ) -> Result<StorageResult> {
        let envelope = StoredObject {
            content: document.content.clone(),
            metadata: metadata.clone(),
        };
        let response = self
            .authorized(self.http.put(self.object_url(&document.path)))
            .json(&envelope)
            .send()
            .await
            .map_err(|e| Error::storage(format!("save {}: {e}", document.path)))?;
        self.check(response, "save").await?;
        Ok(StorageResult {
            path: document.path.clone(),
            url: self.get_url(&document.path, None).await.ok().flatten(),
            size: document.content.len() as u64,
        })
    }

    async fn save_batch(
        &self,
        documents: &[(Document, StorageMetadata)],
    ) -> Result<Vec<StorageResult>> {
        futures::future::try_join_all(
            documents
                .iter()
                .map(|(document, metadata)| self.save(document, metadata)),
        )
        .await
    }

    async fn load(&self, path: &str) -> Result<Document> {
        let response = self
            .authorized(self.http.get(self.object_url(path)))
            .send()
            .await
            .map_err(|e| Error::storage(format!("load {path}: {e}")))?;
        let envelope: StoredObject = self
            .check(response, "load")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("load {path}: undecodable body: {e}")))?;
        Ok(Document::new(path, envelope.content))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let response = self
            .authorized(self.http.head(self.object_url(path)))
            .send()
            .await
            .map_err(|e| Error::storage(format!("exists {path}: {e}")))?;
        Ok(response.status().is_success())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let response = self
            .authorized(self.http.delete(self.object_url(path)))
            .send()
            .await
            .map_err(|e| Error::storage(format!("delete {path}: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.check(response, "delete").await.map(|_| true)
    }

    async fn list(&self, options: &StorageQueryOptions) -> Result<StorageListResult> {
        let url = format!("{}/objects", self.config.base_url);
        let mut request = self.authorized(self.http.get(&url));
        if !self.config.prefix.is_empty() {
            request = request.query(&[("prefix", self.config.prefix.as_str())]);
        }
        if let Some(session_id) = &options.session_id {
            request = request.query(&[("sessionId", session_id.as_str())]);
        }
        if let Some(agent_id) = &options.agent_id {
            request = request.query(&[("agentId", agent_id.as_str())]);
        }
        if let Some(after) = &options.after {
            request = request.query(&[("after", after.to_rfc3339())]);
        }
        if let Some(before) = &options.before {
            request = request.query(&[("before", before.to_rfc3339())]);
        }
        if let Some(tag) = &options.tag {
            request = request.query(&[("tag", tag.as_str())]);
        }
        if let Some(limit) = options.limit {
            request = request.query(&[("limit", limit.to_string())]);
        }
        if options.offset > 0 {
            request = request.query(&[("offset", options.offset.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::storage(format!("list: {e}")))?;
        self.check(response, "list")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("list: undecodable body: {e}")))
    }

    async fn get_metadata(&self, path: &str) -> Result<StorageMetadata> {
        let response = self
            .authorized(self.http.get(self.object_url(path)))
            .send()
            .await
            .map_err(|e| Error::storage(format!("metadata {path}: {e}")))?;
        let envelope: StoredObject = self
            .check(response, "get_metadata")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("metadata {path}: undecodable body: {e}")))?;
        Ok(envelope.metadata)
    }

    async fn get_url(&self, path: &str, expires_seconds: Option<u64>) -> Result<Option<String>> {
        let url = format!("{}/sign", self.config.base_url);
        let body = serde_json::json!({
            "path": format!("{}{}", self.config.prefix, path),
            "expiresSeconds": expires_seconds.unwrap_or(3600),
        });
        let response = self
            .authorized(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::storage(format!("sign {path}: {e}")))?;
        let signed: SignResponse = self
            .check(response, "sign")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("sign {path}: undecodable body: {e}")))?;
        Ok(Some(signed.url))
    }

    async fn save_session_state(&self, state: &SessionState) -> Result<()> {
        let response = self
            .authorized(self.http.put(self.session_url(&state.id)))
            .json(state)
            .send()
            .await
            .map_err(|e| Error::storage(format!("save session {}: {e}", state.id)))?;
        self.check(response, "save_session_state").await.map(|_| ())
    }

    async fn load_session_state(&self, id: &str) -> Result<SessionState> {
        let response = self
            .authorized(self.http.get(self.session_url(id)))
            .send()
            .await
            .map_err(|e| Error::storage(format!("load session {id}: {e}")))?;
        self.check(response, "load_session_state")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("load session {id}: undecodable body: {e}")))
    }

    async fn list_sessions(&self, options: &SessionQueryOptions) -> Result<SessionListResult> {
        let url = format!("{}/sessions", self.config.base_url);
        let mut request = self.authorized(self.http.get(&url));
        if let Some(agent_id) = &options.agent_id {
            request = request.query(&[("agentId", agent_id.as_str())]);
        }
        if let Some(status) = options.status {
            let status = serde_json::to_string(&status)
                .map_err(Error::Json)?
                .trim_matches('"')
                .to_string();
            request = request.query(&[("status", status)]);
        }
        if let Some(limit) = options.limit {
            request = request.query(&[("limit", limit.to_string())]);
        }
        if options.offset > 0 {
            request = request.query(&[("offset", options.offset.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::storage(format!("list sessions: {e}")))?;
        self.check(response, "list_sessions")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("list sessions: undecodable body: {e}")))
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        let response = self
            .authorized(self.http.delete(self.session_url(id)))
            .send()
            .await
            .map_err(|e| Error::storage(format!("delete session {id}: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.check(response, "delete_session").await.map(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_inference_table() {
        assert_eq!(mime_type_for_path("/docs/prd.md"), "text/markdown");
        assert_eq!(mime_type_for_path("/data/config.json"), "application/json");
        assert_eq!(mime_type_for_path("/data/config.yaml"), "text/yaml");
        assert_eq!(mime_type_for_path("/data/config.yml"), "text/yaml");
        assert_eq!(mime_type_for_path("/notes.txt"), "text/plain");
        assert_eq!(mime_type_for_path("/page.html"), "text/html");
        assert_eq!(mime_type_for_path("/out/report.pdf"), "application/pdf");
        assert_eq!(mime_type_for_path("/img/logo.png"), "image/png");
        assert_eq!(mime_type_for_path("/img/photo.jpg"), "image/jpeg");
        assert_eq!(mime_type_for_path("/img/photo.JPEG"), "image/jpeg");
        assert_eq!(mime_type_for_path("/bin/blob"), "application/octet-stream");
        assert_eq!(mime_type_for_path("/bin/archive.tar"), "application/octet-stream");
    }

    #[test]
    fn test_metadata_for_document() {
        let document = Document::new("/docs/prd.md", "# PRD");
        let metadata = StorageMetadata::for_document(&document, "sess_1", "pm", "create-prd")
            .with_tag("draft");
        assert_eq!(metadata.size, 5);
        assert_eq!(metadata.mime_type, "text/markdown");
        assert_eq!(metadata.tags, vec!["draft"]);
    }

    #[test]
    fn test_object_storage_url_building() {
        let storage = ObjectStorage::new(
            ObjectStorageConfig::new("https://docs.internal/v1", "token").with_prefix("/team-a"),
        )
        .unwrap();
        assert_eq!(
            storage.object_url("/sess_1/docs/prd.md"),
            "https://docs.internal/v1/objects/team-a/sess_1/docs/prd.md"
        );
        assert_eq!(
            storage.session_url("sess_1"),
            "https://docs.internal/v1/sessions/sess_1"
        );
    }

    #[test]
    fn test_object_storage_rejects_bad_base_url() {
        assert!(ObjectStorage::new(ObjectStorageConfig::new("docs.internal", "token")).is_err());
    }

    #[tokio::test]
    async fn test_memory_storage_query_filters() {
        let storage = MemoryStorage::new();
        let doc_a = Document::new("/sess_1/a.md", "a");
        let doc_b = Document::new("/sess_2/b.md", "b");
        storage
            .save(
                &doc_a,
                &StorageMetadata::for_document(&doc_a, "sess_1", "pm", "create-prd"),
            )
            .await
            .unwrap();
        storage
            .save(
                &doc_b,
                &StorageMetadata::for_document(&doc_b, "sess_2", "analyst", "research"),
            )
            .await
            .unwrap();

        let result = storage
            .list(&StorageQueryOptions::new().with_session_id("sess_1"))
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.entries[0].path, "/sess_1/a.md");

        let result = storage
            .list(&StorageQueryOptions::new().with_agent_id("analyst"))
            .await
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.entries[0].path, "/sess_2/b.md");
    }
}
