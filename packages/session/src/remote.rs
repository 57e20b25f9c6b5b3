//! The annotation service as seen by a session.
//!
//! Implementations wrap whatever transport reaches the service; sessions
//! only see these traits, so tests run against an in-memory server.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plaid_common::ClientResult;
use plaid_editor::{RemoteOp, RemoteReply};
use plaid_model::{AuditEntry, DocumentPayload, Project};
use tokio_stream::Stream;

#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Perform one write. `version` is the document version token the
    /// session last saw; a stale token is answered with a conflict.
    async fn execute(&self, op: &RemoteOp, version: Option<&str>) -> ClientResult<RemoteReply>;

    /// Fetch a whole document, optionally as it was at `as_of`
    async fn fetch_document(
        &self,
        document_id: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> ClientResult<DocumentPayload>;

    async fn fetch_project(&self, project_id: &str) -> ClientResult<Project>;

    /// Append-only change log of one resource, oldest first
    async fn audit(&self, resource_id: &str) -> ClientResult<Vec<AuditEntry>>;

    /// Run `ops` in order. Not atomic: ops before a failing one stay applied.
    async fn bulk(&self, ops: &[RemoteOp], version: Option<&str>) -> ClientResult<Vec<RemoteReply>>;
}

/// One server-pushed event as delivered: `(eventType, data)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub event_type: String,
    pub data: String,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = RawEvent> + Send + 'static>>;

/// Push-event channel of the service. Best effort: events may be lost or
/// delivered twice.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self, project_id: &str, document_id: &str) -> ClientResult<EventStream>;
}
