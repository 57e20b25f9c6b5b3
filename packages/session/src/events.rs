//! # Push Events
//!
//! Server-pushed `(eventType, data)` pairs, parsed into [`PushEvent`] and
//! forwarded by one dispatcher task per document.
//!
//! ## Lifecycle
//!
//! - [`EventDispatcher::attach`] tears down the current subscription before
//!   opening a new one, so a document never has two live channels
//! - [`EventDispatcher::detach`] (or dropping the dispatcher) stops the task,
//!   which closes the receiver handed out by `attach`
//! - Consecutive duplicates are dropped; gaps are tolerated
//! - Silence is not an error; [`EventDispatcher::await_liveness`] is a
//!   bounded wait that yields `false` on timeout

use std::sync::Arc;
use std::time::Duration;

use plaid_common::{ClientResult, Id};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use crate::remote::{EventSource, RawEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Heartbeat,
    Message(String),
    AuditLog(String),
    ParseStarted { document_id: Id },
    ParseSucceeded { document_id: Id },
    ParseFailed { document_id: Id, message: String },
    Other { event_type: String, data: String },
}

impl PushEvent {
    /// Parse a raw event. Status messages arrive as colon-delimited
    /// strings in the data of a `message` event.
    pub fn parse(event_type: &str, data: &str) -> Self {
        match event_type {
            "heartbeat" => PushEvent::Heartbeat,
            "audit-log" => PushEvent::AuditLog(data.to_string()),
            "message" => parse_status(data).unwrap_or_else(|| PushEvent::Message(data.to_string())),
            _ => PushEvent::Other {
                event_type: event_type.to_string(),
                data: data.to_string(),
            },
        }
    }

    /// Document a status event is about
    pub fn document_id(&self) -> Option<&str> {
        match self {
            PushEvent::ParseStarted { document_id }
            | PushEvent::ParseSucceeded { document_id }
            | PushEvent::ParseFailed { document_id, .. } => Some(document_id),
            _ => None,
        }
    }
}

fn parse_status(data: &str) -> Option<PushEvent> {
    let mut parts = data.splitn(3, ':');
    let kind = parts.next()?;
    let document_id = parts.next().filter(|id| !id.is_empty())?.to_string();

    match kind {
        "parse-started" => Some(PushEvent::ParseStarted { document_id }),
        "parse-success" => Some(PushEvent::ParseSucceeded { document_id }),
        "parse-error" => Some(PushEvent::ParseFailed {
            document_id,
            message: parts.next().unwrap_or_default().to_string(),
        }),
        _ => None,
    }
}

struct Subscription {
    document_id: Id,
    task: JoinHandle<()>,
}

/// Owns the single event subscription of one document session
pub struct EventDispatcher {
    source: Arc<dyn EventSource>,
    buffer: usize,
    subscription: Option<Subscription>,
    seen: watch::Sender<u64>,
}

impl EventDispatcher {
    pub fn new(source: Arc<dyn EventSource>, buffer: usize) -> Self {
        let (seen, _) = watch::channel(0);
        Self {
            source,
            buffer: buffer.max(1),
            subscription: None,
            seen,
        }
    }

    /// Subscribe to a document's events, replacing any current subscription
    pub async fn attach(&mut self, project_id: &str, document_id: &str) -> ClientResult<mpsc::Receiver<PushEvent>> {
        self.detach();

        let mut stream = self.source.subscribe(project_id, document_id).await?;
        let (tx, rx) = mpsc::channel(self.buffer);
        let seen = self.seen.clone();
        let doc = document_id.to_string();

        let task = tokio::spawn(async move {
            let mut last: Option<RawEvent> = None;
            while let Some(raw) = stream.next().await {
                seen.send_modify(|count| *count += 1);

                if last.as_ref() == Some(&raw) {
                    tracing::debug!("dropping duplicate {} event for {}", raw.event_type, doc);
                    continue;
                }
                let event = PushEvent::parse(&raw.event_type, &raw.data);
                last = Some(raw);

                if tx.send(event).await.is_err() {
                    break;
                }
            }
            tracing::debug!("event stream for {} ended", doc);
        });

        tracing::info!("subscribed to events of {}", document_id);
        self.subscription = Some(Subscription {
            document_id: document_id.to_string(),
            task,
        });
        Ok(rx)
    }

    /// Release the current subscription, if any
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.task.abort();
            tracing::info!("unsubscribed from events of {}", subscription.document_id);
        }
    }

    pub fn attached_to(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.document_id.as_str())
    }

    /// Wait until any event arrives after this call. `false` on timeout.
    pub async fn await_liveness(&self, timeout: Duration) -> bool {
        let mut seen = self.seen.subscribe();
        seen.borrow_and_update();
        matches!(tokio::time::timeout(timeout, seen.changed()).await, Ok(Ok(())))
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.detach();
    }
}
