//! In-memory annotation service for session tests.
//!
//! Keeps the authoritative document in an `EntityModel`, bumps a version
//! token on every write and rejects writes carrying a stale token.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plaid_common::{ClientError, ClientResult};
use plaid_editor::{RemoteOp, RemoteReply};
use plaid_model::{
    AuditEntry, DocumentPayload, EntityModel, LayerRef, ModelPatch, Project, Relation, Span, Token,
};
use plaid_session::{EventSource, EventStream, RawEvent, RemoteClient};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// "The cat sat." with one sentence, lemmas and a small dependency tree
pub fn the_cat_sat() -> DocumentPayload {
    serde_json::from_value(json!({
        "id": "doc-1",
        "name": "Cats",
        "project": "proj-1",
        "version": "v1",
        "textLayers": [{
            "id": "text-layer",
            "text": { "id": "text-1", "body": "The cat sat." },
            "tokenLayers": [{
                "id": "tokens",
                "tokens": [
                    { "id": "t1", "begin": 0, "end": 3 },
                    { "id": "t2", "begin": 4, "end": 7 },
                    { "id": "t3", "begin": 8, "end": 12 }
                ],
                "spanLayers": [
                    {
                        "id": "sentences",
                        "name": "Sentence",
                        "spans": [{ "id": "sent-1", "tokens": ["t1", "t2", "t3"] }]
                    },
                    {
                        "id": "lemmas",
                        "name": "Lemma",
                        "spans": [
                            { "id": "l1", "tokens": ["t1"], "value": "the" },
                            { "id": "l2", "tokens": ["t2"], "value": "cat" },
                            { "id": "l3", "tokens": ["t3"], "value": "sit" }
                        ],
                        "relationLayers": [{
                            "id": "deps",
                            "relations": [
                                { "id": "r1", "source": "l2", "target": "l1", "value": "det" },
                                { "id": "r2", "source": "l3", "target": "l2", "value": "nsubj" }
                            ]
                        }]
                    },
                    { "id": "upos", "name": "UPOS" }
                ]
            }]
        }]
    }))
    .expect("fixture is valid")
}

pub fn cats_project() -> Project {
    serde_json::from_value(json!({
        "id": "proj-1",
        "name": "Animals",
        "documents": [
            { "id": "doc-1", "name": "Cats" },
            { "id": "doc-2", "name": "Dogs" }
        ],
        "writers": ["alice"]
    }))
    .expect("fixture is valid")
}

struct ServerState {
    model: EntityModel,
    project: Project,
    version: u64,
    next_id: u64,
    /// Scripted answers for upcoming writes; `None` lets one through
    fail_next: VecDeque<Option<ClientError>>,
    fetches: usize,
    executed: Vec<RemoteOp>,
    audit: Vec<AuditEntry>,
    revoked: bool,
    fetch_delay: Option<Duration>,
}

pub struct FakeServer {
    state: Mutex<ServerState>,
}

impl FakeServer {
    pub fn new(payload: DocumentPayload) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState {
                model: EntityModel::from_payload(payload),
                project: cats_project(),
                version: 1,
                next_id: 0,
                fail_next: VecDeque::new(),
                fetches: 0,
                executed: Vec::new(),
                audit: Vec::new(),
                revoked: false,
                fetch_delay: None,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().expect("server state poisoned")
    }

    /// Answer the next write with `error` instead of applying it
    pub fn fail_next(&self, error: ClientError) {
        self.lock().fail_next.push_back(Some(error));
    }

    /// Let `passing` writes through, then answer the one after with `error`
    pub fn fail_after(&self, passing: usize, error: ClientError) {
        let mut state = self.lock();
        state.fail_next.extend(std::iter::repeat_with(|| None).take(passing));
        state.fail_next.push_back(Some(error));
    }

    pub fn revoke(&self) {
        self.lock().revoked = true;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.lock().fetch_delay = Some(delay);
    }

    pub fn set_audit(&self, entries: Vec<AuditEntry>) {
        self.lock().audit = entries;
    }

    /// Another client edits the document
    pub fn edit_as_other_user(&self, patch: ModelPatch) {
        let mut state = self.lock();
        state.model.apply(&patch).expect("other user's edit applies");
        bump(&mut state);
    }

    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    pub fn executed(&self) -> Vec<RemoteOp> {
        self.lock().executed.clone()
    }

    pub fn version(&self) -> String {
        format!("v{}", self.lock().version)
    }

    pub fn payload(&self) -> DocumentPayload {
        self.lock().model.to_payload().expect("server document loaded")
    }
}

fn bump(state: &mut ServerState) -> String {
    state.version += 1;
    let version = format!("v{}", state.version);
    state
        .model
        .apply(&ModelPatch::SetVersion { version: Some(version.clone()) })
        .expect("version applies");
    version
}

fn check_version(state: &ServerState, version: Option<&str>) -> ClientResult<()> {
    let current = format!("v{}", state.version);
    match version {
        Some(v) if v != current => Err(ClientError::from_status(
            409,
            format!("document-version {} was provided but the current version is {}", v, current),
        )),
        _ => Ok(()),
    }
}

fn perform(state: &mut ServerState, op: &RemoteOp) -> ClientResult<RemoteReply> {
    if let Some(Some(error)) = state.fail_next.pop_front() {
        return Err(error);
    }

    let mut created = None;
    let mut new_id = |state: &mut ServerState| {
        state.next_id += 1;
        let id = format!("srv-{}", state.next_id);
        created = Some(id.clone());
        id
    };

    let patch = match op.clone() {
        RemoteOp::CreateSpan { span_layer_id, tokens, value, metadata } => ModelPatch::InsertSpan {
            span: Span::new(new_id(state), span_layer_id, tokens, value).with_metadata(metadata),
            index: None,
        },
        RemoteOp::UpdateSpanValue { span_id, value } => ModelPatch::SetSpanValue { span_id, value },
        RemoteOp::SetSpanMetadata { span_id, metadata } => ModelPatch::SetSpanMetadata { span_id, metadata },
        RemoteOp::DeleteSpan { span_id } => ModelPatch::RemoveSpan { span_id },
        RemoteOp::CreateRelation { relation_layer_id, source, target, value } => ModelPatch::InsertRelation {
            relation: Relation::new(new_id(state), relation_layer_id, source, target, value),
            index: None,
        },
        RemoteOp::UpdateRelationValue { relation_id, value } => ModelPatch::SetRelationValue { relation_id, value },
        RemoteOp::DeleteRelation { relation_id } => ModelPatch::RemoveRelation { relation_id },
        RemoteOp::CreateToken { token_layer_id, begin, end, precedence, metadata, .. } => ModelPatch::InsertToken {
            token: Token::new(new_id(state), token_layer_id, begin, end)
                .with_precedence(precedence)
                .with_metadata(metadata),
            index: None,
        },
        RemoteOp::UpdateToken { token_id, begin, end, precedence } => ModelPatch::SetTokenExtent {
            token_id,
            begin,
            end,
            precedence,
        },
        RemoteOp::SetTokenMetadata { token_id, metadata } => ModelPatch::SetTokenMetadata { token_id, metadata },
        RemoteOp::DeleteToken { token_id } => ModelPatch::RemoveToken { token_id },
        RemoteOp::UpdateText { text_id, body } => ModelPatch::SetTextBody { text_id, body },
        RemoteOp::UpdateDocument { name, .. } => ModelPatch::SetDocumentName { name },
        RemoteOp::SetDocumentMetadata { metadata, .. } => ModelPatch::SetDocumentMetadata { metadata },
        RemoteOp::SetConfig { layer, namespace, key, value } => ModelPatch::SetConfig {
            layer,
            namespace,
            key,
            value: Some(value),
        },
        RemoteOp::DeleteConfig { layer, namespace, key } => ModelPatch::SetConfig {
            layer,
            namespace,
            key,
            value: None,
        },
    };

    state
        .model
        .apply(&patch)
        .map_err(|e| ClientError::from_status(400, e.to_string()))?;
    state.executed.push(op.clone());
    let version = bump(state);

    Ok(RemoteReply {
        id: created,
        version: Some(version),
    })
}

#[async_trait]
impl RemoteClient for FakeServer {
    async fn execute(&self, op: &RemoteOp, version: Option<&str>) -> ClientResult<RemoteReply> {
        let mut state = self.lock();
        if state.revoked {
            return Err(ClientError::from_status(401, "token expired"));
        }
        check_version(&state, version)?;
        perform(&mut state, op)
    }

    async fn fetch_document(&self, _document_id: &str, _as_of: Option<DateTime<Utc>>) -> ClientResult<DocumentPayload> {
        let delay = {
            let mut state = self.lock();
            if state.revoked {
                return Err(ClientError::from_status(401, "token expired"));
            }
            state.fetches += 1;
            state.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.payload())
    }

    async fn fetch_project(&self, _project_id: &str) -> ClientResult<Project> {
        Ok(self.lock().project.clone())
    }

    async fn audit(&self, _resource_id: &str) -> ClientResult<Vec<AuditEntry>> {
        let state = self.lock();
        if state.revoked {
            return Err(ClientError::from_status(403, "forbidden"));
        }
        Ok(state.audit.clone())
    }

    async fn bulk(&self, ops: &[RemoteOp], version: Option<&str>) -> ClientResult<Vec<RemoteReply>> {
        let mut state = self.lock();
        check_version(&state, version)?;
        let mut replies = Vec::with_capacity(ops.len());
        for op in ops {
            replies.push(perform(&mut state, op)?);
        }
        Ok(replies)
    }
}

/// Push-event channel whose events are emitted by the test
#[derive(Default)]
pub struct FakeEvents {
    senders: Mutex<Vec<mpsc::Sender<RawEvent>>>,
    subscriptions: Mutex<usize>,
}

impl FakeEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn emit(&self, event_type: &str, data: &str) {
        let senders: Vec<_> = {
            let mut senders = self.senders.lock().expect("senders poisoned");
            senders.retain(|tx| !tx.is_closed());
            senders.clone()
        };
        for tx in senders {
            let _ = tx.send(RawEvent::new(event_type, data)).await;
        }
    }

    /// Subscriptions whose consumer is still listening
    pub fn open_subscriptions(&self) -> usize {
        self.senders
            .lock()
            .expect("senders poisoned")
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    pub fn total_subscriptions(&self) -> usize {
        *self.subscriptions.lock().expect("counter poisoned")
    }
}

#[async_trait]
impl EventSource for FakeEvents {
    async fn subscribe(&self, _project_id: &str, _document_id: &str) -> ClientResult<EventStream> {
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().expect("senders poisoned").push(tx);
        *self.subscriptions.lock().expect("counter poisoned") += 1;
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Layer ref shorthand for config tests
pub fn token_layer(id: &str) -> LayerRef {
    LayerRef::TokenLayer(id.to_string())
}
