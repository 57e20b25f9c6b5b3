//! # Document Session
//!
//! Owns one open document: its model, the in-flight mutations and the sync
//! state, and drives mutation plans against the remote.
//!
//! ## Running a plan
//!
//! ```text
//! for each step:
//!   optimistic patch → journal (inverse kept)
//!   remote call ──ok──▶ store version, apply confirmed create
//!               └─err─▶ roll back, classify:
//!                         conflict  → one notice, full reload
//!                         auth      → drop local state
//!                         other     → notice naming the operation
//! ```
//!
//! The model lock is never held across an await. Remote calls only suspend
//! the calling operation; others keep reading the (possibly stale) model.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use plaid_common::{ClientError, Id, Metadata};
use plaid_editor::{
    HistoryWindow, MutationPlan, Orthography, Outcome, Planner, Reconciler, RemoteOp, RemoteReply,
    RollbackJournal, SentenceView, StepEffect, SyncState, ViewPipeline,
};
use plaid_model::{AuditEntry, DocumentPayload, EntityModel, LayerRef, ModelPatch, Project};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use crate::events::{EventDispatcher, PushEvent};
use crate::remote::RemoteClient;

/// User-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Someone else changed the document; local state is being replaced
    Conflict,
    /// A call failed; dismissible
    Error(String),
    /// Credentials were rejected; local state was dropped
    SignedOut,
    /// The server could not parse an uploaded document
    ParseFailed(String),
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::Conflict => "This document was modified by another user. Refreshing.".to_string(),
            Notice::Error(message) => message.clone(),
            Notice::SignedOut => "Your session has expired. Please sign in again.".to_string(),
            Notice::ParseFailed(message) => format!("Parsing failed: {}", message),
        }
    }
}

struct SessionState {
    model: EntityModel,
    project: Option<Project>,
    journal: RollbackJournal,
    reconciler: Reconciler,
    views: ViewPipeline,
}

struct Inner {
    document_id: Id,
    as_of: Option<DateTime<Utc>>,
    remote: Arc<dyn RemoteClient>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    reload_gate: tokio::sync::Mutex<()>,
    notices: mpsc::UnboundedSender<Notice>,
}

/// Handle to an open document. Clones share the same session.
#[derive(Clone)]
pub struct DocumentSession {
    inner: Arc<Inner>,
}

impl DocumentSession {
    /// Fetch a document and start editing it
    pub async fn open(
        remote: Arc<dyn RemoteClient>,
        document_id: &str,
        config: SessionConfig,
    ) -> SessionResult<(Self, mpsc::UnboundedReceiver<Notice>)> {
        Self::start(remote, document_id, None, config).await
    }

    /// Fetch a document as it was at `as_of`. The snapshot is read-only.
    pub async fn open_as_of(
        remote: Arc<dyn RemoteClient>,
        document_id: &str,
        as_of: DateTime<Utc>,
        config: SessionConfig,
    ) -> SessionResult<(Self, mpsc::UnboundedReceiver<Notice>)> {
        Self::start(remote, document_id, Some(as_of), config).await
    }

    async fn start(
        remote: Arc<dyn RemoteClient>,
        document_id: &str,
        as_of: Option<DateTime<Utc>>,
        config: SessionConfig,
    ) -> SessionResult<(Self, mpsc::UnboundedReceiver<Notice>)> {
        let payload = remote.fetch_document(document_id, as_of).await?;
        let project = match &payload.project {
            Some(project_id) => Some(remote.fetch_project(project_id).await?),
            None => None,
        };

        let mut model = EntityModel::with_roles(config.roles.clone());
        load_into(&mut model, payload, as_of.is_some());
        tracing::info!(
            "opened document {}{}",
            document_id,
            as_of.map(|t| format!(" as of {}", t)).unwrap_or_default()
        );

        let (notices, receiver) = mpsc::unbounded_channel();
        let state = SessionState {
            model,
            project,
            journal: RollbackJournal::new(),
            reconciler: Reconciler::new(config.conflict_markers.clone()),
            views: ViewPipeline::new(),
        };

        let session = Self {
            inner: Arc::new(Inner {
                document_id: document_id.to_string(),
                as_of,
                remote,
                config,
                state: Mutex::new(state),
                reload_gate: tokio::sync::Mutex::new(()),
                notices,
            }),
        };
        Ok((session, receiver))
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // patches are all-or-nothing, so a poisoned graph is still whole
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, notice: Notice) {
        if self.inner.notices.send(notice).is_err() {
            tracing::debug!("notice receiver for {} is gone", self.inner.document_id);
        }
    }

    pub fn document_id(&self) -> &str {
        &self.inner.document_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn sync_state(&self) -> SyncState {
        self.state().reconciler.state()
    }

    /// Read the current model
    pub fn with_model<R>(&self, f: impl FnOnce(&EntityModel) -> R) -> R {
        f(&self.state().model)
    }

    pub fn snapshot(&self) -> Option<DocumentPayload> {
        self.state().model.to_payload()
    }

    pub fn project(&self) -> Option<Project> {
        self.state().project.clone()
    }

    /// Sentence views of the current model
    pub fn sentences(&self) -> Vec<SentenceView> {
        let mut guard = self.state();
        let state = &mut *guard;
        state.views.sentences(&state.model).to_vec()
    }

    /// Replace the model with a fresh fetch.
    ///
    /// Returns `false` when a reload was already running; that one's result
    /// stands for both.
    pub async fn reload(&self) -> SessionResult<bool> {
        let Ok(_gate) = self.inner.reload_gate.try_lock() else {
            tracing::debug!("reload of {} already running; coalesced", self.inner.document_id);
            return Ok(false);
        };

        tracing::info!("reloading document {}", self.inner.document_id);
        let fetched = self
            .inner
            .remote
            .fetch_document(&self.inner.document_id, self.inner.as_of)
            .await;

        let outcome = {
            let mut guard = self.state();
            let state = &mut *guard;
            match &fetched {
                Ok(payload) => {
                    load_into(&mut state.model, payload.clone(), self.inner.as_of.is_some());
                    let dropped = state.journal.discard_all();
                    if dropped > 0 {
                        tracing::debug!("reload superseded {} pending mutations", dropped);
                    }
                    state.reconciler.reloaded(Ok(()))
                }
                Err(e) => state.reconciler.reloaded(Err(e)),
            }
        };
        self.settle(outcome);

        match fetched {
            Ok(_) => {
                tracing::info!("reloaded document {}", self.inner.document_id);
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Carry out a mutation plan step by step.
    ///
    /// Each step has its own journal record, committed as soon as the server
    /// accepts it. Stops at the first failing step and rolls back only that
    /// step's optimistic changes; earlier steps stay, as on the server.
    pub async fn run(&self, plan: MutationPlan) -> SessionResult<()> {
        if plan.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.state();
            if !state.reconciler.begin() {
                return Err(SessionError::Unauthenticated);
            }
        }
        tracing::debug!("running '{}' ({} steps)", plan.label, plan.steps.len());

        let mut needs_reload = plan.reload_after;
        let mut accepted = 0usize;
        for step in plan.steps {
            let (journal_id, version) = {
                let mut guard = self.state();
                let state = &mut *guard;
                let journal_id = state.journal.begin(plan.label);
                if let StepEffect::Optimistic(patch) = &step.effect {
                    if let Err(e) = state.journal.apply(journal_id, patch, &mut state.model) {
                        tracing::warn!("'{}' no longer applies locally: {}", plan.label, e);
                        if let Err(undo) = state.journal.rollback(journal_id, &mut state.model) {
                            tracing::warn!("rollback of '{}' incomplete: {}", plan.label, undo);
                        }
                        state.reconciler.abandoned();
                        return Err(e.into());
                    }
                }
                (journal_id, state.model.version().map(str::to_string))
            };

            tracing::info!("remote: {}", step.op.describe());
            match self.inner.remote.execute(&step.op, version.as_deref()).await {
                Ok(reply) => {
                    self.state().journal.commit(journal_id);
                    accepted += 1;
                    if !self.confirm(&step.op, step.effect, reply) {
                        needs_reload = true;
                    }
                }
                Err(error) => {
                    let outcome = {
                        let mut guard = self.state();
                        let state = &mut *guard;
                        if let Err(undo) = state.journal.rollback(journal_id, &mut state.model) {
                            tracing::warn!("rollback of '{}' incomplete: {}", plan.label, undo);
                            needs_reload = true;
                        }
                        state.reconciler.failed(&error, plan.label)
                    };
                    tracing::warn!("'{}' failed at {}: {}", plan.label, step.op.describe(), error);
                    let reload_anyway =
                        needs_reload && accepted > 0 && matches!(outcome, Outcome::Settled | Outcome::Report(_));
                    self.resolve(outcome).await;
                    if reload_anyway {
                        if let Err(e) = self.reload().await {
                            tracing::warn!("reload after partial '{}' failed: {}", plan.label, e);
                        }
                    }
                    return Err(error.into());
                }
            }
        }

        self.state().reconciler.succeeded();

        if needs_reload {
            self.reload().await?;
        }
        Ok(())
    }

    /// Record a successful call. `false` when the local model could not take
    /// the result and should be reloaded.
    fn confirm(&self, op: &RemoteOp, effect: StepEffect, reply: RemoteReply) -> bool {
        let mut state = self.state();
        let mut consistent = true;

        if let StepEffect::Confirmed(confirmation) = effect {
            match reply.id {
                Some(id) => {
                    if let Err(e) = state.model.apply(&confirmation.into_patch(id)) {
                        tracing::warn!("created record could not be added locally: {}", e);
                        consistent = false;
                    }
                }
                None => {
                    tracing::warn!("{} returned no id", op.describe());
                    consistent = false;
                }
            }
        }

        if let Some(version) = reply.version {
            if let Err(e) = state.model.apply(&ModelPatch::SetVersion { version: Some(version) }) {
                tracing::warn!("could not store document version: {}", e);
            }
        }
        consistent
    }

    /// Act on an outcome, reloading when asked to
    async fn resolve(&self, outcome: Outcome) {
        if outcome == Outcome::Reload {
            self.notify(Notice::Conflict);
            if let Err(e) = self.reload().await {
                tracing::warn!("reload after conflict failed: {}", e);
            }
        } else {
            self.settle(outcome);
        }
    }

    /// Act on an outcome that needs no reload
    fn settle(&self, outcome: Outcome) {
        match outcome {
            Outcome::Settled => {}
            Outcome::Reload => {
                tracing::warn!("reload requested for {} while settling", self.inner.document_id);
            }
            Outcome::Reauthenticate => {
                {
                    let mut state = self.state();
                    state.model.clear();
                    state.journal.discard_all();
                    state.views.clear_cache();
                }
                tracing::warn!("credentials rejected; dropped local state of {}", self.inner.document_id);
                self.notify(Notice::SignedOut);
            }
            Outcome::Report(message) => self.notify(Notice::Error(message)),
        }
    }

    fn plan<F>(&self, f: F) -> SessionResult<MutationPlan>
    where
        F: FnOnce(&Planner<'_>) -> Result<MutationPlan, plaid_editor::EditorError>,
    {
        let state = self.state();
        if state.reconciler.state() == SyncState::Unauthenticated {
            return Err(SessionError::Unauthenticated);
        }
        Ok(f(&Planner::new(&state.model))?)
    }

    pub async fn upsert_single_valued(&self, tokens: &[Id], span_layer_id: &str, value: Value) -> SessionResult<()> {
        let plan = self.plan(|p| p.upsert_single_valued(tokens, span_layer_id, value))?;
        self.run(plan).await
    }

    pub async fn create_multi_valued(&self, tokens: &[Id], span_layer_id: &str, value: Value) -> SessionResult<()> {
        let plan = self.plan(|p| p.create_multi_valued(tokens, span_layer_id, value))?;
        self.run(plan).await
    }

    pub async fn delete_annotation(&self, span_id: &str) -> SessionResult<()> {
        let plan = self.plan(|p| p.delete_annotation(span_id))?;
        self.run(plan).await
    }

    pub async fn set_span_metadata(&self, span_id: &str, metadata: Metadata) -> SessionResult<()> {
        let plan = self.plan(|p| p.set_span_metadata(span_id, metadata))?;
        self.run(plan).await
    }

    pub async fn upsert_relation(&self, source: &str, target: &str, label: Value) -> SessionResult<()> {
        let plan = self.plan(|p| p.upsert_relation(source, target, label))?;
        self.run(plan).await
    }

    pub async fn set_relation_value(&self, relation_id: &str, value: Value) -> SessionResult<()> {
        let plan = self.plan(|p| p.set_relation_value(relation_id, value))?;
        self.run(plan).await
    }

    pub async fn delete_relation(&self, relation_id: &str) -> SessionResult<()> {
        let plan = self.plan(|p| p.delete_relation(relation_id))?;
        self.run(plan).await
    }

    pub async fn set_token_metadata(&self, token_id: &str, metadata: Metadata) -> SessionResult<()> {
        let plan = self.plan(|p| p.set_token_metadata(token_id, metadata))?;
        self.run(plan).await
    }

    pub async fn set_token_precedence(&self, token_id: &str, precedence: Option<i64>) -> SessionResult<()> {
        let plan = self.plan(|p| p.set_token_precedence(token_id, precedence))?;
        self.run(plan).await
    }

    pub async fn split_token(&self, token_id: &str, position: usize, left: &str, right: &str) -> SessionResult<()> {
        let plan = self.plan(|p| p.split_token(token_id, position, left, right))?;
        self.run(plan).await
    }

    pub async fn rename_document(&self, name: &str) -> SessionResult<()> {
        let project = self.project();
        let plan = self.plan(|p| p.rename_document(name, project.as_ref()))?;
        self.run(plan).await
    }

    pub async fn set_document_metadata(&self, metadata: Metadata) -> SessionResult<()> {
        let plan = self.plan(|p| p.set_document_metadata(metadata))?;
        self.run(plan).await
    }

    pub async fn update_text_body(&self, text_id: &str, body: &str) -> SessionResult<()> {
        let plan = self.plan(|p| p.update_text_body(text_id, body))?;
        self.run(plan).await
    }

    pub async fn set_config(&self, layer: LayerRef, namespace: &str, key: &str, value: Value) -> SessionResult<()> {
        let plan = self.plan(|p| p.set_config(layer, namespace, key, value))?;
        self.run(plan).await
    }

    pub async fn delete_config(&self, layer: LayerRef, namespace: &str, key: &str) -> SessionResult<()> {
        let plan = self.plan(|p| p.delete_config(layer, namespace, key))?;
        self.run(plan).await
    }

    pub async fn set_orthographies(&self, token_layer_id: &str, orthographies: &[Orthography]) -> SessionResult<()> {
        let plan = self.plan(|p| p.set_orthographies(token_layer_id, orthographies))?;
        self.run(plan).await
    }

    /// Submit raw operations in one bulk call.
    ///
    /// The model is not patched from the ops; it is reloaded afterwards,
    /// whether the batch went through or stopped partway.
    pub async fn submit_bulk(&self, ops: Vec<RemoteOp>) -> SessionResult<Vec<RemoteReply>> {
        let version = {
            let mut state = self.state();
            if state.model.is_read_only() {
                return Err(SessionError::Editor(plaid_editor::EditorError::ReadOnly));
            }
            if !state.reconciler.begin() {
                return Err(SessionError::Unauthenticated);
            }
            state.model.version().map(str::to_string)
        };

        tracing::info!("remote: bulk of {} ops", ops.len());
        match self.inner.remote.bulk(&ops, version.as_deref()).await {
            Ok(replies) => {
                self.state().reconciler.succeeded();
                self.reload().await?;
                Ok(replies)
            }
            Err(error) => {
                let outcome = self.state().reconciler.failed(&error, "submit bulk operations");
                match outcome {
                    Outcome::Reload => self.resolve(Outcome::Reload).await,
                    Outcome::Reauthenticate => self.settle(Outcome::Reauthenticate),
                    other => {
                        self.settle(other);
                        if let Err(e) = self.reload().await {
                            tracing::warn!("reload after failed bulk failed: {}", e);
                        }
                    }
                }
                Err(error.into())
            }
        }
    }

    /// Change log of a resource, oldest first
    pub async fn history(&self, resource_id: &str) -> SessionResult<Vec<AuditEntry>> {
        match self.inner.remote.audit(resource_id).await {
            Ok(entries) => Ok(entries),
            Err(error) => {
                if matches!(error, ClientError::Unauthorized(_)) {
                    self.state().reconciler.failed(&error, "load history");
                    self.settle(Outcome::Reauthenticate);
                }
                Err(error.into())
            }
        }
    }

    /// Window of history rows for a scroll position, using the configured
    /// row height and buffer
    pub fn history_window(&self, entry_count: usize, scroll_offset: f64, viewport_height: f64) -> HistoryWindow {
        HistoryWindow::compute(
            entry_count,
            self.inner.config.history_row_height,
            self.inner.config.history_buffer,
            scroll_offset,
            viewport_height,
        )
    }

    /// React to one push event
    pub async fn handle_event(&self, event: &PushEvent) {
        let ours = event.document_id() == Some(self.document_id());
        match event {
            PushEvent::ParseSucceeded { .. } if ours => {
                if let Err(e) = self.reload().await {
                    tracing::warn!("reload after parse failed: {}", e);
                }
            }
            PushEvent::ParseFailed { message, .. } if ours => {
                self.notify(Notice::ParseFailed(message.clone()));
            }
            other => tracing::debug!("event for {}: {:?}", self.inner.document_id, other),
        }
    }

    /// Handle events until the channel closes
    pub async fn pump_events(&self, mut events: mpsc::Receiver<PushEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(&event).await;
        }
    }

    /// Attach `dispatcher` to this document and handle its events in a
    /// background task. Detaching the dispatcher ends the task.
    pub async fn follow(&self, dispatcher: &mut EventDispatcher) -> SessionResult<JoinHandle<()>> {
        let project_id = self
            .state()
            .model
            .document()
            .and_then(|d| d.project_id().map(str::to_string))
            .unwrap_or_default();

        let events = dispatcher.attach(&project_id, self.document_id()).await?;
        let session = self.clone();
        Ok(tokio::spawn(async move { session.pump_events(events).await }))
    }
}

fn load_into(model: &mut EntityModel, payload: DocumentPayload, read_only: bool) {
    if read_only {
        model.load_read_only(payload);
    } else {
        model.load(payload);
    }
}
