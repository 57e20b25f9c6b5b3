//! # Annotation Mutations
//!
//! Turns an editing intent into a [`MutationPlan`]: the remote calls to make,
//! in order, and what each does to the local graph.
//!
//! ## Confirmation discipline
//!
//! ### Updates and deletes
//! - Optimistic: the patch is applied before the call
//! - The patch's inverse is kept and applied if the call fails
//!
//! ### Creates
//! - Confirmed: nothing changes locally until the call succeeds
//! - The server-assigned id is then written into the template and inserted
//!
//! ## Existence checks
//!
//! Whether a span already covers a token is decided against the local
//! snapshot only. If another client created one in the meantime the server
//! rejects the write and the session reloads.

use plaid_common::{validate_name, Id, Metadata};
use plaid_model::{
    EntityModel, LayerRef, ModelError, ModelPatch, Project, Relation, Span, SpanLayer, Token,
    FORM_KEY,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EditorError;
use crate::ops::RemoteOp;

/// Config namespace of the interlinear glossing tool
pub const IGT_NAMESPACE: &str = "igt";

/// Key under [`IGT_NAMESPACE`] holding the ordered orthography list
pub const ORTHOGRAPHIES_KEY: &str = "orthographies";

/// One alternate writing system shown by the glossing tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orthography {
    pub name: String,
}

/// Record to insert once the server has assigned an id
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    InsertSpan(Span),
    InsertRelation(Relation),
    InsertToken { token: Token, index: Option<usize> },
}

impl Confirmation {
    pub fn into_patch(self, id: Id) -> ModelPatch {
        match self {
            Confirmation::InsertSpan(span) => ModelPatch::InsertSpan {
                span: span.with_id(id),
                index: None,
            },
            Confirmation::InsertRelation(relation) => ModelPatch::InsertRelation {
                relation: relation.with_id(id),
                index: None,
            },
            Confirmation::InsertToken { token, index } => ModelPatch::InsertToken {
                token: token.with_id(id),
                index,
            },
        }
    }
}

/// Local effect of one remote call
#[derive(Debug, Clone, PartialEq)]
pub enum StepEffect {
    /// Applied before the call, undone if it fails
    Optimistic(ModelPatch),
    /// Applied after the call succeeds
    Confirmed(Confirmation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub op: RemoteOp,
    pub effect: StepEffect,
}

impl PlannedStep {
    fn optimistic(op: RemoteOp, patch: ModelPatch) -> Self {
        Self {
            op,
            effect: StepEffect::Optimistic(patch),
        }
    }

    fn confirmed(op: RemoteOp, confirmation: Confirmation) -> Self {
        Self {
            op,
            effect: StepEffect::Confirmed(confirmation),
        }
    }
}

/// Ordered remote calls for one editing intent.
///
/// Steps run strictly one after another; a failing step stops the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPlan {
    pub label: &'static str,
    pub steps: Vec<PlannedStep>,
    /// The server rewrites dependent records (e.g. token offsets after a text
    /// edit), so the whole document should be fetched again afterwards
    pub reload_after: bool,
}

impl MutationPlan {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            steps: Vec::new(),
            reload_after: false,
        }
    }

    fn step(mut self, step: PlannedStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Plans mutations against a snapshot of the model
pub struct Planner<'a> {
    model: &'a EntityModel,
}

impl<'a> Planner<'a> {
    pub fn new(model: &'a EntityModel) -> Self {
        Self { model }
    }

    fn ensure_editable(&self) -> Result<(), EditorError> {
        if !self.model.is_loaded() {
            return Err(ModelError::NotLoaded.into());
        }
        if self.model.is_read_only() {
            return Err(EditorError::ReadOnly);
        }
        Ok(())
    }

    fn span_layer(&self, id: &str) -> Result<&'a SpanLayer, EditorError> {
        self.model
            .span_layer(id)
            .ok_or_else(|| EditorError::not_found("Span layer", id))
    }

    fn span(&self, id: &str) -> Result<&'a Span, EditorError> {
        self.model.span(id).ok_or_else(|| EditorError::not_found("Span", id))
    }

    fn token(&self, id: &str) -> Result<&'a Token, EditorError> {
        self.model.token(id).ok_or_else(|| EditorError::not_found("Token", id))
    }

    fn relation(&self, id: &str) -> Result<&'a Relation, EditorError> {
        self.model
            .relation(id)
            .ok_or_else(|| EditorError::not_found("Relation", id))
    }

    fn check_tokens(&self, layer: &SpanLayer, tokens: &[Id]) -> Result<(), EditorError> {
        if tokens.is_empty() {
            return Err(EditorError::Validation("an annotation needs at least one token".to_string()));
        }
        for token_id in tokens {
            let token = self.token(token_id)?;
            if token.token_layer_id() != layer.token_layer_id() {
                return Err(EditorError::Validation(format!(
                    "token {} is not annotatable in layer {}",
                    token_id, layer.name
                )));
            }
        }
        Ok(())
    }

    /// Set the one value a single-valued layer holds for `tokens`.
    ///
    /// Updates the span already covering the first token, or creates one.
    /// Refused when another span of the layer covers any other token of the
    /// group.
    pub fn upsert_single_valued(
        &self,
        tokens: &[Id],
        span_layer_id: &str,
        value: Value,
    ) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let layer = self.span_layer(span_layer_id)?;
        if self.model.roles().is_multi_valued(&layer.name) {
            return Err(EditorError::Validation(format!(
                "layer {} holds several values per token",
                layer.name
            )));
        }
        self.check_tokens(layer, tokens)?;

        let existing = self
            .model
            .spans_covering(layer.id(), &tokens[0])
            .into_iter()
            .next();
        let existing_id = existing.map(|s| s.id());
        for token_id in &tokens[1..] {
            if let Some(other) = self
                .model
                .spans_covering(layer.id(), token_id)
                .into_iter()
                .find(|s| Some(s.id()) != existing_id)
            {
                return Err(EditorError::Validation(format!(
                    "token {} already has a {} annotation ({})",
                    token_id,
                    layer.name,
                    other.id()
                )));
            }
        }

        let plan = MutationPlan::new("upsert annotation");
        Ok(match existing {
            Some(span) => plan.step(PlannedStep::optimistic(
                RemoteOp::UpdateSpanValue {
                    span_id: span.id().to_string(),
                    value: value.clone(),
                },
                ModelPatch::SetSpanValue {
                    span_id: span.id().to_string(),
                    value,
                },
            )),
            None => plan.step(PlannedStep::confirmed(
                RemoteOp::CreateSpan {
                    span_layer_id: layer.id().to_string(),
                    tokens: tokens.to_vec(),
                    value: value.clone(),
                    metadata: Metadata::new(),
                },
                Confirmation::InsertSpan(Span::new("", layer.id(), tokens.to_vec(), value)),
            )),
        })
    }

    /// Add one more value (e.g. a morphological feature); never looks for an
    /// existing span
    pub fn create_multi_valued(
        &self,
        tokens: &[Id],
        span_layer_id: &str,
        value: Value,
    ) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let layer = self.span_layer(span_layer_id)?;
        if self.model.roles().is_single_valued(&layer.name) {
            return Err(EditorError::Validation(format!(
                "layer {} holds one value per token",
                layer.name
            )));
        }
        self.check_tokens(layer, tokens)?;

        Ok(MutationPlan::new("create annotation").step(PlannedStep::confirmed(
            RemoteOp::CreateSpan {
                span_layer_id: layer.id().to_string(),
                tokens: tokens.to_vec(),
                value: value.clone(),
                metadata: Metadata::new(),
            },
            Confirmation::InsertSpan(Span::new("", layer.id(), tokens.to_vec(), value)),
        )))
    }

    pub fn delete_annotation(&self, span_id: &str) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let span = self.span(span_id)?;

        Ok(MutationPlan::new("delete annotation").step(PlannedStep::optimistic(
            RemoteOp::DeleteSpan {
                span_id: span.id().to_string(),
            },
            ModelPatch::RemoveSpan {
                span_id: span.id().to_string(),
            },
        )))
    }

    pub fn set_span_metadata(&self, span_id: &str, metadata: Metadata) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let span = self.span(span_id)?;

        Ok(MutationPlan::new("update annotation metadata").step(PlannedStep::optimistic(
            RemoteOp::SetSpanMetadata {
                span_id: span.id().to_string(),
                metadata: metadata.clone(),
            },
            ModelPatch::SetSpanMetadata {
                span_id: span.id().to_string(),
                metadata,
            },
        )))
    }

    /// Point `target`'s single incoming edge at `source`.
    ///
    /// Every relation currently ending at `target` is deleted first, then the
    /// new one is created. `source == target` marks the root.
    pub fn upsert_relation(&self, source: &str, target: &str, label: Value) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let source_span = self.span(source)?;
        let target_span = self.span(target)?;
        if source_span.span_layer_id() != target_span.span_layer_id() {
            return Err(EditorError::Validation(format!(
                "spans {} and {} are in different layers",
                source, target
            )));
        }
        let relation_layer = self
            .model
            .relation_layer_of(source_span.span_layer_id())
            .ok_or_else(|| {
                EditorError::Validation(format!(
                    "span layer {} has no relation layer",
                    source_span.span_layer_id()
                ))
            })?;

        let mut plan = MutationPlan::new("upsert relation");
        for existing in self.model.incoming_relations(relation_layer.id(), target) {
            plan = plan.step(PlannedStep::optimistic(
                RemoteOp::DeleteRelation {
                    relation_id: existing.id().to_string(),
                },
                ModelPatch::RemoveRelation {
                    relation_id: existing.id().to_string(),
                },
            ));
        }

        Ok(plan.step(PlannedStep::confirmed(
            RemoteOp::CreateRelation {
                relation_layer_id: relation_layer.id().to_string(),
                source: source.to_string(),
                target: target.to_string(),
                value: label.clone(),
            },
            Confirmation::InsertRelation(Relation::new("", relation_layer.id(), source, target, label)),
        )))
    }

    pub fn set_relation_value(&self, relation_id: &str, value: Value) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let relation = self.relation(relation_id)?;

        Ok(MutationPlan::new("update relation").step(PlannedStep::optimistic(
            RemoteOp::UpdateRelationValue {
                relation_id: relation.id().to_string(),
                value: value.clone(),
            },
            ModelPatch::SetRelationValue {
                relation_id: relation.id().to_string(),
                value,
            },
        )))
    }

    pub fn delete_relation(&self, relation_id: &str) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let relation = self.relation(relation_id)?;

        Ok(MutationPlan::new("delete relation").step(PlannedStep::optimistic(
            RemoteOp::DeleteRelation {
                relation_id: relation.id().to_string(),
            },
            ModelPatch::RemoveRelation {
                relation_id: relation.id().to_string(),
            },
        )))
    }

    pub fn set_token_metadata(&self, token_id: &str, metadata: Metadata) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let token = self.token(token_id)?;

        Ok(MutationPlan::new("update token metadata").step(PlannedStep::optimistic(
            RemoteOp::SetTokenMetadata {
                token_id: token.id().to_string(),
                metadata: metadata.clone(),
            },
            ModelPatch::SetTokenMetadata {
                token_id: token.id().to_string(),
                metadata,
            },
        )))
    }

    pub fn set_token_precedence(&self, token_id: &str, precedence: Option<i64>) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let token = self.token(token_id)?;

        Ok(MutationPlan::new("reorder token").step(PlannedStep::optimistic(
            RemoteOp::UpdateToken {
                token_id: token.id().to_string(),
                begin: token.begin,
                end: token.end,
                precedence,
            },
            ModelPatch::SetTokenExtent {
                token_id: token.id().to_string(),
                begin: token.begin,
                end: token.end,
                precedence,
            },
        )))
    }

    /// Split a token's form at character `position`.
    ///
    /// The token keeps the left part as its form; a new token on the same
    /// extent, one precedence slot later, takes the right part. Siblings
    /// after it are not renumbered here; the next reload brings the
    /// server's numbering.
    pub fn split_token(
        &self,
        token_id: &str,
        position: usize,
        left: &str,
        right: &str,
    ) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let token = self.token(token_id)?;
        let text = self.model.text_for_token_layer(token.token_layer_id());

        let form_len = token.form(text).chars().count();
        if position == 0 || position >= form_len {
            return Err(EditorError::Validation(format!(
                "cannot split a {}-character form at {}",
                form_len, position
            )));
        }
        if left.trim().is_empty() || right.trim().is_empty() {
            return Err(EditorError::Validation("both halves of a split need a form".to_string()));
        }
        let text_id = text
            .map(|t| t.id().to_string())
            .ok_or_else(|| EditorError::Validation(format!("token {} has no text", token_id)))?;

        let mut left_metadata = token.metadata.clone();
        left_metadata.insert(FORM_KEY.to_string(), Value::String(left.to_string()));

        let mut right_metadata = Metadata::new();
        right_metadata.insert(FORM_KEY.to_string(), Value::String(right.to_string()));
        let precedence = Some(token.precedence.unwrap_or(0) + 1);

        let index = self
            .model
            .token_layer(token.token_layer_id())
            .and_then(|l| l.token_ids().iter().position(|id| id == token_id))
            .map(|i| i + 1);

        Ok(MutationPlan::new("split token")
            .step(PlannedStep::optimistic(
                RemoteOp::SetTokenMetadata {
                    token_id: token.id().to_string(),
                    metadata: left_metadata.clone(),
                },
                ModelPatch::SetTokenMetadata {
                    token_id: token.id().to_string(),
                    metadata: left_metadata,
                },
            ))
            .step(PlannedStep::confirmed(
                RemoteOp::CreateToken {
                    token_layer_id: token.token_layer_id().to_string(),
                    text_id,
                    begin: token.begin,
                    end: token.end,
                    precedence,
                    metadata: right_metadata.clone(),
                },
                Confirmation::InsertToken {
                    token: Token::new("", token.token_layer_id(), token.begin, token.end)
                        .with_precedence(precedence)
                        .with_metadata(right_metadata),
                    index,
                },
            )))
    }

    /// Rename the document, checking the name against the project's others
    pub fn rename_document(&self, name: &str, project: Option<&Project>) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let document = self.model.document().ok_or(ModelError::NotLoaded)?;
        let others: Vec<&str> = project
            .map(|p| p.other_document_names(document.id()).collect())
            .unwrap_or_default();
        let name = validate_name("Document", name, others)
            .map_err(|e| EditorError::Validation(e.message().to_string()))?;

        Ok(MutationPlan::new("rename document").step(PlannedStep::optimistic(
            RemoteOp::UpdateDocument {
                document_id: document.id().to_string(),
                name: name.clone(),
            },
            ModelPatch::SetDocumentName { name },
        )))
    }

    pub fn set_document_metadata(&self, metadata: Metadata) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let document = self.model.document().ok_or(ModelError::NotLoaded)?;

        Ok(MutationPlan::new("update document metadata").step(PlannedStep::optimistic(
            RemoteOp::SetDocumentMetadata {
                document_id: document.id().to_string(),
                metadata: metadata.clone(),
            },
            ModelPatch::SetDocumentMetadata { metadata },
        )))
    }

    /// Replace a text body. Token offsets are shifted by the server, so the
    /// plan asks for a reload.
    pub fn update_text_body(&self, text_id: &str, body: &str) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        let text = self
            .model
            .text(text_id)
            .ok_or_else(|| EditorError::not_found("Text", text_id))?;

        let mut plan = MutationPlan::new("update text").step(PlannedStep::optimistic(
            RemoteOp::UpdateText {
                text_id: text.id().to_string(),
                body: body.to_string(),
            },
            ModelPatch::SetTextBody {
                text_id: text.id().to_string(),
                body: body.to_string(),
            },
        ));
        plan.reload_after = true;
        Ok(plan)
    }

    pub fn set_config(
        &self,
        layer: LayerRef,
        namespace: &str,
        key: &str,
        value: Value,
    ) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        self.layer_exists(&layer)?;
        if namespace.trim().is_empty() || key.trim().is_empty() {
            return Err(EditorError::Validation("config namespace and key must not be empty".to_string()));
        }

        Ok(MutationPlan::new("set config").step(PlannedStep::optimistic(
            RemoteOp::SetConfig {
                layer: layer.clone(),
                namespace: namespace.to_string(),
                key: key.to_string(),
                value: value.clone(),
            },
            ModelPatch::SetConfig {
                layer,
                namespace: namespace.to_string(),
                key: key.to_string(),
                value: Some(value),
            },
        )))
    }

    pub fn delete_config(&self, layer: LayerRef, namespace: &str, key: &str) -> Result<MutationPlan, EditorError> {
        self.ensure_editable()?;
        self.layer_exists(&layer)?;

        Ok(MutationPlan::new("delete config").step(PlannedStep::optimistic(
            RemoteOp::DeleteConfig {
                layer: layer.clone(),
                namespace: namespace.to_string(),
                key: key.to_string(),
            },
            ModelPatch::SetConfig {
                layer,
                namespace: namespace.to_string(),
                key: key.to_string(),
                value: None,
            },
        )))
    }

    /// Store the glossing tool's ordered orthography list on a token layer
    pub fn set_orthographies(
        &self,
        token_layer_id: &str,
        orthographies: &[Orthography],
    ) -> Result<MutationPlan, EditorError> {
        let mut seen: Vec<&str> = Vec::with_capacity(orthographies.len());
        for orthography in orthographies {
            validate_name("Orthography", &orthography.name, seen.iter().copied())
                .map_err(|e| EditorError::Validation(e.message().to_string()))?;
            seen.push(orthography.name.trim());
        }

        let value = serde_json::to_value(orthographies)
            .map_err(|e| EditorError::Validation(e.to_string()))?;
        self.set_config(
            LayerRef::TokenLayer(token_layer_id.to_string()),
            IGT_NAMESPACE,
            ORTHOGRAPHIES_KEY,
            value,
        )
    }

    fn layer_exists(&self, layer: &LayerRef) -> Result<(), EditorError> {
        let found = match layer {
            LayerRef::TextLayer(id) => self.model.text_layer(id).is_some(),
            LayerRef::TokenLayer(id) => self.model.token_layer(id).is_some(),
            LayerRef::SpanLayer(id) => self.model.span_layer(id).is_some(),
            LayerRef::RelationLayer(id) => self.model.relation_layer(id).is_some(),
        };
        if found {
            Ok(())
        } else {
            Err(EditorError::not_found("Layer", layer_id(layer)))
        }
    }
}

fn layer_id(layer: &LayerRef) -> &str {
    match layer {
        LayerRef::TextLayer(id)
        | LayerRef::TokenLayer(id)
        | LayerRef::SpanLayer(id)
        | LayerRef::RelationLayer(id) => id,
    }
}

/// Orthographies configured on a token layer, in order
pub fn orthographies(model: &EntityModel, token_layer_id: &str) -> Vec<Orthography> {
    model
        .token_layer(token_layer_id)
        .and_then(|l| l.config.get(IGT_NAMESPACE))
        .and_then(|ns| ns.get(ORTHOGRAPHIES_KEY))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}
