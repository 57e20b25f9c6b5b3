//! # Model Patches
//!
//! Every edit the client makes to the graph, as data.
//!
//! ## Design
//!
//! - Applying a patch validates it against the current graph first
//! - Applying returns the inverse patch, captured before the change
//! - Removing a record removes whatever depends on it: relations touching a
//!   removed span, spans left without tokens by a removed token
//! - The inverse of a cascading removal restores the whole subtree in its
//!   original positions
//! - A failing step inside a batch undoes the steps already applied

use plaid_common::{Id, Metadata, VersionToken};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{Relation, Span, Token};
use crate::errors::ModelError;
use crate::graph::{EntityModel, EntityMut, EntityPath};

/// A layer whose configuration mapping is being edited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerRef {
    TextLayer(Id),
    TokenLayer(Id),
    SpanLayer(Id),
    RelationLayer(Id),
}

impl LayerRef {
    fn path(&self) -> EntityPath {
        match self {
            LayerRef::TextLayer(id) => EntityPath::TextLayer(id.clone()),
            LayerRef::TokenLayer(id) => EntityPath::TokenLayer(id.clone()),
            LayerRef::SpanLayer(id) => EntityPath::SpanLayer(id.clone()),
            LayerRef::RelationLayer(id) => EntityPath::RelationLayer(id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelPatch {
    /// Insert a span into its layer at `index` (end of the layer when `None`)
    InsertSpan { span: Span, index: Option<usize> },

    /// Remove a span and every relation touching it
    RemoveSpan { span_id: Id },

    SetSpanValue { span_id: Id, value: Value },

    SetSpanMetadata { span_id: Id, metadata: Metadata },

    SetSpanTokens { span_id: Id, tokens: Vec<Id> },

    InsertRelation { relation: Relation, index: Option<usize> },

    RemoveRelation { relation_id: Id },

    SetRelationValue { relation_id: Id, value: Value },

    InsertToken { token: Token, index: Option<usize> },

    /// Remove a token, dropping it from spans and removing spans left empty
    RemoveToken { token_id: Id },

    SetTokenExtent {
        token_id: Id,
        begin: usize,
        end: usize,
        precedence: Option<i64>,
    },

    SetTokenMetadata { token_id: Id, metadata: Metadata },

    /// Replace a text body wholesale
    SetTextBody { text_id: Id, body: String },

    SetDocumentName { name: String },

    SetDocumentMetadata { metadata: Metadata },

    /// Set (`Some`) or delete (`None`) one config entry of a layer
    SetConfig {
        layer: LayerRef,
        namespace: String,
        key: String,
        value: Option<Value>,
    },

    SetVersion { version: Option<VersionToken> },

    /// Apply in order; all or nothing
    Batch(Vec<ModelPatch>),
}

impl ModelPatch {
    /// Debug name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ModelPatch::InsertSpan { .. } => "InsertSpan",
            ModelPatch::RemoveSpan { .. } => "RemoveSpan",
            ModelPatch::SetSpanValue { .. } => "SetSpanValue",
            ModelPatch::SetSpanMetadata { .. } => "SetSpanMetadata",
            ModelPatch::SetSpanTokens { .. } => "SetSpanTokens",
            ModelPatch::InsertRelation { .. } => "InsertRelation",
            ModelPatch::RemoveRelation { .. } => "RemoveRelation",
            ModelPatch::SetRelationValue { .. } => "SetRelationValue",
            ModelPatch::InsertToken { .. } => "InsertToken",
            ModelPatch::RemoveToken { .. } => "RemoveToken",
            ModelPatch::SetTokenExtent { .. } => "SetTokenExtent",
            ModelPatch::SetTokenMetadata { .. } => "SetTokenMetadata",
            ModelPatch::SetTextBody { .. } => "SetTextBody",
            ModelPatch::SetDocumentName { .. } => "SetDocumentName",
            ModelPatch::SetDocumentMetadata { .. } => "SetDocumentMetadata",
            ModelPatch::SetConfig { .. } => "SetConfig",
            ModelPatch::SetVersion { .. } => "SetVersion",
            ModelPatch::Batch(_) => "Batch",
        }
    }
}

impl EntityModel {
    /// Apply a patch and return the patch that undoes it
    pub fn apply(&mut self, patch: &ModelPatch) -> Result<ModelPatch, ModelError> {
        self.ensure_writable()?;
        self.apply_inner(patch)
    }

    fn apply_inner(&mut self, patch: &ModelPatch) -> Result<ModelPatch, ModelError> {
        match patch {
            ModelPatch::InsertSpan { span, index } => self.insert_span(span.clone(), *index),
            ModelPatch::RemoveSpan { span_id } => self.remove_span(span_id),
            ModelPatch::SetSpanValue { span_id, value } => {
                let old = self.apply_patch(&EntityPath::Span(span_id.clone()), |e| match e {
                    EntityMut::Span(span) => Some(std::mem::replace(&mut span.value, value.clone())),
                    _ => None,
                })?;
                Ok(ModelPatch::SetSpanValue {
                    span_id: span_id.clone(),
                    value: old.unwrap_or_default(),
                })
            }
            ModelPatch::SetSpanMetadata { span_id, metadata } => {
                let old = self.apply_patch(&EntityPath::Span(span_id.clone()), |e| match e {
                    EntityMut::Span(span) => Some(std::mem::replace(&mut span.metadata, metadata.clone())),
                    _ => None,
                })?;
                Ok(ModelPatch::SetSpanMetadata {
                    span_id: span_id.clone(),
                    metadata: old.unwrap_or_default(),
                })
            }
            ModelPatch::SetSpanTokens { span_id, tokens } => self.set_span_tokens(span_id, tokens),
            ModelPatch::InsertRelation { relation, index } => {
                self.insert_relation(relation.clone(), *index)
            }
            ModelPatch::RemoveRelation { relation_id } => {
                let (relation, index) = self.take_relation(relation_id)?;
                Ok(ModelPatch::InsertRelation {
                    relation,
                    index: Some(index),
                })
            }
            ModelPatch::SetRelationValue { relation_id, value } => {
                let old = self.apply_patch(&EntityPath::Relation(relation_id.clone()), |e| match e {
                    EntityMut::Relation(rel) => Some(std::mem::replace(&mut rel.value, value.clone())),
                    _ => None,
                })?;
                Ok(ModelPatch::SetRelationValue {
                    relation_id: relation_id.clone(),
                    value: old.unwrap_or_default(),
                })
            }
            ModelPatch::InsertToken { token, index } => self.insert_token(token.clone(), *index),
            ModelPatch::RemoveToken { token_id } => self.remove_token(token_id),
            ModelPatch::SetTokenExtent {
                token_id,
                begin,
                end,
                precedence,
            } => {
                if begin > end {
                    return Err(ModelError::Invariant(format!(
                        "token {} would end ({}) before it begins ({})",
                        token_id, end, begin
                    )));
                }
                let old = self.apply_patch(&EntityPath::Token(token_id.clone()), |e| match e {
                    EntityMut::Token(token) => {
                        let old = (token.begin, token.end, token.precedence);
                        token.begin = *begin;
                        token.end = *end;
                        token.precedence = *precedence;
                        Some(old)
                    }
                    _ => None,
                })?;
                let (begin, end, precedence) = old.unwrap_or((*begin, *end, *precedence));
                Ok(ModelPatch::SetTokenExtent {
                    token_id: token_id.clone(),
                    begin,
                    end,
                    precedence,
                })
            }
            ModelPatch::SetTokenMetadata { token_id, metadata } => {
                let old = self.apply_patch(&EntityPath::Token(token_id.clone()), |e| match e {
                    EntityMut::Token(token) => Some(std::mem::replace(&mut token.metadata, metadata.clone())),
                    _ => None,
                })?;
                Ok(ModelPatch::SetTokenMetadata {
                    token_id: token_id.clone(),
                    metadata: old.unwrap_or_default(),
                })
            }
            ModelPatch::SetTextBody { text_id, body } => {
                let old = self.apply_patch(&EntityPath::Text(text_id.clone()), |e| match e {
                    EntityMut::Text(text) => Some(std::mem::replace(&mut text.body, body.clone())),
                    _ => None,
                })?;
                Ok(ModelPatch::SetTextBody {
                    text_id: text_id.clone(),
                    body: old.unwrap_or_default(),
                })
            }
            ModelPatch::SetDocumentName { name } => {
                let old = self.apply_patch(&EntityPath::Document, |e| match e {
                    EntityMut::Document(doc) => Some(std::mem::replace(&mut doc.name, name.clone())),
                    _ => None,
                })?;
                Ok(ModelPatch::SetDocumentName {
                    name: old.unwrap_or_default(),
                })
            }
            ModelPatch::SetDocumentMetadata { metadata } => {
                let old = self.apply_patch(&EntityPath::Document, |e| match e {
                    EntityMut::Document(doc) => Some(std::mem::replace(&mut doc.metadata, metadata.clone())),
                    _ => None,
                })?;
                Ok(ModelPatch::SetDocumentMetadata {
                    metadata: old.unwrap_or_default(),
                })
            }
            ModelPatch::SetConfig {
                layer,
                namespace,
                key,
                value,
            } => {
                let old = self.apply_patch(&layer.path(), |e| {
                    let config = match e {
                        EntityMut::TextLayer(l) => &mut l.config,
                        EntityMut::TokenLayer(l) => &mut l.config,
                        EntityMut::SpanLayer(l) => &mut l.config,
                        EntityMut::RelationLayer(l) => &mut l.config,
                        _ => return None,
                    };
                    match value {
                        Some(v) => config
                            .entry(namespace.clone())
                            .or_default()
                            .insert(key.clone(), v.clone()),
                        None => {
                            let entries = config.get_mut(namespace)?;
                            let old = entries.remove(key);
                            if entries.is_empty() {
                                config.remove(namespace);
                            }
                            old
                        }
                    }
                })?;
                Ok(ModelPatch::SetConfig {
                    layer: layer.clone(),
                    namespace: namespace.clone(),
                    key: key.clone(),
                    value: old,
                })
            }
            ModelPatch::SetVersion { version } => {
                let old = self.apply_patch(&EntityPath::Document, |e| match e {
                    EntityMut::Document(doc) => std::mem::replace(&mut doc.version, version.clone()),
                    _ => None,
                })?;
                Ok(ModelPatch::SetVersion { version: old })
            }
            ModelPatch::Batch(steps) => self.apply_sequence(steps),
        }
    }

    /// Apply steps in order, undoing the applied prefix if one fails
    fn apply_sequence(&mut self, steps: &[ModelPatch]) -> Result<ModelPatch, ModelError> {
        let mut inverses = Vec::with_capacity(steps.len());
        for step in steps {
            match self.apply_inner(step) {
                Ok(inverse) => inverses.push(inverse),
                Err(e) => {
                    for inverse in inverses.iter().rev() {
                        if let Err(undo_err) = self.apply_inner(inverse) {
                            tracing::error!("Failed to undo {} after error: {}", inverse.name(), undo_err);
                        }
                    }
                    return Err(e);
                }
            }
        }
        inverses.reverse();
        Ok(ModelPatch::Batch(inverses))
    }

    fn insert_span(&mut self, span: Span, index: Option<usize>) -> Result<ModelPatch, ModelError> {
        if self.spans.contains_key(&span.id) {
            return Err(ModelError::DuplicateId(span.id));
        }
        let layer = self
            .span_layers
            .get(&span.span_layer_id)
            .ok_or_else(|| ModelError::not_found("Span layer", &span.span_layer_id))?;

        for token_id in span.token_refs() {
            let token = self
                .tokens
                .get(token_id)
                .ok_or_else(|| ModelError::not_found("Token", token_id))?;
            if token.token_layer_id != layer.token_layer_id {
                return Err(ModelError::Invariant(format!(
                    "token {} is not in token layer {} of span layer {}",
                    token_id, layer.token_layer_id, layer.id
                )));
            }
        }

        if self.roles.is_single_valued(&layer.name) {
            for token_id in span.token_refs() {
                if !self.spans_covering(&layer.id, token_id).is_empty() {
                    return Err(ModelError::Invariant(format!(
                        "layer {} already has a span on token {}",
                        layer.name, token_id
                    )));
                }
            }
        }

        let span_id = span.id.clone();
        if let Some(layer) = self.span_layers.get_mut(&span.span_layer_id) {
            insert_at(&mut layer.span_ids, span_id.clone(), index);
        }
        self.spans.insert(span_id.clone(), span);
        self.bump_revision();

        Ok(ModelPatch::RemoveSpan { span_id })
    }

    fn remove_span(&mut self, span_id: &str) -> Result<ModelPatch, ModelError> {
        if !self.spans.contains_key(span_id) {
            return Err(ModelError::not_found("Span", span_id));
        }

        let touching: Vec<Id> = self
            .relations
            .values()
            .filter(|r| r.source == span_id || r.target == span_id)
            .map(|r| r.id.clone())
            .collect();

        let mut inverses = Vec::with_capacity(touching.len() + 1);
        for relation_id in touching {
            let (relation, index) = self.take_relation(&relation_id)?;
            inverses.push(ModelPatch::InsertRelation {
                relation,
                index: Some(index),
            });
        }

        let span = self
            .spans
            .remove(span_id)
            .ok_or_else(|| ModelError::not_found("Span", span_id))?;
        let index = self
            .span_layers
            .get_mut(&span.span_layer_id)
            .and_then(|layer| remove_id(&mut layer.span_ids, span_id))
            .unwrap_or(0);
        self.bump_revision();

        inverses.push(ModelPatch::InsertSpan {
            span,
            index: Some(index),
        });
        inverses.reverse();
        Ok(ModelPatch::Batch(inverses))
    }

    fn set_span_tokens(&mut self, span_id: &str, tokens: &[Id]) -> Result<ModelPatch, ModelError> {
        let span = self
            .spans
            .get(span_id)
            .ok_or_else(|| ModelError::not_found("Span", span_id))?;
        let token_layer_id = self
            .span_layers
            .get(&span.span_layer_id)
            .map(|l| l.token_layer_id.clone())
            .ok_or_else(|| ModelError::not_found("Span layer", &span.span_layer_id))?;

        for token_id in tokens {
            match self.tokens.get(token_id) {
                Some(t) if t.token_layer_id == token_layer_id => {}
                Some(_) => {
                    return Err(ModelError::Invariant(format!(
                        "token {} is not in token layer {}",
                        token_id, token_layer_id
                    )))
                }
                None => return Err(ModelError::not_found("Token", token_id)),
            }
        }

        let old = self.apply_patch(&EntityPath::Span(span_id.to_string()), |e| match e {
            EntityMut::Span(span) => Some(std::mem::replace(&mut span.tokens, tokens.to_vec())),
            _ => None,
        })?;
        Ok(ModelPatch::SetSpanTokens {
            span_id: span_id.to_string(),
            tokens: old.unwrap_or_default(),
        })
    }

    fn insert_relation(&mut self, relation: Relation, index: Option<usize>) -> Result<ModelPatch, ModelError> {
        if self.relations.contains_key(&relation.id) {
            return Err(ModelError::DuplicateId(relation.id));
        }
        let layer = self
            .relation_layers
            .get(&relation.relation_layer_id)
            .ok_or_else(|| ModelError::not_found("Relation layer", &relation.relation_layer_id))?;

        for endpoint in [&relation.source, &relation.target] {
            let span = self
                .spans
                .get(endpoint)
                .ok_or_else(|| ModelError::not_found("Span", endpoint))?;
            if span.span_layer_id != layer.span_layer_id {
                return Err(ModelError::Invariant(format!(
                    "span {} is not in span layer {} of relation layer {}",
                    endpoint, layer.span_layer_id, layer.id
                )));
            }
        }

        let relation_id = relation.id.clone();
        if let Some(layer) = self.relation_layers.get_mut(&relation.relation_layer_id) {
            insert_at(&mut layer.relation_ids, relation_id.clone(), index);
        }
        self.relations.insert(relation_id.clone(), relation);
        self.bump_revision();

        Ok(ModelPatch::RemoveRelation { relation_id })
    }

    fn take_relation(&mut self, relation_id: &str) -> Result<(Relation, usize), ModelError> {
        let relation = self
            .relations
            .remove(relation_id)
            .ok_or_else(|| ModelError::not_found("Relation", relation_id))?;
        let index = self
            .relation_layers
            .get_mut(&relation.relation_layer_id)
            .and_then(|layer| remove_id(&mut layer.relation_ids, relation_id))
            .unwrap_or(0);
        self.bump_revision();
        Ok((relation, index))
    }

    fn insert_token(&mut self, token: Token, index: Option<usize>) -> Result<ModelPatch, ModelError> {
        if self.tokens.contains_key(&token.id) {
            return Err(ModelError::DuplicateId(token.id));
        }
        if token.begin > token.end {
            return Err(ModelError::Invariant(format!(
                "token {} ends ({}) before it begins ({})",
                token.id, token.end, token.begin
            )));
        }
        if !self.token_layers.contains_key(&token.token_layer_id) {
            return Err(ModelError::not_found("Token layer", &token.token_layer_id));
        }
        if let Some(text) = self.text_for_token_layer(&token.token_layer_id) {
            if token.end > text.char_len() {
                return Err(ModelError::Invariant(format!(
                    "token {} ends at {} past the text ({} characters)",
                    token.id,
                    token.end,
                    text.char_len()
                )));
            }
        }

        let token_id = token.id.clone();
        if let Some(layer) = self.token_layers.get_mut(&token.token_layer_id) {
            insert_at(&mut layer.token_ids, token_id.clone(), index);
        }
        self.tokens.insert(token_id.clone(), token);
        self.bump_revision();

        Ok(ModelPatch::RemoveToken { token_id })
    }

    fn remove_token(&mut self, token_id: &str) -> Result<ModelPatch, ModelError> {
        let token_layer_id = self
            .tokens
            .get(token_id)
            .map(|t| t.token_layer_id.clone())
            .ok_or_else(|| ModelError::not_found("Token", token_id))?;

        let mut steps = Vec::new();
        for layer in self.span_layers_of(&token_layer_id) {
            for span in self.spans_covering(&layer.id, token_id) {
                let remaining: Vec<Id> = span
                    .tokens
                    .iter()
                    .filter(|t| t.as_str() != token_id)
                    .cloned()
                    .collect();
                if remaining.is_empty() {
                    steps.push(ModelPatch::RemoveSpan {
                        span_id: span.id.clone(),
                    });
                } else {
                    steps.push(ModelPatch::SetSpanTokens {
                        span_id: span.id.clone(),
                        tokens: remaining,
                    });
                }
            }
        }

        let ModelPatch::Batch(mut inverses) = self.apply_sequence(&steps)? else {
            return Err(ModelError::Invariant("cascade did not produce a batch".to_string()));
        };

        let token = self
            .tokens
            .remove(token_id)
            .ok_or_else(|| ModelError::not_found("Token", token_id))?;
        let index = self
            .token_layers
            .get_mut(&token.token_layer_id)
            .and_then(|layer| remove_id(&mut layer.token_ids, token_id))
            .unwrap_or(0);
        self.bump_revision();

        inverses.insert(
            0,
            ModelPatch::InsertToken {
                token,
                index: Some(index),
            },
        );
        Ok(ModelPatch::Batch(inverses))
    }
}

fn insert_at(ids: &mut Vec<Id>, id: Id, index: Option<usize>) {
    match index {
        Some(i) if i <= ids.len() => ids.insert(i, id),
        _ => ids.push(id),
    }
}

fn remove_id(ids: &mut Vec<Id>, id: &str) -> Option<usize> {
    let pos = ids.iter().position(|x| x == id)?;
    ids.remove(pos);
    Some(pos)
}
