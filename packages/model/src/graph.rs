//! # Entity Model
//!
//! Flat, id-keyed storage of one document's layer hierarchy.
//!
//! A document owns text layers, each text layer owns one text and a list of
//! token layers, each token layer owns tokens and span layers, and each span
//! layer owns spans and at most one relation layer of relations. Children are
//! kept as ordered id lists on their parent record, so an edit touches only
//! the records it changes.
//!
//! ## Editing
//!
//! - [`EntityModel::load`] replaces the whole graph
//! - [`EntityModel::apply_patch`] mutates the fields of exactly one record
//! - [`EntityModel::apply`] performs a [`ModelPatch`] (inserts, removals,
//!   field updates) and returns its inverse
//!
//! Nothing else writes to the graph.

use std::collections::HashMap;

use plaid_common::Id;

use crate::entities::{
    DocumentRecord, Relation, RelationLayer, Span, SpanLayer, Text, TextLayer, Token, TokenLayer,
};
use crate::errors::ModelError;
use crate::payload::{
    DocumentPayload, RelationLayerPayload, RelationPayload, SpanLayerPayload, SpanPayload,
    TextLayerPayload, TextPayload, TokenLayerPayload, TokenPayload,
};
use crate::roles::LayerRoles;

/// Address of a single record in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityPath {
    Document,
    TextLayer(Id),
    Text(Id),
    TokenLayer(Id),
    Token(Id),
    SpanLayer(Id),
    Span(Id),
    RelationLayer(Id),
    Relation(Id),
}

/// Exclusive handle to the record an [`EntityPath`] resolved to
#[derive(Debug)]
pub enum EntityMut<'a> {
    Document(&'a mut DocumentRecord),
    TextLayer(&'a mut TextLayer),
    Text(&'a mut Text),
    TokenLayer(&'a mut TokenLayer),
    Token(&'a mut Token),
    SpanLayer(&'a mut SpanLayer),
    Span(&'a mut Span),
    RelationLayer(&'a mut RelationLayer),
    Relation(&'a mut Relation),
}

/// Current known-good snapshot of one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityModel {
    pub(crate) document: Option<DocumentRecord>,
    pub(crate) text_layers: HashMap<Id, TextLayer>,
    pub(crate) texts: HashMap<Id, Text>,
    pub(crate) token_layers: HashMap<Id, TokenLayer>,
    pub(crate) tokens: HashMap<Id, Token>,
    pub(crate) span_layers: HashMap<Id, SpanLayer>,
    pub(crate) spans: HashMap<Id, Span>,
    pub(crate) relation_layers: HashMap<Id, RelationLayer>,
    pub(crate) relations: HashMap<Id, Relation>,
    pub(crate) roles: LayerRoles,
    read_only: bool,
    revision: u64,
}

impl EntityModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: LayerRoles) -> Self {
        Self {
            roles,
            ..Self::default()
        }
    }

    /// Build a model directly from a fetched document
    pub fn from_payload(payload: DocumentPayload) -> Self {
        let mut model = Self::new();
        model.load(payload);
        model
    }

    /// Replace the whole graph with a freshly fetched document
    pub fn load(&mut self, payload: DocumentPayload) {
        let roles = std::mem::take(&mut self.roles);
        let revision = self.revision + 1;
        *self = Self {
            roles,
            revision,
            ..Self::default()
        };

        let DocumentPayload {
            id,
            name,
            project,
            version,
            metadata,
            text_layers,
        } = payload;

        let mut text_layer_ids = Vec::with_capacity(text_layers.len());
        for layer in text_layers {
            if self.text_layers.contains_key(&layer.id) {
                tracing::warn!("Skipping duplicate text layer {}", layer.id);
                continue;
            }
            text_layer_ids.push(layer.id.clone());
            self.load_text_layer(layer);
        }

        tracing::debug!(
            "Loaded document {} ({} tokens, {} spans, {} relations)",
            id,
            self.tokens.len(),
            self.spans.len(),
            self.relations.len()
        );

        self.document = Some(DocumentRecord {
            id,
            name,
            project_id: project,
            metadata,
            version,
            text_layer_ids,
        });
    }

    /// Load a historical snapshot. Every later edit is refused.
    pub fn load_read_only(&mut self, payload: DocumentPayload) {
        self.load(payload);
        self.read_only = true;
    }

    /// Drop everything, keeping only the layer roles
    pub fn clear(&mut self) {
        let roles = std::mem::take(&mut self.roles);
        let revision = self.revision + 1;
        *self = Self {
            roles,
            revision,
            ..Self::default()
        };
    }

    fn load_text_layer(&mut self, layer: TextLayerPayload) {
        let TextLayerPayload {
            id,
            name,
            config,
            text,
            token_layers,
        } = layer;

        let text_id = text.map(|TextPayload { id: text_id, body, metadata }| {
            self.texts.insert(
                text_id.clone(),
                Text {
                    id: text_id.clone(),
                    text_layer_id: id.clone(),
                    body,
                    metadata,
                },
            );
            text_id
        });

        let mut token_layer_ids = Vec::with_capacity(token_layers.len());
        for token_layer in token_layers {
            if self.token_layers.contains_key(&token_layer.id) {
                tracing::warn!("Skipping duplicate token layer {}", token_layer.id);
                continue;
            }
            token_layer_ids.push(token_layer.id.clone());
            self.load_token_layer(&id, token_layer);
        }

        self.text_layers.insert(
            id.clone(),
            TextLayer {
                id,
                name,
                config,
                text_id,
                token_layer_ids,
            },
        );
    }

    fn load_token_layer(&mut self, text_layer_id: &str, layer: TokenLayerPayload) {
        let TokenLayerPayload {
            id,
            name,
            config,
            tokens,
            span_layers,
        } = layer;

        let mut token_ids = Vec::with_capacity(tokens.len());
        for TokenPayload { id: token_id, begin, end, precedence, metadata } in tokens {
            if self.tokens.contains_key(&token_id) {
                tracing::warn!("Skipping duplicate token {}", token_id);
                continue;
            }
            token_ids.push(token_id.clone());
            self.tokens.insert(
                token_id.clone(),
                Token {
                    id: token_id,
                    token_layer_id: id.clone(),
                    begin,
                    end,
                    precedence,
                    metadata,
                },
            );
        }

        let mut span_layer_ids = Vec::with_capacity(span_layers.len());
        for span_layer in span_layers {
            if self.span_layers.contains_key(&span_layer.id) {
                tracing::warn!("Skipping duplicate span layer {}", span_layer.id);
                continue;
            }
            span_layer_ids.push(span_layer.id.clone());
            self.load_span_layer(&id, span_layer);
        }

        self.token_layers.insert(
            id.clone(),
            TokenLayer {
                id,
                name,
                config,
                text_layer_id: text_layer_id.to_string(),
                token_ids,
                span_layer_ids,
            },
        );
    }

    fn load_span_layer(&mut self, token_layer_id: &str, layer: SpanLayerPayload) {
        let SpanLayerPayload {
            id,
            name,
            config,
            spans,
            relation_layers,
        } = layer;

        let mut span_ids = Vec::with_capacity(spans.len());
        for SpanPayload { id: span_id, tokens, begin, value, metadata } in spans {
            if self.spans.contains_key(&span_id) {
                tracing::warn!("Skipping duplicate span {}", span_id);
                continue;
            }
            span_ids.push(span_id.clone());
            self.spans.insert(
                span_id.clone(),
                Span {
                    id: span_id,
                    span_layer_id: id.clone(),
                    tokens: tokens.unwrap_or_default(),
                    legacy_begin: begin,
                    value,
                    metadata,
                },
            );
        }

        let mut relation_layers = relation_layers.into_iter();
        let relation_layer_id = relation_layers.next().map(|relation_layer| {
            let relation_layer_id = relation_layer.id.clone();
            self.load_relation_layer(&id, relation_layer);
            relation_layer_id
        });
        for extra in relation_layers {
            tracing::warn!(
                "Span layer {} has more than one relation layer, ignoring {}",
                id,
                extra.id
            );
        }

        self.span_layers.insert(
            id.clone(),
            SpanLayer {
                id,
                name,
                config,
                token_layer_id: token_layer_id.to_string(),
                span_ids,
                relation_layer_id,
            },
        );
    }

    fn load_relation_layer(&mut self, span_layer_id: &str, layer: RelationLayerPayload) {
        let RelationLayerPayload {
            id,
            name,
            config,
            relations,
        } = layer;

        let mut relation_ids = Vec::with_capacity(relations.len());
        for RelationPayload { id: relation_id, source, target, value, metadata } in relations {
            if self.relations.contains_key(&relation_id) {
                tracing::warn!("Skipping duplicate relation {}", relation_id);
                continue;
            }
            relation_ids.push(relation_id.clone());
            self.relations.insert(
                relation_id.clone(),
                Relation {
                    id: relation_id,
                    relation_layer_id: id.clone(),
                    source,
                    target,
                    value,
                    metadata,
                },
            );
        }

        self.relation_layers.insert(
            id.clone(),
            RelationLayer {
                id,
                name,
                config,
                span_layer_id: span_layer_id.to_string(),
                relation_ids,
            },
        );
    }

    /// Rebuild the nested wire shape from the arena
    pub fn to_payload(&self) -> Option<DocumentPayload> {
        let doc = self.document.as_ref()?;

        let text_layers = self
            .text_layers()
            .into_iter()
            .map(|layer| TextLayerPayload {
                id: layer.id.clone(),
                name: layer.name.clone(),
                config: layer.config.clone(),
                text: self.text_of(layer).map(|t| TextPayload {
                    id: t.id.clone(),
                    body: t.body.clone(),
                    metadata: t.metadata.clone(),
                }),
                token_layers: self
                    .token_layers_of(&layer.id)
                    .into_iter()
                    .map(|tl| self.token_layer_payload(tl))
                    .collect(),
            })
            .collect();

        Some(DocumentPayload {
            id: doc.id.clone(),
            name: doc.name.clone(),
            project: doc.project_id.clone(),
            version: doc.version.clone(),
            metadata: doc.metadata.clone(),
            text_layers,
        })
    }

    fn token_layer_payload(&self, layer: &TokenLayer) -> TokenLayerPayload {
        TokenLayerPayload {
            id: layer.id.clone(),
            name: layer.name.clone(),
            config: layer.config.clone(),
            tokens: self
                .tokens_of(&layer.id)
                .into_iter()
                .map(|t| TokenPayload {
                    id: t.id.clone(),
                    begin: t.begin,
                    end: t.end,
                    precedence: t.precedence,
                    metadata: t.metadata.clone(),
                })
                .collect(),
            span_layers: self
                .span_layers_of(&layer.id)
                .into_iter()
                .map(|sl| SpanLayerPayload {
                    id: sl.id.clone(),
                    name: sl.name.clone(),
                    config: sl.config.clone(),
                    spans: self
                        .spans_of(&sl.id)
                        .into_iter()
                        .map(|s| SpanPayload {
                            id: s.id.clone(),
                            tokens: if s.tokens.is_empty() && s.legacy_begin.is_some() {
                                None
                            } else {
                                Some(s.tokens.clone())
                            },
                            begin: s.legacy_begin.clone(),
                            value: s.value.clone(),
                            metadata: s.metadata.clone(),
                        })
                        .collect(),
                    relation_layers: self
                        .relation_layer_of(&sl.id)
                        .map(|rl| RelationLayerPayload {
                            id: rl.id.clone(),
                            name: rl.name.clone(),
                            config: rl.config.clone(),
                            relations: self
                                .relations_of(&rl.id)
                                .into_iter()
                                .map(|r| RelationPayload {
                                    id: r.id.clone(),
                                    source: r.source.clone(),
                                    target: r.target.clone(),
                                    value: r.value.clone(),
                                    metadata: r.metadata.clone(),
                                })
                                .collect(),
                        })
                        .into_iter()
                        .collect(),
                })
                .collect(),
        }
    }

    /// Mutate the fields of exactly one record, in place.
    ///
    /// The mutator sees only the addressed record. Ids and parent/child links
    /// are not reachable from it; structural edits go through
    /// [`EntityModel::apply`].
    pub fn apply_patch<R>(
        &mut self,
        path: &EntityPath,
        mutator: impl FnOnce(EntityMut<'_>) -> R,
    ) -> Result<R, ModelError> {
        self.ensure_writable()?;

        let target = match path {
            EntityPath::Document => self
                .document
                .as_mut()
                .map(EntityMut::Document)
                .ok_or(ModelError::NotLoaded)?,
            EntityPath::TextLayer(id) => self
                .text_layers
                .get_mut(id)
                .map(EntityMut::TextLayer)
                .ok_or_else(|| ModelError::not_found("Text layer", id))?,
            EntityPath::Text(id) => self
                .texts
                .get_mut(id)
                .map(EntityMut::Text)
                .ok_or_else(|| ModelError::not_found("Text", id))?,
            EntityPath::TokenLayer(id) => self
                .token_layers
                .get_mut(id)
                .map(EntityMut::TokenLayer)
                .ok_or_else(|| ModelError::not_found("Token layer", id))?,
            EntityPath::Token(id) => self
                .tokens
                .get_mut(id)
                .map(EntityMut::Token)
                .ok_or_else(|| ModelError::not_found("Token", id))?,
            EntityPath::SpanLayer(id) => self
                .span_layers
                .get_mut(id)
                .map(EntityMut::SpanLayer)
                .ok_or_else(|| ModelError::not_found("Span layer", id))?,
            EntityPath::Span(id) => self
                .spans
                .get_mut(id)
                .map(EntityMut::Span)
                .ok_or_else(|| ModelError::not_found("Span", id))?,
            EntityPath::RelationLayer(id) => self
                .relation_layers
                .get_mut(id)
                .map(EntityMut::RelationLayer)
                .ok_or_else(|| ModelError::not_found("Relation layer", id))?,
            EntityPath::Relation(id) => self
                .relations
                .get_mut(id)
                .map(EntityMut::Relation)
                .ok_or_else(|| ModelError::not_found("Relation", id))?,
        };

        let out = mutator(target);
        self.bump_revision();
        Ok(out)
    }

    pub(crate) fn ensure_writable(&self) -> Result<(), ModelError> {
        if self.document.is_none() {
            return Err(ModelError::NotLoaded);
        }
        if self.read_only {
            return Err(ModelError::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn is_loaded(&self) -> bool {
        self.document.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Changes whenever the graph changes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn roles(&self) -> &LayerRoles {
        &self.roles
    }

    pub fn set_roles(&mut self, roles: LayerRoles) {
        self.roles = roles;
    }

    pub fn document(&self) -> Option<&DocumentRecord> {
        self.document.as_ref()
    }

    pub fn version(&self) -> Option<&str> {
        self.document.as_ref().and_then(|d| d.version.as_deref())
    }

    pub fn text_layer(&self, id: &str) -> Option<&TextLayer> {
        self.text_layers.get(id)
    }

    pub fn text(&self, id: &str) -> Option<&Text> {
        self.texts.get(id)
    }

    pub fn token_layer(&self, id: &str) -> Option<&TokenLayer> {
        self.token_layers.get(id)
    }

    pub fn token(&self, id: &str) -> Option<&Token> {
        self.tokens.get(id)
    }

    pub fn span_layer(&self, id: &str) -> Option<&SpanLayer> {
        self.span_layers.get(id)
    }

    pub fn span(&self, id: &str) -> Option<&Span> {
        self.spans.get(id)
    }

    pub fn relation_layer(&self, id: &str) -> Option<&RelationLayer> {
        self.relation_layers.get(id)
    }

    pub fn relation(&self, id: &str) -> Option<&Relation> {
        self.relations.get(id)
    }

    /// Text layers in document order
    pub fn text_layers(&self) -> Vec<&TextLayer> {
        self.document
            .as_ref()
            .map(|d| {
                d.text_layer_ids
                    .iter()
                    .filter_map(|id| self.text_layers.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn text_of(&self, layer: &TextLayer) -> Option<&Text> {
        layer.text_id.as_deref().and_then(|id| self.texts.get(id))
    }

    pub fn token_layers_of(&self, text_layer_id: &str) -> Vec<&TokenLayer> {
        self.text_layers
            .get(text_layer_id)
            .map(|l| {
                l.token_layer_ids
                    .iter()
                    .filter_map(|id| self.token_layers.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tokens of a layer in stored order
    pub fn tokens_of(&self, token_layer_id: &str) -> Vec<&Token> {
        self.token_layers
            .get(token_layer_id)
            .map(|l| l.token_ids.iter().filter_map(|id| self.tokens.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn span_layers_of(&self, token_layer_id: &str) -> Vec<&SpanLayer> {
        self.token_layers
            .get(token_layer_id)
            .map(|l| {
                l.span_layer_ids
                    .iter()
                    .filter_map(|id| self.span_layers.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn span_layer_named(&self, token_layer_id: &str, name: &str) -> Option<&SpanLayer> {
        self.span_layers_of(token_layer_id)
            .into_iter()
            .find(|l| l.name == name)
    }

    pub fn spans_of(&self, span_layer_id: &str) -> Vec<&Span> {
        self.span_layers
            .get(span_layer_id)
            .map(|l| l.span_ids.iter().filter_map(|id| self.spans.get(id)).collect())
            .unwrap_or_default()
    }

    /// Spans of a layer whose extent includes the token, in layer order
    pub fn spans_covering(&self, span_layer_id: &str, token_id: &str) -> Vec<&Span> {
        self.spans_of(span_layer_id)
            .into_iter()
            .filter(|s| s.covers(token_id))
            .collect()
    }

    pub fn relation_layer_of(&self, span_layer_id: &str) -> Option<&RelationLayer> {
        self.span_layers
            .get(span_layer_id)
            .and_then(|l| l.relation_layer_id.as_deref())
            .and_then(|id| self.relation_layers.get(id))
    }

    pub fn relations_of(&self, relation_layer_id: &str) -> Vec<&Relation> {
        self.relation_layers
            .get(relation_layer_id)
            .map(|l| {
                l.relation_ids
                    .iter()
                    .filter_map(|id| self.relations.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Relations of a layer pointing at `target_span_id`
    pub fn incoming_relations(&self, relation_layer_id: &str, target_span_id: &str) -> Vec<&Relation> {
        self.relations_of(relation_layer_id)
            .into_iter()
            .filter(|r| r.target == target_span_id)
            .collect()
    }

    /// First token layer of the first text layer
    pub fn primary_token_layer(&self) -> Option<&TokenLayer> {
        self.text_layers()
            .first()
            .and_then(|tl| self.token_layers_of(&tl.id).into_iter().next())
    }

    /// Text a token layer's offsets point into
    pub fn text_for_token_layer(&self, token_layer_id: &str) -> Option<&Text> {
        self.token_layers
            .get(token_layer_id)
            .and_then(|l| self.text_layers.get(&l.text_layer_id))
            .and_then(|tl| self.text_of(tl))
    }

    /// Sibling tokens sharing the token's extent, ordered by precedence
    /// (ties keep stored order)
    pub fn tokens_sharing_extent(&self, token_id: &str) -> Vec<&Token> {
        let Some(token) = self.tokens.get(token_id) else {
            return Vec::new();
        };
        let mut siblings: Vec<&Token> = self
            .tokens_of(&token.token_layer_id)
            .into_iter()
            .filter(|t| t.begin == token.begin && t.end == token.end)
            .collect();
        siblings.sort_by_key(|t| t.precedence.unwrap_or(0));
        siblings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DocumentPayload {
        serde_json::from_value(json!({
            "id": "d1",
            "name": "Doc",
            "version": "v1",
            "textLayers": [{
                "id": "tl1",
                "text": { "id": "t1", "body": "ab cd" },
                "tokenLayers": [{
                    "id": "kl1",
                    "tokens": [
                        { "id": "k1", "begin": 0, "end": 2 },
                        { "id": "k2", "begin": 3, "end": 5 }
                    ],
                    "spanLayers": [{
                        "id": "sl1",
                        "name": "Lemma",
                        "spans": [{ "id": "s1", "tokens": ["k1"], "value": "ab" }],
                        "relationLayers": [
                            { "id": "rl1", "relations": [] },
                            { "id": "rl2", "relations": [] }
                        ]
                    }]
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_load_flattens_hierarchy() {
        let model = EntityModel::from_payload(sample());
        assert!(model.is_loaded());
        assert_eq!(model.version(), Some("v1"));
        assert_eq!(model.tokens_of("kl1").len(), 2);
        assert_eq!(model.span("s1").unwrap().span_layer_id(), "sl1");
        assert_eq!(model.token("k2").unwrap().token_layer_id(), "kl1");
        assert_eq!(model.primary_token_layer().unwrap().id(), "kl1");
        assert_eq!(model.text_for_token_layer("kl1").unwrap().body, "ab cd");
    }

    #[test]
    fn test_only_first_relation_layer_is_kept() {
        let model = EntityModel::from_payload(sample());
        assert_eq!(model.relation_layer_of("sl1").unwrap().id(), "rl1");
        assert!(model.relation_layer("rl2").is_none());
    }

    #[test]
    fn test_reload_replaces_graph() {
        let mut model = EntityModel::from_payload(sample());
        let mut next = sample();
        next.text_layers[0].token_layers[0].tokens.pop();
        next.version = Some("v2".into());
        model.load(next);
        assert!(model.token("k2").is_none());
        assert_eq!(model.version(), Some("v2"));
    }

    #[test]
    fn test_apply_patch_mutates_one_record() {
        let mut model = EntityModel::from_payload(sample());
        let before = model.revision();

        let old = model
            .apply_patch(&EntityPath::Span("s1".into()), |entity| match entity {
                EntityMut::Span(span) => std::mem::replace(&mut span.value, json!("AB")),
                _ => unreachable!(),
            })
            .unwrap();

        assert_eq!(old, json!("ab"));
        assert_eq!(model.span("s1").unwrap().value, json!("AB"));
        assert!(model.revision() > before);
    }

    #[test]
    fn test_apply_patch_unknown_path() {
        let mut model = EntityModel::from_payload(sample());
        let err = model
            .apply_patch(&EntityPath::Token("nope".into()), |_| ())
            .unwrap_err();
        assert_eq!(err, ModelError::not_found("Token", "nope"));
    }

    #[test]
    fn test_read_only_snapshot_refuses_patches() {
        let mut model = EntityModel::new();
        model.load_read_only(sample());
        let err = model.apply_patch(&EntityPath::Document, |_| ()).unwrap_err();
        assert_eq!(err, ModelError::ReadOnly);
    }

    #[test]
    fn test_payload_round_trip_preserves_order() {
        let model = EntityModel::from_payload(sample());
        let payload = model.to_payload().unwrap();
        let ids: Vec<_> = payload.text_layers[0].token_layers[0]
            .tokens
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["k1", "k2"]);
        assert_eq!(EntityModel::from_payload(payload).to_payload(), model.to_payload());
    }

    #[test]
    fn test_clear_keeps_roles() {
        let mut model = EntityModel::with_roles(LayerRoles {
            relation_anchor: "Word".into(),
            ..LayerRoles::default()
        });
        model.load(sample());
        model.clear();
        assert!(!model.is_loaded());
        assert_eq!(model.roles().relation_anchor, "Word");
    }
}
