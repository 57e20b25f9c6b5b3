//! # Derived Views
//!
//! Read-only projection of the entity graph into sentences of tokens, each
//! token carrying its annotations, each sentence carrying its relations.
//!
//! ## Algorithm
//!
//! 1. Take the first text layer, its text, and its first token layer
//! 2. Sort tokens by `begin` (stable, ties keep stored order; precedence is
//!    not consulted here)
//! 3. A token starts a sentence when it is the first token of a span in the
//!    sentence layer (or that span's legacy `begin`)
//! 4. Cut the sorted tokens at every sentence start
//! 5. Resolve each token's annotations: one span per single-valued layer, a
//!    list per multi-valued layer
//! 6. Attach to each sentence the relations whose source is one of its
//!    anchor spans
//!
//! A graph with no text or no tokens projects to an empty list.

use std::collections::{BTreeMap, HashMap, HashSet};

use plaid_common::{Id, Metadata};
use plaid_model::{EntityModel, Relation, Span, Token};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanView {
    pub id: Id,
    pub value: Value,
    pub metadata: Metadata,
}

impl From<&Span> for SpanView {
    fn from(span: &Span) -> Self {
        Self {
            id: span.id().to_string(),
            value: span.value.clone(),
            metadata: span.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenView {
    pub id: Id,
    pub form: String,
    pub begin: usize,
    pub end: usize,
    pub precedence: Option<i64>,
    pub metadata: Metadata,
    /// Layer name → the one span on this token, if any
    pub single: BTreeMap<String, Option<SpanView>>,
    /// Layer name → every span on this token, in layer order
    pub multi: BTreeMap<String, Vec<SpanView>>,
}

impl TokenView {
    pub fn single_value(&self, layer: &str) -> Option<&Value> {
        self.single.get(layer)?.as_ref().map(|s| &s.value)
    }

    pub fn multi_values(&self, layer: &str) -> Vec<&Value> {
        self.multi
            .get(layer)
            .map(|spans| spans.iter().map(|s| &s.value).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationView {
    pub id: Id,
    pub source: Id,
    pub target: Id,
    pub value: Value,
    /// First token of the source span
    pub source_token: Option<Id>,
    /// First token of the target span
    pub target_token: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceView {
    /// Sentence span that opened this group (none for an unmarked prefix)
    pub span_id: Option<Id>,
    pub tokens: Vec<TokenView>,
    pub relations: Vec<RelationView>,
}

impl SentenceView {
    /// Token forms joined with single spaces
    pub fn text(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.form.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Project the model into sentence views
pub fn build_sentences(model: &EntityModel) -> Vec<SentenceView> {
    let roles = model.roles();

    let Some(text_layer) = model.text_layers().into_iter().next() else {
        return Vec::new();
    };
    let Some(text) = model.text_of(text_layer) else {
        return Vec::new();
    };
    let Some(token_layer) = model.token_layers_of(text_layer.id()).into_iter().next() else {
        return Vec::new();
    };

    let mut tokens = model.tokens_of(token_layer.id());
    if tokens.is_empty() {
        return Vec::new();
    }
    tokens.sort_by_key(|t| t.begin);

    let span_layers = model.span_layers_of(token_layer.id());

    // first token id → sentence span id
    let mut sentence_starts: HashMap<&str, &str> = HashMap::new();
    for layer in span_layers.iter().filter(|l| roles.is_sentence(&l.name)) {
        for span in model.spans_of(layer.id()) {
            if let Some(first) = span.first_token() {
                sentence_starts.entry(first).or_insert(span.id());
            }
        }
    }

    let annotation_layers: Vec<(&str, bool, HashMap<&str, Vec<&Span>>)> = span_layers
        .iter()
        .filter(|l| !roles.is_sentence(&l.name))
        .map(|l| {
            (
                l.name.as_str(),
                roles.is_multi_valued(&l.name),
                index_by_token(model.spans_of(l.id())),
            )
        })
        .collect();

    let groups = partition(&tokens, |t| sentence_starts.contains_key(t.id()));

    let anchor = span_layers
        .iter()
        .find(|l| roles.is_relation_anchor(&l.name))
        .map(|l| {
            let spans = index_by_token(model.spans_of(l.id()));
            let relations = model
                .relation_layer_of(l.id())
                .map(|rl| model.relations_of(rl.id()))
                .unwrap_or_default();
            (spans, relations)
        });

    groups
        .into_iter()
        .map(|group| {
            let span_id = group
                .first()
                .and_then(|t| sentence_starts.get(t.id()))
                .map(|id| id.to_string());

            let relations = match &anchor {
                Some((anchor_spans, relations)) => {
                    sentence_relations(model, &group, anchor_spans, relations)
                }
                None => Vec::new(),
            };

            let tokens = group
                .iter()
                .map(|token| token_view(token, text_form(token, model), &annotation_layers))
                .collect();

            SentenceView {
                span_id,
                tokens,
                relations,
            }
        })
        .collect()
}

/// Split `tokens` before every token `is_start` accepts. Never yields an
/// empty group; with no starts the whole sequence is one group.
pub fn partition<'a, T>(tokens: &[&'a T], is_start: impl Fn(&T) -> bool) -> Vec<Vec<&'a T>> {
    let mut groups: Vec<Vec<&'a T>> = Vec::new();
    let mut current: Vec<&'a T> = Vec::new();

    for &token in tokens {
        if is_start(token) && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
        }
        current.push(token);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

fn text_form(token: &Token, model: &EntityModel) -> String {
    token.form(model.text_for_token_layer(token.token_layer_id()))
}

fn index_by_token<'a>(spans: Vec<&'a Span>) -> HashMap<&'a str, Vec<&'a Span>> {
    let mut index: HashMap<&str, Vec<&Span>> = HashMap::new();
    for span in spans {
        for token_id in span.token_refs() {
            index.entry(token_id).or_default().push(span);
        }
    }
    index
}

fn token_view(
    token: &Token,
    form: String,
    layers: &[(&str, bool, HashMap<&str, Vec<&Span>>)],
) -> TokenView {
    let mut single = BTreeMap::new();
    let mut multi = BTreeMap::new();

    for (name, is_multi, index) in layers {
        let spans = index.get(token.id()).map(Vec::as_slice).unwrap_or(&[]);
        if *is_multi {
            multi.insert(name.to_string(), spans.iter().map(|s| SpanView::from(*s)).collect());
        } else {
            single.insert(name.to_string(), spans.first().map(|s| SpanView::from(*s)));
        }
    }

    TokenView {
        id: token.id().to_string(),
        form,
        begin: token.begin,
        end: token.end,
        precedence: token.precedence,
        metadata: token.metadata.clone(),
        single,
        multi,
    }
}

fn sentence_relations(
    model: &EntityModel,
    group: &[&Token],
    anchor_spans: &HashMap<&str, Vec<&Span>>,
    relations: &[&Relation],
) -> Vec<RelationView> {
    let anchor_ids: HashSet<&str> = group
        .iter()
        .filter_map(|t| anchor_spans.get(t.id()).and_then(|spans| spans.first()))
        .map(|s| s.id())
        .collect();

    let first_token = |span_id: &str| {
        model
            .span(span_id)
            .and_then(|s| s.first_token())
            .map(str::to_string)
    };

    relations
        .iter()
        .filter(|r| anchor_ids.contains(r.source()))
        .map(|r| RelationView {
            id: r.id().to_string(),
            source: r.source().to_string(),
            target: r.target().to_string(),
            value: r.value.clone(),
            source_token: first_token(r.source()),
            target_token: first_token(r.target()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaid_model::DocumentPayload;
    use serde_json::json;

    fn model(doc: Value) -> EntityModel {
        let payload: DocumentPayload = serde_json::from_value(doc).unwrap();
        EntityModel::from_payload(payload)
    }

    fn two_sentences() -> EntityModel {
        model(json!({
            "id": "d1",
            "textLayers": [{
                "id": "tl1",
                "text": { "id": "t1", "body": "Hi there. Bye now." },
                "tokenLayers": [{
                    "id": "kl1",
                    "tokens": [
                        { "id": "k4", "begin": 14, "end": 18 },
                        { "id": "k1", "begin": 0, "end": 2 },
                        { "id": "k3", "begin": 10, "end": 13 },
                        { "id": "k2", "begin": 3, "end": 9 }
                    ],
                    "spanLayers": [
                        {
                            "id": "sent",
                            "name": "Sentence",
                            "spans": [
                                { "id": "S1", "tokens": ["k1", "k2"] },
                                { "id": "S2", "begin": "k3" }
                            ]
                        },
                        {
                            "id": "lemma",
                            "name": "Lemma",
                            "spans": [
                                { "id": "l1", "tokens": ["k1"], "value": "hi" },
                                { "id": "l2", "tokens": ["k2"], "value": "there" },
                                { "id": "l3", "begin": "k3", "value": "bye" },
                                { "id": "l4", "tokens": ["k4"], "value": "now" }
                            ],
                            "relationLayers": [{
                                "id": "deps",
                                "relations": [
                                    { "id": "r1", "source": "l1", "target": "l1", "value": "root" },
                                    { "id": "r2", "source": "l1", "target": "l2", "value": "advmod" },
                                    { "id": "r3", "source": "l3", "target": "l4", "value": "advmod" }
                                ]
                            }]
                        },
                        {
                            "id": "feats",
                            "name": "Features",
                            "spans": [
                                { "id": "f1", "tokens": ["k2"], "value": "PronType=Dem" },
                                { "id": "f2", "tokens": ["k2"], "value": "Deixis=Remt" }
                            ]
                        }
                    ]
                }]
            }]
        }))
    }

    #[test]
    fn test_splits_on_sentence_starts() {
        let sentences = build_sentences(&two_sentences());
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0].text(), "Hi there.");
        assert_eq!(sentences[1].text(), "Bye now.");
        assert_eq!(sentences[0].span_id.as_deref(), Some("S1"));
        assert_eq!(sentences[1].span_id.as_deref(), Some("S2"));
    }

    #[test]
    fn test_resolves_single_and_multi_annotations() {
        let sentences = build_sentences(&two_sentences());
        let there = &sentences[0].tokens[1];
        assert_eq!(there.single_value("Lemma"), Some(&json!("there")));
        assert_eq!(
            there.multi_values("Features"),
            vec![&json!("PronType=Dem"), &json!("Deixis=Remt")]
        );

        let bye = &sentences[1].tokens[0];
        assert_eq!(bye.single_value("Lemma"), Some(&json!("bye")));
        assert!(bye.multi_values("Features").is_empty());
    }

    #[test]
    fn test_relations_grouped_by_source_sentence() {
        let sentences = build_sentences(&two_sentences());
        let first: Vec<_> = sentences[0].relations.iter().map(|r| r.id.as_str()).collect();
        let second: Vec<_> = sentences[1].relations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(first, vec!["r1", "r2"]);
        assert_eq!(second, vec!["r3"]);
        assert_eq!(sentences[1].relations[0].target_token.as_deref(), Some("k4"));
    }

    #[test]
    fn test_no_sentence_layer_gives_one_group() {
        let m = model(json!({
            "id": "d1",
            "textLayers": [{
                "id": "tl1",
                "text": { "id": "t1", "body": "a b c" },
                "tokenLayers": [{
                    "id": "kl1",
                    "tokens": [
                        { "id": "a", "begin": 0, "end": 1 },
                        { "id": "b", "begin": 2, "end": 3 },
                        { "id": "c", "begin": 4, "end": 5 }
                    ]
                }]
            }]
        }));
        let sentences = build_sentences(&m);
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].text(), "a b c");
        assert!(sentences[0].span_id.is_none());
        assert!(sentences[0].relations.is_empty());
    }

    #[test]
    fn test_malformed_graphs_project_to_nothing() {
        assert!(build_sentences(&EntityModel::new()).is_empty());

        let no_text = model(json!({
            "id": "d1",
            "textLayers": [{ "id": "tl1", "tokenLayers": [{ "id": "kl1", "tokens": [{ "id": "a", "begin": 0, "end": 1 }] }] }]
        }));
        assert!(build_sentences(&no_text).is_empty());

        let no_tokens = model(json!({
            "id": "d1",
            "textLayers": [{ "id": "tl1", "text": { "id": "t1", "body": "x" }, "tokenLayers": [{ "id": "kl1" }] }]
        }));
        assert!(build_sentences(&no_tokens).is_empty());
    }

    #[test]
    fn test_partition_keeps_every_token_once() {
        let tokens: Vec<u32> = (0..20).collect();
        let refs: Vec<&u32> = tokens.iter().collect();
        for modulus in 1..7 {
            let groups = partition(&refs, |t| t % modulus == 0);
            let flat: Vec<u32> = groups.iter().flatten().map(|t| **t).collect();
            assert_eq!(flat, tokens);
            assert!(groups.iter().all(|g| !g.is_empty()));
        }
        assert!(partition::<u32>(&[], |_| true).is_empty());
    }

    #[test]
    fn test_equal_begins_keep_stored_order_not_precedence() {
        // Morphemes sharing one extent: the projection sorts by begin only,
        // so stored order wins over precedence.
        let m = model(json!({
            "id": "d1",
            "textLayers": [{
                "id": "tl1",
                "text": { "id": "t1", "body": "walked" },
                "tokenLayers": [{
                    "id": "kl1",
                    "tokens": [
                        { "id": "suffix", "begin": 0, "end": 6, "precedence": 2, "metadata": { "form": "-ed" } },
                        { "id": "stem", "begin": 0, "end": 6, "precedence": 1, "metadata": { "form": "walk" } }
                    ]
                }]
            }]
        }));
        let sentences = build_sentences(&m);
        let ids: Vec<_> = sentences[0].tokens.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["suffix", "stem"]);

        let by_precedence: Vec<_> = m
            .tokens_sharing_extent("suffix")
            .into_iter()
            .map(|t| t.id())
            .collect();
        assert_eq!(by_precedence, vec!["stem", "suffix"]);
        assert_ne!(ids, by_precedence);
    }
}
