//! Flat entity records stored in the arena.
//!
//! Parent/child links are id references. Structural fields (ids, owners,
//! child lists) are only writable from inside the crate so that edits made
//! through `apply_patch` cannot break the hierarchy.

use plaid_common::{Config, Id, Metadata, VersionToken};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata key holding a token's form when it differs from its text extent
/// (morphemes sharing one word extent carry their own form).
pub const FORM_KEY: &str = "form";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub(crate) id: Id,
    pub name: String,
    pub(crate) project_id: Option<Id>,
    pub metadata: Metadata,
    pub(crate) version: Option<VersionToken>,
    pub(crate) text_layer_ids: Vec<Id>,
}

impl DocumentRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn text_layer_ids(&self) -> &[Id] {
        &self.text_layer_ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLayer {
    pub(crate) id: Id,
    pub name: String,
    pub config: Config,
    pub(crate) text_id: Option<Id>,
    pub(crate) token_layer_ids: Vec<Id>,
}

impl TextLayer {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text_id(&self) -> Option<&str> {
        self.text_id.as_deref()
    }

    pub fn token_layer_ids(&self) -> &[Id] {
        &self.token_layer_ids
    }
}

/// Text body. Only ever replaced whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub(crate) id: Id,
    pub(crate) text_layer_id: Id,
    pub body: String,
    pub metadata: Metadata,
}

impl Text {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text_layer_id(&self) -> &str {
        &self.text_layer_id
    }

    /// Substring between two character offsets, clamped to the body
    pub fn slice(&self, begin: usize, end: usize) -> String {
        if end <= begin {
            return String::new();
        }
        self.body.chars().skip(begin).take(end - begin).collect()
    }

    pub fn char_len(&self) -> usize {
        self.body.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLayer {
    pub(crate) id: Id,
    pub name: String,
    pub config: Config,
    pub(crate) text_layer_id: Id,
    pub(crate) token_ids: Vec<Id>,
    pub(crate) span_layer_ids: Vec<Id>,
}

impl TokenLayer {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text_layer_id(&self) -> &str {
        &self.text_layer_id
    }

    pub fn token_ids(&self) -> &[Id] {
        &self.token_ids
    }

    pub fn span_layer_ids(&self) -> &[Id] {
        &self.span_layer_ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub(crate) id: Id,
    pub(crate) token_layer_id: Id,
    pub begin: usize,
    pub end: usize,
    pub precedence: Option<i64>,
    pub metadata: Metadata,
}

impl Token {
    /// New token record, not yet part of any model
    pub fn new(id: impl Into<Id>, token_layer_id: impl Into<Id>, begin: usize, end: usize) -> Self {
        Self {
            id: id.into(),
            token_layer_id: token_layer_id.into(),
            begin,
            end,
            precedence: None,
            metadata: Metadata::new(),
        }
    }

    /// Same token under a server-assigned id
    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_precedence(mut self, precedence: Option<i64>) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token_layer_id(&self) -> &str {
        &self.token_layer_id
    }

    /// Surface form: the `form` metadata entry if present, else the covered text
    pub fn form(&self, text: Option<&Text>) -> String {
        if let Some(Value::String(form)) = self.metadata.get(FORM_KEY) {
            return form.clone();
        }
        text.map(|t| t.slice(self.begin, self.end)).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLayer {
    pub(crate) id: Id,
    pub name: String,
    pub config: Config,
    pub(crate) token_layer_id: Id,
    pub(crate) span_ids: Vec<Id>,
    pub(crate) relation_layer_id: Option<Id>,
}

impl SpanLayer {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token_layer_id(&self) -> &str {
        &self.token_layer_id
    }

    pub fn span_ids(&self) -> &[Id] {
        &self.span_ids
    }

    pub fn relation_layer_id(&self) -> Option<&str> {
        self.relation_layer_id.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub(crate) id: Id,
    pub(crate) span_layer_id: Id,
    pub(crate) tokens: Vec<Id>,
    pub(crate) legacy_begin: Option<Id>,
    pub value: Value,
    pub metadata: Metadata,
}

impl Span {
    /// New span record over `tokens`, not yet part of any model
    pub fn new(id: impl Into<Id>, span_layer_id: impl Into<Id>, tokens: Vec<Id>, value: Value) -> Self {
        Self {
            id: id.into(),
            span_layer_id: span_layer_id.into(),
            tokens,
            legacy_begin: None,
            value,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn span_layer_id(&self) -> &str {
        &self.span_layer_id
    }

    pub fn tokens(&self) -> &[Id] {
        &self.tokens
    }

    pub fn legacy_begin(&self) -> Option<&str> {
        self.legacy_begin.as_deref()
    }

    /// Whether this span's extent includes `token_id`.
    ///
    /// Spans without a token list fall back to the legacy `begin` reference.
    pub fn covers(&self, token_id: &str) -> bool {
        if self.tokens.is_empty() {
            self.legacy_begin.as_deref() == Some(token_id)
        } else {
            self.tokens.iter().any(|t| t == token_id)
        }
    }

    /// First token of the extent (legacy `begin` when there is no token list)
    pub fn first_token(&self) -> Option<&str> {
        match self.tokens.first() {
            Some(first) => Some(first),
            None => self.legacy_begin.as_deref(),
        }
    }

    /// All token ids this span refers to, whichever encoding it uses
    pub fn token_refs(&self) -> Vec<&str> {
        if self.tokens.is_empty() {
            self.legacy_begin.as_deref().into_iter().collect()
        } else {
            self.tokens.iter().map(String::as_str).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationLayer {
    pub(crate) id: Id,
    pub name: String,
    pub config: Config,
    pub(crate) span_layer_id: Id,
    pub(crate) relation_ids: Vec<Id>,
}

impl RelationLayer {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn span_layer_id(&self) -> &str {
        &self.span_layer_id
    }

    pub fn relation_ids(&self) -> &[Id] {
        &self.relation_ids
    }
}

/// Directed labeled edge between two spans. `source == target` marks a root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub(crate) id: Id,
    pub(crate) relation_layer_id: Id,
    pub(crate) source: Id,
    pub(crate) target: Id,
    pub value: Value,
    pub metadata: Metadata,
}

impl Relation {
    pub fn new(
        id: impl Into<Id>,
        relation_layer_id: impl Into<Id>,
        source: impl Into<Id>,
        target: impl Into<Id>,
        value: Value,
    ) -> Self {
        Self {
            id: id.into(),
            relation_layer_id: relation_layer_id.into(),
            source: source.into(),
            target: target.into(),
            value,
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn relation_layer_id(&self) -> &str {
        &self.relation_layer_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_root(&self) -> bool {
        self.source == self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(body: &str) -> Text {
        Text {
            id: "t1".into(),
            text_layer_id: "tl1".into(),
            body: body.into(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_slice_uses_character_offsets() {
        let t = text("naïve café");
        assert_eq!(t.slice(0, 5), "naïve");
        assert_eq!(t.slice(6, 10), "café");
        assert_eq!(t.slice(6, 99), "café");
        assert_eq!(t.slice(4, 2), "");
    }

    #[test]
    fn test_form_prefers_metadata() {
        let t = text("walked");
        let plain = Token::new("k1", "kl", 0, 6);
        assert_eq!(plain.form(Some(&t)), "walked");

        let mut meta = Metadata::new();
        meta.insert(FORM_KEY.to_string(), json!("-ed"));
        let morpheme = Token::new("k2", "kl", 0, 6).with_metadata(meta);
        assert_eq!(morpheme.form(Some(&t)), "-ed");
        assert_eq!(plain.form(None), "");
    }

    #[test]
    fn test_span_covers_legacy_begin() {
        let mut span = Span::new("s1", "sl", vec![], json!("x"));
        span.legacy_begin = Some("k3".into());
        assert!(span.covers("k3"));
        assert!(!span.covers("k4"));
        assert_eq!(span.first_token(), Some("k3"));

        let span = Span::new("s2", "sl", vec!["k1".into(), "k2".into()], Value::Null);
        assert!(span.covers("k2"));
        assert_eq!(span.first_token(), Some("k1"));
        assert_eq!(span.token_refs(), vec!["k1", "k2"]);
    }
}
