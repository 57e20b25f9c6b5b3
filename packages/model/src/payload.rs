//! Nested wire shapes, as the document endpoint returns them.

use plaid_common::{Config, Id, Metadata, VersionToken};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionToken>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub text_layers: Vec<TextLayerPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLayerPayload {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextPayload>,
    #[serde(default)]
    pub token_layers: Vec<TokenLayerPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload {
    pub id: Id,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLayerPayload {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub tokens: Vec<TokenPayload>,
    #[serde(default)]
    pub span_layers: Vec<SpanLayerPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub id: Id,
    pub begin: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedence: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanLayerPayload {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub spans: Vec<SpanPayload>,
    #[serde(default)]
    pub relation_layers: Vec<RelationLayerPayload>,
}

/// A span as sent over the wire.
///
/// Older documents encode a single-token span as `begin: <token id>` with no
/// `tokens` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanPayload {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<Id>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin: Option<Id>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationLayerPayload {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub relations: Vec<RelationPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationPayload {
    pub id: Id,
    pub source: Id,
    pub target: Id,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub metadata: Metadata,
}
