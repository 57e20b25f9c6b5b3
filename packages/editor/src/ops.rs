//! Remote operations as data.
//!
//! Each variant is one write against the annotation service. Creates are
//! answered with the server-assigned id; every write may be answered with a
//! fresh document version token.

use plaid_common::{Id, Metadata, VersionToken};
use plaid_model::LayerRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RemoteOp {
    CreateSpan {
        span_layer_id: Id,
        tokens: Vec<Id>,
        value: Value,
        metadata: Metadata,
    },
    UpdateSpanValue {
        span_id: Id,
        value: Value,
    },
    SetSpanMetadata {
        span_id: Id,
        metadata: Metadata,
    },
    DeleteSpan {
        span_id: Id,
    },
    CreateRelation {
        relation_layer_id: Id,
        source: Id,
        target: Id,
        value: Value,
    },
    UpdateRelationValue {
        relation_id: Id,
        value: Value,
    },
    DeleteRelation {
        relation_id: Id,
    },
    CreateToken {
        token_layer_id: Id,
        text_id: Id,
        begin: usize,
        end: usize,
        precedence: Option<i64>,
        metadata: Metadata,
    },
    UpdateToken {
        token_id: Id,
        begin: usize,
        end: usize,
        precedence: Option<i64>,
    },
    SetTokenMetadata {
        token_id: Id,
        metadata: Metadata,
    },
    DeleteToken {
        token_id: Id,
    },
    UpdateText {
        text_id: Id,
        body: String,
    },
    UpdateDocument {
        document_id: Id,
        name: String,
    },
    SetDocumentMetadata {
        document_id: Id,
        metadata: Metadata,
    },
    SetConfig {
        layer: LayerRef,
        namespace: String,
        key: String,
        value: Value,
    },
    DeleteConfig {
        layer: LayerRef,
        namespace: String,
        key: String,
    },
}

impl RemoteOp {
    /// Resource collection the op is addressed to
    pub fn resource(&self) -> &'static str {
        match self {
            RemoteOp::CreateSpan { .. }
            | RemoteOp::UpdateSpanValue { .. }
            | RemoteOp::SetSpanMetadata { .. }
            | RemoteOp::DeleteSpan { .. } => "spans",
            RemoteOp::CreateRelation { .. }
            | RemoteOp::UpdateRelationValue { .. }
            | RemoteOp::DeleteRelation { .. } => "relations",
            RemoteOp::CreateToken { .. }
            | RemoteOp::UpdateToken { .. }
            | RemoteOp::SetTokenMetadata { .. }
            | RemoteOp::DeleteToken { .. } => "tokens",
            RemoteOp::UpdateText { .. } => "texts",
            RemoteOp::UpdateDocument { .. } | RemoteOp::SetDocumentMetadata { .. } => "documents",
            RemoteOp::SetConfig { layer, .. } | RemoteOp::DeleteConfig { layer, .. } => match layer {
                LayerRef::TextLayer(_) => "text-layers",
                LayerRef::TokenLayer(_) => "token-layers",
                LayerRef::SpanLayer(_) => "span-layers",
                LayerRef::RelationLayer(_) => "relation-layers",
            },
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(
            self,
            RemoteOp::CreateSpan { .. } | RemoteOp::CreateRelation { .. } | RemoteOp::CreateToken { .. }
        )
    }

    /// Short human-readable description, used in failure notices
    pub fn describe(&self) -> String {
        match self {
            RemoteOp::CreateSpan { span_layer_id, .. } => format!("create annotation in {}", span_layer_id),
            RemoteOp::UpdateSpanValue { span_id, .. } => format!("update annotation {}", span_id),
            RemoteOp::SetSpanMetadata { span_id, .. } => format!("update metadata of annotation {}", span_id),
            RemoteOp::DeleteSpan { span_id } => format!("delete annotation {}", span_id),
            RemoteOp::CreateRelation { source, target, .. } => {
                format!("create relation {} → {}", source, target)
            }
            RemoteOp::UpdateRelationValue { relation_id, .. } => format!("update relation {}", relation_id),
            RemoteOp::DeleteRelation { relation_id } => format!("delete relation {}", relation_id),
            RemoteOp::CreateToken { token_layer_id, .. } => format!("create token in {}", token_layer_id),
            RemoteOp::UpdateToken { token_id, .. } => format!("update token {}", token_id),
            RemoteOp::SetTokenMetadata { token_id, .. } => format!("update metadata of token {}", token_id),
            RemoteOp::DeleteToken { token_id } => format!("delete token {}", token_id),
            RemoteOp::UpdateText { text_id, .. } => format!("update text {}", text_id),
            RemoteOp::UpdateDocument { document_id, .. } => format!("rename document {}", document_id),
            RemoteOp::SetDocumentMetadata { document_id, .. } => {
                format!("update metadata of document {}", document_id)
            }
            RemoteOp::SetConfig { namespace, key, .. } => format!("set config {}/{}", namespace, key),
            RemoteOp::DeleteConfig { namespace, key, .. } => format!("delete config {}/{}", namespace, key),
        }
    }
}

/// What the server answered to a successful op
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReply {
    /// Id of the created entity, for creates
    #[serde(default)]
    pub id: Option<Id>,
    /// Document version after the write
    #[serde(default)]
    pub version: Option<VersionToken>,
}

impl RemoteReply {
    pub fn created(id: impl Into<Id>) -> Self {
        Self {
            id: Some(id.into()),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<VersionToken>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_op_wire_tag() {
        let op = RemoteOp::DeleteRelation {
            relation_id: "r1".into(),
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({ "op": "delete-relation", "relationId": "r1" })
        );
    }

    #[test]
    fn test_op_fields_are_camel_case() {
        let op = RemoteOp::CreateSpan {
            span_layer_id: "sl1".into(),
            tokens: vec!["k1".into()],
            value: json!("cat"),
            metadata: Metadata::new(),
        };
        let wire = serde_json::to_value(&op).unwrap();
        assert_eq!(wire["spanLayerId"], json!("sl1"));
        assert!(wire.get("span_layer_id").is_none());

        let back: RemoteOp = serde_json::from_value(wire).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_config_resource_follows_layer() {
        let op = RemoteOp::DeleteConfig {
            layer: LayerRef::TokenLayer("kl1".into()),
            namespace: "igt".into(),
            key: "orthographies".into(),
        };
        assert_eq!(op.resource(), "token-layers");
        assert!(!op.is_create());
        assert_eq!(op.describe(), "delete config igt/orthographies");
    }
}
