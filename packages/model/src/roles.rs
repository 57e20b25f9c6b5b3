use serde::{Deserialize, Serialize};

/// Which span layers play which part in the annotation editors.
///
/// Layers are matched by name. Single-valued layers hold at most one span per
/// token; multi-valued layers hold any number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayerRoles {
    pub sentence: String,
    pub single_valued: Vec<String>,
    pub multi_valued: Vec<String>,
    /// Single-valued layer whose spans are the endpoints of relations
    pub relation_anchor: String,
}

impl Default for LayerRoles {
    fn default() -> Self {
        Self {
            sentence: "Sentence".to_string(),
            single_valued: vec!["Lemma".to_string(), "UPOS".to_string(), "XPOS".to_string()],
            multi_valued: vec!["Features".to_string()],
            relation_anchor: "Lemma".to_string(),
        }
    }
}

impl LayerRoles {
    pub fn is_sentence(&self, layer_name: &str) -> bool {
        self.sentence == layer_name
    }

    pub fn is_single_valued(&self, layer_name: &str) -> bool {
        self.single_valued.iter().any(|n| n == layer_name)
    }

    pub fn is_multi_valued(&self, layer_name: &str) -> bool {
        self.multi_valued.iter().any(|n| n == layer_name)
    }

    pub fn is_relation_anchor(&self, layer_name: &str) -> bool {
        self.relation_anchor == layer_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let roles = LayerRoles::default();
        assert!(roles.is_single_valued("UPOS"));
        assert!(!roles.is_single_valued("Features"));
        assert!(roles.is_multi_valued("Features"));
        assert!(roles.is_relation_anchor("Lemma"));
        assert!(roles.is_sentence("Sentence"));
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let roles: LayerRoles = serde_json::from_str(r#"{ "relationAnchor": "Word" }"#).unwrap();
        assert_eq!(roles.relation_anchor, "Word");
        assert_eq!(roles.sentence, "Sentence");
    }
}
