//! Integration tests for the model crate

use plaid_model::{
    DocumentPayload, EntityModel, EntityMut, EntityPath, LayerRef, LayerRoles, ModelError,
    ModelPatch, Relation, Span, Token,
};
use serde_json::json;

fn interlinear() -> DocumentPayload {
    serde_json::from_value(json!({
        "id": "doc-1",
        "name": "Story",
        "version": "v7",
        "textLayers": [{
            "id": "tl",
            "text": { "id": "text", "body": "Ngayu yanani" },
            "tokenLayers": [{
                "id": "words",
                "tokens": [
                    { "id": "w1", "begin": 0, "end": 5 },
                    { "id": "w2", "begin": 6, "end": 12 }
                ],
                "spanLayers": [
                    {
                        "id": "sentences",
                        "name": "Sentence",
                        "spans": [{ "id": "sent", "begin": "w1" }]
                    },
                    {
                        "id": "gloss",
                        "name": "Lemma",
                        "spans": [
                            { "id": "g1", "tokens": ["w1"], "value": "1SG" },
                            { "id": "g2", "tokens": ["w2"], "value": "go-PRS" }
                        ],
                        "relationLayers": [{
                            "id": "deps",
                            "relations": [
                                { "id": "r1", "source": "g2", "target": "g1", "value": "subj" }
                            ]
                        }]
                    }
                ]
            }]
        }]
    }))
    .unwrap()
}

#[test]
fn test_edit_session_undone_step_by_step() -> anyhow::Result<()> {
    let mut model = EntityModel::from_payload(interlinear());
    let original = model.to_payload();

    let edits = vec![
        ModelPatch::SetSpanValue { span_id: "g1".into(), value: json!("I") },
        ModelPatch::InsertToken {
            token: Token::new("w2b", "words", 6, 12).with_precedence(Some(1)),
            index: Some(2),
        },
        ModelPatch::InsertSpan {
            span: Span::new("g3", "gloss", vec!["w2b".into()], json!("PRS")),
            index: None,
        },
        ModelPatch::InsertRelation {
            relation: Relation::new("r2", "deps", "g2", "g3", json!("aux")),
            index: None,
        },
        ModelPatch::RemoveToken { token_id: "w2b".into() },
        ModelPatch::SetDocumentName { name: "Story (edited)".into() },
    ];

    let mut inverses = Vec::new();
    for edit in &edits {
        inverses.push(model.apply(edit)?);
    }
    // removing w2b took g3 and r2 with it
    assert!(model.span("g3").is_none());
    assert!(model.relation("r2").is_none());
    assert_eq!(model.document().map(|d| d.name.as_str()), Some("Story (edited)"));

    for inverse in inverses.iter().rev() {
        model.apply(inverse)?;
    }
    assert_eq!(model.to_payload(), original);
    Ok(())
}

#[test]
fn test_legacy_sentence_survives_round_trip() {
    let model = EntityModel::from_payload(interlinear());
    let sentence = model.span("sent").unwrap();
    assert!(sentence.covers("w1"));
    assert_eq!(sentence.first_token(), Some("w1"));

    let payload = model.to_payload().unwrap();
    let again = EntityModel::from_payload(payload);
    assert_eq!(again.span("sent").unwrap().legacy_begin(), Some("w1"));
}

#[test]
fn test_as_of_snapshot_is_read_only() {
    let mut model = EntityModel::new();
    model.load_read_only(interlinear());

    assert!(model.is_read_only());
    assert_eq!(
        model.apply(&ModelPatch::RemoveSpan { span_id: "g1".into() }),
        Err(ModelError::ReadOnly)
    );
    assert!(model
        .apply_patch(&EntityPath::Span("g1".into()), |_| ())
        .is_err());

    // a normal load makes it editable again
    model.load(interlinear());
    assert!(!model.is_read_only());
}

#[test]
fn test_revision_moves_on_every_change() -> anyhow::Result<()> {
    let mut model = EntityModel::new();
    let r0 = model.revision();
    model.load(interlinear());
    let r1 = model.revision();
    assert!(r1 > r0);

    model.apply_patch(&EntityPath::Token("w1".into()), |target| {
        if let EntityMut::Token(token) = target {
            token.metadata.insert("gloss".into(), json!("1SG"));
        }
    })?;
    assert!(model.revision() > r1);
    Ok(())
}

#[test]
fn test_custom_roles_change_invariants() -> anyhow::Result<()> {
    let roles: LayerRoles = serde_json::from_value(json!({ "multiValued": ["Lemma"] }))?;
    let mut model = EntityModel::with_roles(roles);
    model.load(interlinear());

    // with Lemma multi-valued, a second span on w1 is fine
    model.apply(&ModelPatch::InsertSpan {
        span: Span::new("g1b", "gloss", vec!["w1".into()], json!("I")),
        index: None,
    })?;
    assert_eq!(model.spans_covering("gloss", "w1").len(), 2);
    Ok(())
}

#[test]
fn test_config_entries_keep_version() -> anyhow::Result<()> {
    let mut model = EntityModel::from_payload(interlinear());
    model.apply(&ModelPatch::SetConfig {
        layer: LayerRef::TokenLayer("words".into()),
        namespace: "igt".into(),
        key: "orthographies".into(),
        value: Some(json!([{ "name": "IPA" }])),
    })?;
    model.apply(&ModelPatch::SetVersion { version: Some("v8".into()) })?;

    let payload = model.to_payload().unwrap();
    assert_eq!(payload.version.as_deref(), Some("v8"));
    assert_eq!(
        payload.text_layers[0].token_layers[0].config["igt"]["orthographies"],
        json!([{ "name": "IPA" }])
    );
    Ok(())
}
