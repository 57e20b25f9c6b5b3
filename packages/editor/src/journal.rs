//! # Rollback Journal
//!
//! Keeps the inverse patches of optimistic edits until the server has
//! answered.
//!
//! ## Design
//!
//! - Each in-flight mutation gets an id from [`RollbackJournal::begin`]
//! - Every optimistic patch is applied through the journal, which records
//!   its inverse
//! - Success drops the record; failure applies the inverses newest first
//! - A reload replaces the graph, so every pending record is discarded
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut journal = RollbackJournal::new();
//! let id = journal.begin("delete annotation");
//! journal.apply(id, &patch, &mut model)?;
//!
//! // server said no
//! journal.rollback(id, &mut model)?;
//! ```

use plaid_model::{EntityModel, ModelError, ModelPatch};

/// Optimistic changes of one mutation not yet confirmed
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: u64,
    pub label: String,
    /// In application order
    inverses: Vec<ModelPatch>,
}

impl PendingMutation {
    pub fn change_count(&self) -> usize {
        self.inverses.len()
    }
}

#[derive(Debug, Default)]
pub struct RollbackJournal {
    next_id: u64,
    pending: Vec<PendingMutation>,
}

impl RollbackJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a record for a new mutation
    pub fn begin(&mut self, label: impl Into<String>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.pending.push(PendingMutation {
            id,
            label: label.into(),
            inverses: Vec::new(),
        });
        id
    }

    /// Apply an optimistic patch and remember how to undo it
    pub fn apply(&mut self, id: u64, patch: &ModelPatch, model: &mut EntityModel) -> Result<(), ModelError> {
        let inverse = model.apply(patch)?;
        match self.pending.iter_mut().find(|p| p.id == id) {
            Some(pending) => pending.inverses.push(inverse),
            None => tracing::warn!("journal record {} is gone; {} cannot be rolled back", id, patch.name()),
        }
        Ok(())
    }

    /// The server accepted the mutation
    pub fn commit(&mut self, id: u64) -> Option<PendingMutation> {
        let index = self.pending.iter().position(|p| p.id == id)?;
        Some(self.pending.remove(index))
    }

    /// Undo every optimistic patch of `id`, newest first.
    ///
    /// Returns how many patches were undone. An inverse that no longer
    /// applies is skipped and logged; the session reloads in that case.
    pub fn rollback(&mut self, id: u64, model: &mut EntityModel) -> Result<usize, ModelError> {
        let Some(pending) = self.commit(id) else {
            return Ok(0);
        };

        let mut undone = 0;
        let mut first_error = None;
        for inverse in pending.inverses.iter().rev() {
            match model.apply(inverse) {
                Ok(_) => undone += 1,
                Err(e) => {
                    tracing::warn!("rollback of '{}' could not undo {}: {}", pending.label, inverse.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::debug!("rolled back '{}' ({} changes)", pending.label, undone);
        match first_error {
            Some(e) => Err(e),
            None => Ok(undone),
        }
    }

    /// Forget every pending record, e.g. after the graph was reloaded
    pub fn discard_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.iter().any(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaid_model::DocumentPayload;
    use serde_json::json;

    fn model() -> EntityModel {
        let payload: DocumentPayload = serde_json::from_value(json!({
            "id": "d1",
            "textLayers": [{
                "id": "tl1",
                "text": { "id": "t1", "body": "a b" },
                "tokenLayers": [{
                    "id": "kl1",
                    "tokens": [
                        { "id": "k1", "begin": 0, "end": 1 },
                        { "id": "k2", "begin": 2, "end": 3 }
                    ],
                    "spanLayers": [{
                        "id": "sl1",
                        "name": "Lemma",
                        "spans": [
                            { "id": "s1", "tokens": ["k1"], "value": "a" },
                            { "id": "s2", "tokens": ["k2"], "value": "b" }
                        ]
                    }]
                }]
            }]
        }))
        .unwrap();
        EntityModel::from_payload(payload)
    }

    #[test]
    fn test_commit_keeps_changes() {
        let mut m = model();
        let mut journal = RollbackJournal::new();

        let id = journal.begin("edit");
        journal
            .apply(id, &ModelPatch::SetSpanValue { span_id: "s1".into(), value: json!("x") }, &mut m)
            .unwrap();
        assert!(journal.commit(id).is_some());

        assert_eq!(m.span("s1").unwrap().value, json!("x"));
        assert_eq!(journal.pending_count(), 0);
    }

    #[test]
    fn test_rollback_restores_in_reverse() {
        let mut m = model();
        let before = m.to_payload();
        let mut journal = RollbackJournal::new();

        let id = journal.begin("two edits");
        journal
            .apply(id, &ModelPatch::SetSpanValue { span_id: "s1".into(), value: json!("x") }, &mut m)
            .unwrap();
        journal.apply(id, &ModelPatch::RemoveSpan { span_id: "s1".into() }, &mut m).unwrap();
        assert!(m.span("s1").is_none());

        assert_eq!(journal.rollback(id, &mut m).unwrap(), 2);
        assert_eq!(m.to_payload(), before);
    }

    #[test]
    fn test_rollback_leaves_other_mutations_alone() {
        let mut m = model();
        let mut journal = RollbackJournal::new();

        let first = journal.begin("first");
        let second = journal.begin("second");
        journal
            .apply(first, &ModelPatch::SetSpanValue { span_id: "s1".into(), value: json!("x") }, &mut m)
            .unwrap();
        journal
            .apply(second, &ModelPatch::SetSpanValue { span_id: "s2".into(), value: json!("y") }, &mut m)
            .unwrap();

        journal.rollback(first, &mut m).unwrap();
        assert_eq!(m.span("s1").unwrap().value, json!("a"));
        assert_eq!(m.span("s2").unwrap().value, json!("y"));
        assert!(journal.is_pending(second));
    }

    #[test]
    fn test_unknown_id_rolls_back_nothing() {
        let mut m = model();
        let mut journal = RollbackJournal::new();
        assert_eq!(journal.rollback(42, &mut m).unwrap(), 0);
    }

    #[test]
    fn test_discard_all() {
        let mut journal = RollbackJournal::new();
        journal.begin("a");
        journal.begin("b");
        assert_eq!(journal.discard_all(), 2);
        assert_eq!(journal.pending_count(), 0);
    }
}
