//! # View Pipeline
//!
//! Caches the sentence views of a model between edits.
//!
//! Views are rebuilt in full whenever the model's revision moved since the
//! last build; there is no incremental update.

use plaid_model::EntityModel;

use crate::views::{build_sentences, SentenceView};

#[derive(Debug, Default)]
pub struct ViewPipeline {
    built_at: Option<u64>,
    sentences: Vec<SentenceView>,
}

impl ViewPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sentence views for the model's current revision
    pub fn sentences(&mut self, model: &EntityModel) -> &[SentenceView] {
        let revision = model.revision();
        if self.built_at != Some(revision) {
            tracing::debug!("rebuilding sentence views at revision {}", revision);
            self.sentences = build_sentences(model);
            self.built_at = Some(revision);
        }
        &self.sentences
    }

    /// Revision the cached views were built from
    pub fn built_at(&self) -> Option<u64> {
        self.built_at
    }

    /// Force a rebuild on next access
    pub fn clear_cache(&mut self) {
        self.built_at = None;
        self.sentences.clear();
    }
}
