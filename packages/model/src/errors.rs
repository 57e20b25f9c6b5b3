//! Error types for the entity model

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("No document loaded")]
    NotLoaded,

    #[error("Document is read-only")]
    ReadOnly,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl ModelError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        ModelError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
