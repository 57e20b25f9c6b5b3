//! Error types for the editor

use plaid_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document is read-only")]
    ReadOnly,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl EditorError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        EditorError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
