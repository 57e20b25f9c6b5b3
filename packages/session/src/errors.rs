//! Error types for document sessions

use plaid_common::ClientError;
use plaid_editor::EditorError;
use plaid_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Remote error: {0}")]
    Client(#[from] ClientError),

    #[error("Editor error: {0}")]
    Editor(#[from] EditorError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Signed out; sign in again to keep editing")]
    Unauthenticated,

    #[error("Invalid session config: {0}")]
    Config(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
