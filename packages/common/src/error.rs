use thiserror::Error;

/// Error returned by any call against the annotation service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Build an error from an HTTP status and the server's message body
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ClientError::Unauthorized(message),
            409 => ClientError::Conflict(message),
            400 => ClientError::BadRequest(message),
            404 => ClientError::NotFound(message),
            _ => ClientError::Remote { status, message },
        }
    }

    /// HTTP status this error corresponds to, if it came from the server
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized(_) => Some(401),
            ClientError::Conflict(_) => Some(409),
            ClientError::BadRequest(_) => Some(400),
            ClientError::NotFound(_) => Some(404),
            ClientError::Remote { status, .. } => Some(*status),
            ClientError::Validation(_) | ClientError::Transport(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClientError::Unauthorized(m)
            | ClientError::Conflict(m)
            | ClientError::BadRequest(m)
            | ClientError::NotFound(m)
            | ClientError::Validation(m)
            | ClientError::Transport(m) => m,
            ClientError::Remote { message, .. } => message,
        }
    }
}

/// How a failed call is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Local state is dropped and the user signs in again
    Authentication,
    /// The document changed underneath us; reload
    Conflict,
    /// Rejected input, shown inline
    Validation,
    /// Anything else; reported, never retried
    Transient,
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Transport(format!("malformed payload: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(ClientError::from_status(401, "x"), ClientError::Unauthorized(_)));
        assert!(matches!(ClientError::from_status(403, "x"), ClientError::Unauthorized(_)));
        assert!(matches!(ClientError::from_status(409, "x"), ClientError::Conflict(_)));
        assert!(matches!(ClientError::from_status(400, "x"), ClientError::BadRequest(_)));
        assert_eq!(
            ClientError::from_status(503, "down"),
            ClientError::Remote { status: 503, message: "down".to_string() }
        );
    }

    #[test]
    fn test_status_round_trips_for_server_errors() {
        for status in [400, 401, 404, 409, 500] {
            assert_eq!(ClientError::from_status(status, "m").status(), Some(status));
        }
        assert_eq!(ClientError::Validation("empty".into()).status(), None);
    }
}
