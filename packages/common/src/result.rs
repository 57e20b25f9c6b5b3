use crate::error::ClientError;

/// Result of a call against the annotation service
pub type ClientResult<T> = Result<T, ClientError>;
