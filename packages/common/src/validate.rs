use crate::error::ClientError;

/// Check a user-supplied name before it is sent anywhere.
///
/// Returns the trimmed name. Fails on blank names and on names that collide
/// (case-sensitively, after trimming) with one of `existing`.
pub fn validate_name<'a>(
    kind: &str,
    name: &str,
    existing: impl IntoIterator<Item = &'a str>,
) -> Result<String, ClientError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ClientError::Validation(format!("{} name must not be empty", kind)));
    }

    if existing.into_iter().any(|other| other.trim() == trimmed) {
        return Err(ClientError::Validation(format!(
            "{} named \"{}\" already exists",
            kind, trimmed
        )));
    }

    Ok(trimmed.to_string())
}
