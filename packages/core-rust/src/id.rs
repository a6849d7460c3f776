//! Parsing of the string identifiers that arrive in URL paths.

/// Why an identifier could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier {raw:?} is not a number")]
    NotNumeric { raw: String },
    #[error("identifier {value} must be positive")]
    NotPositive { value: i64 },
}

/// Parse a numeric record identifier (`"42"` -> `42`).
///
/// Surrounding whitespace is rejected rather than trimmed: the value came out
/// of a path segment and should already be clean.
///
/// # Errors
///
/// Returns [`IdError`] when the input is empty, not an integer, or not positive.
pub fn parse_id(raw: &str) -> Result<i64, IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    let value: i64 = raw.parse().map_err(|_| IdError::NotNumeric {
        raw: raw.to_string(),
    })?;
    if value <= 0 {
        return Err(IdError::NotPositive { value });
    }
    Ok(value)
}

/// Validate an account username: 3-32 chars of `[a-z0-9_]`.
///
/// # Errors
///
/// Returns a human-readable reason when the username is rejected.
pub fn validate_username(raw: &str) -> Result<(), String> {
    if !(3..=32).contains(&raw.len()) {
        return Err(format!("username must be 3-32 characters, got {}", raw.len()));
    }
    if !raw
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(format!("username {raw:?} contains invalid characters"));
    }
    Ok(())
}
