//! Validation functions for dotted paths.

use crate::{PathError, SEPARATOR};

/// Maximum allowed path depth.
pub const MAX_PATH_LENGTH: usize = 256;

/// Validate a dotted key.
///
/// # Errors
///
/// Returns an error if:
/// - A segment is empty (`a..b`, `.a`, `a.`)
/// - The key has more than [`MAX_PATH_LENGTH`] segments
///
/// # Example
///
/// ```
/// use atama_path::validate_key;
///
/// validate_key("").unwrap(); // Root is valid
/// validate_key("user.name").unwrap();
/// validate_key("user..name").unwrap_err();
/// ```
pub fn validate_key(key: &str) -> Result<(), PathError> {
    if key.is_empty() {
        return Ok(());
    }
    let mut segments = 0;
    for segment in key.split(SEPARATOR) {
        if segment.is_empty() {
            return Err(PathError::EmptySegment(key.to_string()));
        }
        segments += 1;
    }
    if segments > MAX_PATH_LENGTH {
        return Err(PathError::PathTooLong(segments));
    }
    Ok(())
}

/// Validate a path given as separate steps.
///
/// Every step must survive a round trip through its dotted key: steps are
/// non-empty and never contain [`SEPARATOR`].
///
/// ```
/// use atama_path::{validate_path, PathError};
///
/// validate_path(&["users", "0", "name"]).unwrap();
/// assert!(matches!(validate_path(&["a.b"]), Err(PathError::SeparatorInStep(_))));
/// ```
pub fn validate_path<S: AsRef<str>>(path: &[S]) -> Result<(), PathError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(PathError::PathTooLong(path.len()));
    }
    for step in path {
        let step = step.as_ref();
        if step.is_empty() {
            return Err(PathError::EmptySegment(crate::format_path(path)));
        }
        if step.contains(SEPARATOR) {
            return Err(PathError::SeparatorInStep(step.to_string()));
        }
    }
    Ok(())
}
