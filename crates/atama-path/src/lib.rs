//! Dotted path utilities.
//!
//! A dotted key is the string form of a location in a state tree: every
//! ancestor property name joined with `.`. Sequence indices render as their
//! decimal form, so `["users", "0", "name"]` and `users.0.name` describe the
//! same location regardless of which containers sit along the way.
//!
//! # Example
//!
//! ```
//! use atama_path::{format_path, parse_path, get, key_has_prefix};
//!
//! let path = parse_path("user.name");
//! assert_eq!(path, vec!["user".to_string(), "name".to_string()]);
//! assert_eq!(format_path(&path), "user.name");
//!
//! assert!(key_has_prefix("user.name.first", "user.name"));
//! assert!(!key_has_prefix("user.nickname", "user.name"));
//!
//! let doc = serde_json::json!({"user": {"name": "Ann"}});
//! assert_eq!(get(&doc, &path), Some(&serde_json::json!("Ann")));
//! ```

use serde_json::Value;
use thiserror::Error;

pub mod validate;
pub use validate::{validate_key, validate_path, MAX_PATH_LENGTH};

/// Segment separator of a dotted key.
pub const SEPARATOR: char = '.';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path has no parent")]
    NoParent,
    #[error("empty segment in path {0:?}")]
    EmptySegment(String),
    #[error("path too long ({0} segments)")]
    PathTooLong(usize),
    #[error("path step {0:?} contains the separator")]
    SeparatorInStep(String),
}

/// Join path steps into a dotted key.
///
/// # Example
///
/// ```
/// use atama_path::format_path;
///
/// assert_eq!(format_path::<&str>(&[]), "");
/// assert_eq!(format_path(&["a", "0", "b"]), "a.0.b");
/// ```
pub fn format_path<S: AsRef<str>>(steps: &[S]) -> String {
    let mut out = String::new();
    for (i, step) in steps.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(step.as_ref());
    }
    out
}

/// Split a dotted key into its segments. The empty key is the root.
///
/// # Example
///
/// ```
/// use atama_path::parse_path;
///
/// assert_eq!(parse_path(""), Vec::<String>::new());
/// assert_eq!(parse_path("a.b"), vec!["a", "b"]);
/// ```
pub fn parse_path(key: &str) -> Vec<String> {
    if key.is_empty() {
        return Vec::new();
    }
    key.split(SEPARATOR).map(str::to_string).collect()
}

/// Number of segments in a dotted key.
pub fn depth(key: &str) -> usize {
    if key.is_empty() {
        return 0;
    }
    key.matches(SEPARATOR).count() + 1
}

/// The first `depth` segments of a dotted key.
///
/// # Example
///
/// ```
/// use atama_path::truncate;
///
/// assert_eq!(truncate("a.b.c", 2), "a.b");
/// assert_eq!(truncate("a.b.c", 5), "a.b.c");
/// assert_eq!(truncate("a.b.c", 0), "");
/// ```
pub fn truncate(key: &str, depth: usize) -> &str {
    if depth == 0 {
        return "";
    }
    match key.match_indices(SEPARATOR).nth(depth - 1) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}

/// Whether `key` equals `prefix` or lies underneath it, comparing whole
/// segments (`a.bc` is not under `a.b`). Every key lies under the root.
pub fn key_has_prefix(key: &str, prefix: &str) -> bool {
    truncate(key, depth(prefix)) == prefix
}

/// Whether one of the two keys is a segment prefix of the other.
pub fn keys_overlap(a: &str, b: &str) -> bool {
    key_has_prefix(a, b) || key_has_prefix(b, a)
}

/// Check if `prefix` is equal to `path` or one of its ancestors.
pub fn is_prefix<S: AsRef<str>, T: AsRef<str>>(prefix: &[S], path: &[T]) -> bool {
    prefix.len() <= path.len()
        && prefix
            .iter()
            .zip(path)
            .all(|(a, b)| a.as_ref() == b.as_ref())
}

/// Check if `parent` strictly contains `child`.
///
/// # Example
///
/// ```
/// use atama_path::is_child;
///
/// assert!(is_child(&["a"], &["a", "b"]));
/// assert!(!is_child(&["a"], &["a"]));
/// ```
pub fn is_child<S: AsRef<str>, T: AsRef<str>>(parent: &[S], child: &[T]) -> bool {
    parent.len() < child.len() && is_prefix(parent, child)
}

/// Get the parent path of a given path.
///
/// # Errors
///
/// Returns [`PathError::NoParent`] for the root path.
pub fn parent<S: AsRef<str>>(path: &[S]) -> Result<Vec<String>, PathError> {
    if path.is_empty() {
        return Err(PathError::NoParent);
    }
    Ok(path[..path.len() - 1]
        .iter()
        .map(|s| s.as_ref().to_string())
        .collect())
}

/// Check if a string represents a valid non-negative integer sequence index.
///
/// # Example
///
/// ```
/// use atama_path::is_valid_index;
///
/// assert!(is_valid_index("0"));
/// assert!(is_valid_index("12"));
/// assert!(!is_valid_index("01"));
/// assert!(!is_valid_index("-1"));
/// assert!(!is_valid_index("name"));
/// ```
pub fn is_valid_index(index: &str) -> bool {
    if index.is_empty() {
        return false;
    }
    let bytes = index.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_digit())
}

/// Resolve a path against a JSON value.
///
/// Returns `None` if any step is missing or steps into a primitive.
pub fn get<'a, S: AsRef<str>>(val: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = val;
    for step in path {
        let step = step.as_ref();
        current = match current {
            Value::Array(arr) => {
                if !is_valid_index(step) {
                    return None;
                }
                arr.get(step.parse::<usize>().ok()?)?
            }
            Value::Object(map) => map.get(step)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a dotted key against a JSON value.
pub fn get_by_key<'a>(val: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(val);
    }
    get(val, &key.split(SEPARATOR).collect::<Vec<_>>())
}
