//! Rules for user-facing file names and their on-disk storage names.

use once_cell::sync::Lazy;
use regex::Regex;

use super::category::extension_of;

static STORAGE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)-(.+)$").unwrap_or_else(|e| panic!("invalid storage prefix regex: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name must not be empty")]
    Empty,
    #[error("name '{0}' is reserved")]
    Reserved(String),
    #[error("name '{0}' contains a path separator or control character")]
    IllegalCharacter(String),
}

/// A name is a single path segment: non-empty, not `.`/`..`, no separators or NUL.
pub fn validate_segment(name: &str) -> Result<(), NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Empty);
    }
    if name == "." || name == ".." {
        return Err(NameError::Reserved(name.to_string()));
    }
    if name.chars().any(|c| c == '/' || c == '\\' || c == '\0') {
        return Err(NameError::IllegalCharacter(name.to_string()));
    }
    Ok(())
}

/// Appends the extension of `old_name` when `new_name` has none.
pub fn with_inferred_extension(old_name: &str, new_name: &str) -> String {
    let new_name = new_name.trim();
    if extension_of(new_name).is_some() {
        return new_name.to_string();
    }
    match old_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => {
            format!("{}.{}", new_name.trim_end_matches('.'), ext)
        }
        _ => new_name.to_string(),
    }
}

/// `<millis>-<name>`: the name a file is persisted under locally.
pub fn storage_name(millis: i64, name: &str) -> String {
    format!("{millis}-{name}")
}

/// Recovers the logical name from a storage name; names without a timestamp
/// prefix are their own logical name.
pub fn logical_name(storage_name: &str) -> &str {
    match STORAGE_PREFIX.captures(storage_name) {
        Some(caps) => caps.get(2).map(|m| m.as_str()).unwrap_or(storage_name),
        None => storage_name,
    }
}

/// Prefix milliseconds of a storage name, if it has one.
pub fn storage_timestamp(storage_name: &str) -> Option<i64> {
    STORAGE_PREFIX
        .captures(storage_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
