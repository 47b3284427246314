//! Configuration store abstraction.
//!
//! Datasets keep their container registrations in a git-config formatted text
//! file. This module exposes the handful of operations the tools need on such
//! a store as the [`ConfigStore`] trait, and [`GitConfigFile`] as the
//! file-backed implementation.
//!
//! ## Key format
//!
//! Keys are dotted: `section.subsection.variable`, where the subsection may
//! itself contain dots (`datalad.containers.bids-validator.image`). Section
//! and variable names compare case-insensitively, subsections exactly.

mod gitconfig;

pub use gitconfig::GitConfigFile;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key does not have the `section.variable` shape
    #[error("invalid configuration key '{0}'")]
    InvalidKey(String),

    /// Key pattern is not a valid regular expression
    #[error("invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Another writer holds the lock file
    #[error("configuration file '{}' is locked by another process", path.display())]
    Locked { path: PathBuf },

    /// Store was built from text and cannot be saved
    #[error("configuration store has no backing file")]
    Unbacked,

    /// IO error
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Operations on a dotted-key configuration store.
pub trait ConfigStore {
    /// Last value recorded for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// All `(key, value)` pairs whose canonical key matches `pattern`, in
    /// file order.
    fn get_regexp(&self, pattern: &str) -> Result<Vec<(String, String)>>;

    /// Set `key` to `value`, collapsing any existing entries into one.
    fn replace_all(&mut self, key: &str, value: &str) -> Result<()>;

    /// Append `# marker` to entries of `key` whose value equals `value`.
    ///
    /// Entries already carrying the marker are left alone. Returns whether
    /// any entry changed.
    fn annotate(&mut self, key: &str, value: &str, marker: &str) -> Result<bool>;
}

/// Split a key into its canonical `(section, subsection, variable)` parts.
pub(crate) fn split_key(key: &str) -> Result<(String, Option<String>, String)> {
    let first = key.find('.');
    let last = key.rfind('.');
    match (first, last) {
        (Some(first), Some(last)) if first > 0 && last + 1 < key.len() => {
            let section = key[..first].to_ascii_lowercase();
            let variable = key[last + 1..].to_ascii_lowercase();
            let subsection = (first != last).then(|| key[first + 1..last].to_string());
            Ok((section, subsection, variable))
        }
        _ => Err(StoreError::InvalidKey(key.to_string())),
    }
}

/// Canonical form of a key: lowercase section and variable names.
pub(crate) fn canonical_key(
    section: &str,
    subsection: Option<&str>,
    variable: &str,
) -> String {
    match subsection {
        Some(sub) => format!(
            "{}.{}.{}",
            section.to_ascii_lowercase(),
            sub,
            variable.to_ascii_lowercase()
        ),
        None => format!(
            "{}.{}",
            section.to_ascii_lowercase(),
            variable.to_ascii_lowercase()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_key_with_dotted_subsection() {
        let (section, sub, var) = split_key("DataLad.containers.app-tool.Image").unwrap();
        assert_eq!(section, "datalad");
        assert_eq!(sub.as_deref(), Some("containers.app-tool"));
        assert_eq!(var, "image");
    }

    #[test]
    fn test_split_key_without_subsection() {
        let (section, sub, var) = split_key("user.name").unwrap();
        assert_eq!(section, "user");
        assert!(sub.is_none());
        assert_eq!(var, "name");
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(split_key("name"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(split_key(".name"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(split_key("user."), Err(StoreError::InvalidKey(_))));
    }
}
