//! Rewriting of container registrations in a configuration store.

use crate::env::{self, keys};
use crate::store::{ConfigStore, StoreError};
use tracing::debug;

/// How a resolved image is written to the target store.
#[derive(Clone, Copy)]
pub enum RewriteMode<'a> {
    /// Freeze within the source dataset and mark the entry so that a later
    /// automatic upgrade of the line conflicts.
    InPlace,
    /// Copy the registration into an ancestor dataset, shifting every
    /// path-bearing value by `topd_rel`.
    CopyInto {
        source: &'a dyn ConfigStore,
        topd_rel: &'a str,
    },
}

/// What a rewrite changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Keys written, in order
    pub keys_written: Vec<String>,
    /// Whether the frozen marker was added
    pub annotated: bool,
}

/// Writes frozen image registrations.
#[derive(Debug, Clone)]
pub struct ConfigRewriter {
    marker: String,
}

impl Default for ConfigRewriter {
    fn default() -> Self {
        Self::new(keys::FROZEN_MARKER)
    }
}

impl ConfigRewriter {
    /// Rewriter annotating in-place freezes with `# <marker>`.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Record `resolved_path` as the image of `image_name` in `target`.
    pub fn apply(
        &self,
        target: &mut dyn ConfigStore,
        image_name: &str,
        resolved_path: &str,
        mode: RewriteMode<'_>,
    ) -> Result<RewriteSummary, StoreError> {
        let image_key = env::container_key(image_name, keys::IMAGE_FIELD);
        target.replace_all(&image_key, resolved_path)?;

        let mut summary = RewriteSummary {
            keys_written: vec![image_key.clone()],
            annotated: false,
        };

        match mode {
            RewriteMode::InPlace => {
                summary.annotated = target.annotate(&image_key, resolved_path, &self.marker)?;
            }
            RewriteMode::CopyInto { source, topd_rel } => {
                let pattern = format!(
                    r"^{}\.{}\.{}\.[^.]+$",
                    regex::escape(keys::SECTION),
                    regex::escape(keys::CONTAINERS_PREFIX),
                    regex::escape(image_name)
                );
                for (key, value) in source.get_regexp(&pattern)? {
                    let field = key.rsplit('.').next().unwrap_or_default();
                    let value = match field {
                        keys::IMAGE_FIELD => continue,
                        keys::CMDEXEC_FIELD => rewrite_cmdexec(&value, topd_rel),
                        _ => value,
                    };
                    debug!("Copying {} = {}", key, value);
                    target.replace_all(&key, &value)?;
                    summary.keys_written.push(key);
                }
            }
        }

        Ok(summary)
    }
}

/// Shift an execution command template by `topd_rel`.
///
/// A template rooted at `{img_dspath}/` gets the prefix right after the
/// placeholder; any other template is prefixed as a whole.
pub fn rewrite_cmdexec(value: &str, topd_rel: &str) -> String {
    let rooted = format!("{}/", keys::IMG_DSPATH_PLACEHOLDER);
    match value.strip_prefix(&rooted) {
        Some(rest) => format!("{}{}{}", rooted, topd_rel, rest),
        None => format!("{}{}", topd_rel, value),
    }
}
