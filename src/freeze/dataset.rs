//! Relation between the source dataset and the dataset receiving the
//! frozen configuration.

use super::FreezeError;
use crate::env;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Source dataset (`topd`) and optional save target.
///
/// `topd_rel` is computed once: empty when both are the same dataset,
/// otherwise the `/`-terminated path of the source relative to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRelation {
    source: PathBuf,
    target: Option<PathBuf>,
    topd_rel: String,
}

impl DatasetRelation {
    /// Relation for freezing within the source dataset itself.
    pub fn same(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: None,
            topd_rel: String::new(),
        }
    }

    /// Check the pre-flight conditions and compute `topd_rel`.
    ///
    /// # Errors
    ///
    /// - [`FreezeError::MissingConfigStore`] when a dataset has no
    ///   configuration store
    /// - [`FreezeError::NotDescendant`] when the source does not live under
    ///   the target
    pub fn establish(source: &Path, target: Option<&Path>) -> Result<Self, FreezeError> {
        require_config_store(source)?;

        let Some(target) = target else {
            return Ok(Self::same(source));
        };
        require_config_store(target)?;

        let source_abs = canonicalize(source)?;
        let target_abs = canonicalize(target)?;
        let relative =
            source_abs
                .strip_prefix(&target_abs)
                .map_err(|_| FreezeError::NotDescendant {
                    dataset: source_abs.clone(),
                    save_dataset: target_abs.clone(),
                })?;

        let parts: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let topd_rel = if parts.is_empty() {
            String::new()
        } else {
            format!("{}/", parts.join("/"))
        };
        debug!(
            "Source {:?} relative to save dataset {:?}: '{}'",
            source_abs, target_abs, topd_rel
        );

        Ok(Self {
            source: source.to_path_buf(),
            target: Some(target.to_path_buf()),
            topd_rel,
        })
    }

    /// Source dataset root.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Dataset whose configuration store receives the rewrite.
    pub fn target_root(&self) -> &Path {
        self.target.as_deref().unwrap_or(&self.source)
    }

    /// Dataset to record the change in, when one was requested.
    pub fn save_target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Whether the rewrite stays within the source dataset.
    pub fn is_same_dataset(&self) -> bool {
        self.topd_rel.is_empty()
    }

    /// Prefix applied to every path-bearing value written to the target.
    pub fn topd_rel(&self) -> &str {
        &self.topd_rel
    }
}

fn require_config_store(dataset: &Path) -> Result<(), FreezeError> {
    let config = env::dataset_config_path(dataset);
    if config.is_file() {
        Ok(())
    } else {
        Err(FreezeError::MissingConfigStore {
            dataset: dataset.to_path_buf(),
            path: config,
        })
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, FreezeError> {
    path.canonicalize().map_err(|source| FreezeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_dataset(path: &Path) {
        fs::create_dir_all(env::datalad_dir_path(path)).unwrap();
        fs::write(env::dataset_config_path(path), "").unwrap();
    }

    #[test]
    fn test_same_dataset() {
        let temp_dir = TempDir::new().unwrap();
        make_dataset(temp_dir.path());

        let relation = DatasetRelation::establish(temp_dir.path(), None).unwrap();
        assert!(relation.is_same_dataset());
        assert_eq!(relation.topd_rel(), "");
        assert!(relation.save_target().is_none());
        assert_eq!(relation.target_root(), temp_dir.path());
    }

    #[test]
    fn test_nested_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let super_ds = temp_dir.path();
        let sub_ds = super_ds.join("code/containers");
        make_dataset(super_ds);
        make_dataset(&sub_ds);

        let relation = DatasetRelation::establish(&sub_ds, Some(super_ds)).unwrap();
        assert!(!relation.is_same_dataset());
        assert_eq!(relation.topd_rel(), "code/containers/");
        assert_eq!(relation.target_root(), super_ds);
    }

    #[test]
    fn test_target_equal_to_source() {
        let temp_dir = TempDir::new().unwrap();
        make_dataset(temp_dir.path());

        let relation =
            DatasetRelation::establish(temp_dir.path(), Some(temp_dir.path())).unwrap();
        assert!(relation.is_same_dataset());
        assert_eq!(relation.save_target(), Some(temp_dir.path()));
    }

    #[test]
    fn test_missing_config_store() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("containers");
        make_dataset(&source);

        let result = DatasetRelation::establish(&source, Some(temp_dir.path()));
        assert!(matches!(result, Err(FreezeError::MissingConfigStore { .. })));
    }

    #[test]
    fn test_not_descendant() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a");
        let target = temp_dir.path().join("b");
        make_dataset(&source);
        make_dataset(&target);

        let result = DatasetRelation::establish(&source, Some(&target));
        assert!(matches!(result, Err(FreezeError::NotDescendant { .. })));
    }
}
