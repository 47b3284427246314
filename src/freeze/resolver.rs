//! Resolution of image references to image files.
//!
//! Images live under `images/<family>/<name>--<version>.<ext>`. A version is
//! matched as a plain string prefix that must be followed by a literal `.`,
//! so `20.1` selects `20.1.3.sif` or `20.1.sif` but never `20.10.sif`.

use super::ImageRef;
use crate::env;
use crate::store::{ConfigStore, StoreError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors while resolving an image reference.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No version given and the container has no registered image
    #[error("container '{name}' has no registered image")]
    NotRegistered { name: String },

    /// Nothing matches the version prefix
    #[error("no image matching '{prefix}.*' was found. Available images:{}", format_list(.available))]
    NotFound {
        prefix: String,
        available: Vec<String>,
    },

    /// More than one image matches the version prefix
    #[error(
        "'{prefix}.*' matches several images, specify a longer version:{}",
        format_list(.candidates)
    )]
    Ambiguous {
        prefix: String,
        candidates: Vec<String>,
    },

    /// Configuration store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Image directory could not be listed
    #[error("IO error listing '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        return " none".to_string();
    }
    items.iter().map(|item| format!("\n  {}", item)).collect()
}

/// Resolves image references within a source dataset.
#[derive(Debug, Clone)]
pub struct TargetResolver<'a> {
    topd: &'a Path,
    topd_rel: &'a str,
}

impl<'a> TargetResolver<'a> {
    /// Resolver for images of `topd`, reporting paths prefixed with
    /// `topd_rel` so they are relative to the save target.
    pub fn new(topd: &'a Path, topd_rel: &'a str) -> Self {
        Self { topd, topd_rel }
    }

    /// Resolve `image` to a path relative to the save target.
    ///
    /// Without a version the currently registered image is returned.
    pub fn resolve(
        &self,
        store: &dyn ConfigStore,
        image: &ImageRef,
    ) -> Result<String, ResolveError> {
        let Some(version) = image.version.as_deref() else {
            let key = env::container_key(&image.name, env::keys::IMAGE_FIELD);
            let current = store.get(&key)?.ok_or_else(|| ResolveError::NotRegistered {
                name: image.name.clone(),
            })?;
            debug!("Re-freezing {} at its registered image {}", image.name, current);
            return Ok(format!("{}{}", self.topd_rel, current));
        };

        let family_rel = env::family_images_rel(image.family());
        let stem = format!("{}--{}", image.name, version);
        let prefix = format!("{}/{}", family_rel, stem);

        if self.topd.join(&prefix).exists() {
            debug!("Version {} names an image file exactly", version);
            return Ok(format!("{}{}", self.topd_rel, prefix));
        }

        let entries = self.list_family(&family_rel)?;
        let glob = format!("{}.", stem);
        let mut candidates: Vec<&String> = entries
            .iter()
            .filter(|entry| entry.starts_with(&glob))
            .collect();

        match candidates.len() {
            0 => {
                let listing = format!("{}--", image.name);
                Err(ResolveError::NotFound {
                    prefix,
                    available: entries
                        .iter()
                        .filter(|entry| entry.starts_with(&listing))
                        .map(|entry| format!("{}/{}", family_rel, entry))
                        .collect(),
                })
            }
            1 => {
                let found = candidates.remove(0);
                Ok(format!("{}{}/{}", self.topd_rel, family_rel, found))
            }
            _ => Err(ResolveError::Ambiguous {
                prefix,
                candidates: candidates
                    .iter()
                    .map(|entry| format!("{}/{}", family_rel, entry))
                    .collect(),
            }),
        }
    }

    /// Sorted file names in a family directory; a missing directory is
    /// empty.
    fn list_family(&self, family_rel: &str) -> Result<Vec<String>, ResolveError> {
        let dir = self.topd.join(family_rel);
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ResolveError::Io { path: dir, source }),
        };

        let mut names = Vec::new();
        for entry in read {
            let entry = entry.map_err(|source| ResolveError::Io {
                path: dir.clone(),
                source,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GitConfigFile;
    use tempfile::TempDir;

    fn dataset_with(images: &[&str]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for image in images {
            let path = temp_dir.path().join(image);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        temp_dir
    }

    fn image(token: &str) -> ImageRef {
        token.parse().unwrap()
    }

    #[test]
    fn test_unique_prefix_match() {
        let ds = dataset_with(&[
            "images/app/app-tool--1.2.0.sif",
            "images/app/app-tool--1.3.0.sif",
        ]);
        let resolver = TargetResolver::new(ds.path(), "");
        let store = GitConfigFile::default();

        assert_eq!(
            resolver.resolve(&store, &image("app-tool=1.2")).unwrap(),
            "images/app/app-tool--1.2.0.sif"
        );
    }

    #[test]
    fn test_separator_is_required_after_version() {
        let ds = dataset_with(&[
            "images/fs/fs-recon--20.1.3.sif",
            "images/fs/fs-recon--20.10.0.sif",
        ]);
        let resolver = TargetResolver::new(ds.path(), "");
        let store = GitConfigFile::default();

        assert_eq!(
            resolver.resolve(&store, &image("fs-recon=20.1")).unwrap(),
            "images/fs/fs-recon--20.1.3.sif"
        );
    }

    #[test]
    fn test_exact_file_name() {
        let ds = dataset_with(&[
            "images/app/app-tool--1.2.0.sif",
            "images/app/app-tool--1.2.0.sif.bak",
        ]);
        let resolver = TargetResolver::new(ds.path(), "");
        let store = GitConfigFile::default();

        assert_eq!(
            resolver
                .resolve(&store, &image("app-tool=1.2.0.sif"))
                .unwrap(),
            "images/app/app-tool--1.2.0.sif"
        );
    }

    #[test]
    fn test_ambiguous_lists_all_candidates() {
        let ds = dataset_with(&[
            "images/app/app-tool--1.2.0.sif",
            "images/app/app-tool--1.2.1.sif",
        ]);
        let resolver = TargetResolver::new(ds.path(), "");
        let store = GitConfigFile::default();

        match resolver.resolve(&store, &image("app-tool=1.2")) {
            Err(ResolveError::Ambiguous { candidates, .. }) => assert_eq!(
                candidates,
                vec![
                    "images/app/app-tool--1.2.0.sif",
                    "images/app/app-tool--1.2.1.sif"
                ]
            ),
            other => panic!("Expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found_lists_available_images() {
        let ds = dataset_with(&[
            "images/app/app-tool--1.2.0.sif",
            "images/app/app-other--0.1.sif",
        ]);
        let resolver = TargetResolver::new(ds.path(), "");
        let store = GitConfigFile::default();

        let err = resolver.resolve(&store, &image("app-tool=9")).unwrap_err();
        match &err {
            ResolveError::NotFound { available, .. } => {
                assert_eq!(available, &vec!["images/app/app-tool--1.2.0.sif"])
            }
            other => panic!("Expected not found, got {:?}", other),
        }
        assert!(err.to_string().contains("images/app/app-tool--1.2.0.sif"));
    }

    #[test]
    fn test_missing_family_directory() {
        let ds = dataset_with(&[]);
        let resolver = TargetResolver::new(ds.path(), "");
        let store = GitConfigFile::default();

        assert!(matches!(
            resolver.resolve(&store, &image("nothing=1")),
            Err(ResolveError::NotFound { available, .. }) if available.is_empty()
        ));
    }

    #[test]
    fn test_no_version_returns_registered_image() {
        let ds = dataset_with(&[]);
        let store = GitConfigFile::parse(
            "[datalad \"containers.app-tool\"]\n\timage = images/app/app-tool--1.0.sif\n",
        );

        let same = TargetResolver::new(ds.path(), "");
        assert_eq!(
            same.resolve(&store, &image("app-tool")).unwrap(),
            "images/app/app-tool--1.0.sif"
        );

        let nested = TargetResolver::new(ds.path(), "code/containers/");
        assert_eq!(
            nested.resolve(&store, &image("app-tool")).unwrap(),
            "code/containers/images/app/app-tool--1.0.sif"
        );

        assert!(matches!(
            same.resolve(&store, &image("unknown")),
            Err(ResolveError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_match_is_relative_to_save_target() {
        let ds = dataset_with(&["images/app/app-tool--1.2.0.sif"]);
        let resolver = TargetResolver::new(ds.path(), "code/containers/");
        let store = GitConfigFile::default();

        assert_eq!(
            resolver.resolve(&store, &image("app-tool=1.2.0")).unwrap(),
            "code/containers/images/app/app-tool--1.2.0.sif"
        );
    }
}
