//! Freezing of container image versions.
//!
//! A container registered in a dataset usually follows whatever image the
//! dataset currently ships. Freezing pins it: each `name[=version]` token is
//! resolved to one image file and written to the dataset's configuration
//! store, either in place (marked with `# frozen` so a later automated
//! upgrade of that line conflicts) or copied into an ancestor dataset with
//! all paths shifted accordingly.
//!
//! ## Components
//!
//! - [`TargetResolver`]: image reference to image path
//! - [`ConfigRewriter`]: writes the resolved path (and related keys)
//! - [`DatasetRelation`]: pre-flight checks and the relative prefix
//! - [`Freezer`]: runs the whole procedure for a list of tokens
//!
//! Tokens are processed in order; a failing token aborts the run without
//! undoing the writes of earlier ones.

mod dataset;
mod resolver;
mod rewriter;

pub use dataset::DatasetRelation;
pub use resolver::{ResolveError, TargetResolver};
pub use rewriter::{ConfigRewriter, RewriteMode, RewriteSummary, rewrite_cmdexec};

use crate::env::{self, keys};
use crate::executor::{CommandRunner, ExecutionCommand, ExecutorError};
use crate::store::{GitConfigFile, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Errors of the freezing procedure.
#[derive(Debug, Error)]
pub enum FreezeError {
    /// Bad or missing command line input
    #[error("{0}")]
    Usage(String),

    /// Unrecognized command line option
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// Dataset has no configuration store
    #[error("'{}' is not a dataset: {} does not exist", dataset.display(), path.display())]
    MissingConfigStore { dataset: PathBuf, path: PathBuf },

    /// Source dataset does not live under the save dataset
    #[error(
        "dataset '{}' is not located under the save dataset '{}'",
        dataset.display(),
        save_dataset.display()
    )]
    NotDescendant {
        dataset: PathBuf,
        save_dataset: PathBuf,
    },

    /// Image reference could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Configuration store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Save command could not be run
    #[error("failed to record the change: {0}")]
    Executor(#[from] ExecutorError),

    /// Save command failed
    #[error("saving dataset '{}' failed with exit code {code}", dataset.display())]
    SaveFailed { dataset: PathBuf, code: i32 },

    /// IO error
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FreezeError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) | Self::NotDescendant { .. } => 2,
            Self::Executor(_) | Self::SaveFailed { .. } => 3,
            Self::MissingConfigStore { .. } => 4,
            Self::UnknownOption(_) => 5,
            Self::Resolve(_) | Self::Store(_) | Self::Io { .. } => 1,
        }
    }
}

/// An image name with an optional version (exact or prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub version: Option<String>,
}

impl ImageRef {
    /// Family directory of the image: the first hyphen-delimited segment of
    /// the name.
    pub fn family(&self) -> &str {
        self.name.split('-').next().unwrap_or(&self.name)
    }
}

impl FromStr for ImageRef {
    type Err = FreezeError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (name, version) = match token.split_once('=') {
            Some((name, version)) => (name, (!version.is_empty()).then(|| version.to_string())),
            None => (token, None),
        };
        if name.is_empty() {
            return Err(FreezeError::Usage(format!(
                "invalid image reference '{}': missing name",
                token
            )));
        }
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}={}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Freezing settings from the tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreezeSettings {
    /// Comment text appended to in-place frozen entries
    pub marker: String,
}

impl Default for FreezeSettings {
    fn default() -> Self {
        Self {
            marker: keys::FROZEN_MARKER.to_string(),
        }
    }
}

/// One freezing run.
#[derive(Debug, Clone)]
pub struct FreezeRequest {
    /// Source dataset holding the images
    pub source: PathBuf,
    /// Dataset to copy the frozen registrations into and save
    pub save_dataset: Option<PathBuf>,
    /// Images to freeze, in order
    pub images: Vec<ImageRef>,
}

/// A frozen image and the path recorded for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenImage {
    pub image: ImageRef,
    pub path: String,
}

/// Result of a freezing run.
#[derive(Debug, Clone)]
pub struct FreezeOutcome {
    pub frozen: Vec<FrozenImage>,
    /// Configuration store that was modified
    pub config_path: PathBuf,
    /// Whether the save command ran
    pub saved: bool,
}

/// Runs the freezing procedure.
pub struct Freezer<R: CommandRunner> {
    runner: R,
    rewriter: ConfigRewriter,
}

impl<R: CommandRunner> Freezer<R> {
    /// Create a freezer recording saves through `runner`.
    pub fn new(runner: R, settings: &FreezeSettings) -> Self {
        Self {
            runner,
            rewriter: ConfigRewriter::new(settings.marker.clone()),
        }
    }

    /// Resolve and write every image of `request`, then save the target
    /// dataset when one was given.
    ///
    /// # Errors
    ///
    /// Pre-flight errors abort before anything is written. Resolution and
    /// store errors abort at the failing image; earlier images stay written.
    pub async fn run(&self, request: &FreezeRequest) -> Result<FreezeOutcome, FreezeError> {
        if request.images.is_empty() {
            return Err(FreezeError::Usage(
                "no images given, expected NAME or NAME=VERSION".to_string(),
            ));
        }

        let relation =
            DatasetRelation::establish(&request.source, request.save_dataset.as_deref())?;
        let mut source = GitConfigFile::open(env::dataset_config_path(relation.source()))?;
        let mut target = if relation.is_same_dataset() {
            None
        } else {
            Some(GitConfigFile::open(env::dataset_config_path(
                relation.target_root(),
            ))?)
        };

        let resolver = TargetResolver::new(relation.source(), relation.topd_rel());
        let mut frozen = Vec::with_capacity(request.images.len());

        for image in &request.images {
            let path = resolver.resolve(&source, image)?;
            let summary = match target.as_mut() {
                None => {
                    let summary =
                        self.rewriter
                            .apply(&mut source, &image.name, &path, RewriteMode::InPlace)?;
                    source.save()?;
                    summary
                }
                Some(target) => {
                    let mode = RewriteMode::CopyInto {
                        source: &source,
                        topd_rel: relation.topd_rel(),
                    };
                    let summary = self.rewriter.apply(target, &image.name, &path, mode)?;
                    target.save()?;
                    summary
                }
            };
            info!(
                "Froze {} at {} ({} keys written)",
                image,
                path,
                summary.keys_written.len()
            );
            frozen.push(FrozenImage {
                image: image.clone(),
                path,
            });
        }

        let mut saved = false;
        if let Some(dataset) = relation.save_target() {
            let command = save_command(dataset, &request.images);
            info!("Recording change: {}", command.display());
            let code = self.runner.run(command).await?;
            if code != 0 {
                return Err(FreezeError::SaveFailed {
                    dataset: dataset.to_path_buf(),
                    code,
                });
            }
            saved = true;
        }

        Ok(FreezeOutcome {
            frozen,
            config_path: env::dataset_config_path(relation.target_root()),
            saved,
        })
    }
}

/// Command recording the configuration change in `dataset`.
pub fn save_command(dataset: &Path, images: &[ImageRef]) -> ExecutionCommand {
    let tokens: Vec<String> = images.iter().map(ToString::to_string).collect();
    ExecutionCommand::new(
        "datalad",
        vec![
            "save".to_string(),
            "-d".to_string(),
            dataset.to_string_lossy().into_owned(),
            "-m".to_string(),
            format!("Freeze container versions {}", tokens.join(" ")),
            env::dataset_config_path(dataset)
                .to_string_lossy()
                .into_owned(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_refs() {
        let plain: ImageRef = "bids-validator".parse().unwrap();
        assert_eq!(plain.name, "bids-validator");
        assert!(plain.version.is_none());
        assert_eq!(plain.family(), "bids");

        let versioned: ImageRef = "app-tool=1.2.0".parse().unwrap();
        assert_eq!(versioned.version.as_deref(), Some("1.2.0"));
        assert_eq!(versioned.to_string(), "app-tool=1.2.0");

        let empty_version: ImageRef = "app-tool=".parse().unwrap();
        assert!(empty_version.version.is_none());

        let single: ImageRef = "fmriprep=20.1".parse().unwrap();
        assert_eq!(single.family(), "fmriprep");
    }

    #[test]
    fn test_missing_name_is_usage_error() {
        let err = "=1.0".parse::<ImageRef>().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(FreezeError::UnknownOption("--x".into()).exit_code(), 5);
        assert_eq!(
            FreezeError::MissingConfigStore {
                dataset: PathBuf::from("/d"),
                path: PathBuf::from("/d/.datalad/config"),
            }
            .exit_code(),
            4
        );
        assert_eq!(
            FreezeError::NotDescendant {
                dataset: PathBuf::from("/a"),
                save_dataset: PathBuf::from("/b"),
            }
            .exit_code(),
            2
        );
        assert_eq!(
            FreezeError::Resolve(ResolveError::NotRegistered {
                name: "x".to_string()
            })
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_save_command() {
        let images = vec![
            "app-tool=1.2.0".parse().unwrap(),
            "bids-validator".parse().unwrap(),
        ];
        let command = save_command(Path::new("/data/study"), &images);

        assert_eq!(command.program, "datalad");
        assert_eq!(
            command.args,
            vec![
                "save",
                "-d",
                "/data/study",
                "-m",
                "Freeze container versions app-tool=1.2.0 bids-validator",
                "/data/study/.datalad/config",
            ]
        );
    }
}
