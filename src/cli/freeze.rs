//! `freeze-versions` command line.

use super::ToolsConfig;
use crate::env;
use crate::executor::CommandRunner;
use crate::freeze::{FreezeError, FreezeOutcome, FreezeRequest, Freezer, ImageRef};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "freeze-versions")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pin dataset container registrations to specific image versions")]
#[command(long_about = None)]
pub struct FreezeArgs {
    /// Ancestor dataset to copy the frozen registrations into and save
    #[arg(long = "save-dataset", value_name = "PATH")]
    pub save_dataset: Option<String>,
    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
    /// Containers to freeze, optionally with a version (prefix)
    #[arg(value_name = "NAME[=VERSION]")]
    pub images: Vec<String>,
}

impl FreezeArgs {
    /// Turn the arguments into a request, resolving paths against `cwd`.
    pub fn to_request(
        &self,
        config: &ToolsConfig,
        env_root: Option<PathBuf>,
        cwd: &Path,
    ) -> Result<FreezeRequest, FreezeError> {
        let save_dataset = match self.save_dataset.as_deref() {
            Some("") => {
                return Err(FreezeError::Usage(
                    "--save-dataset requires a non-empty path".to_string(),
                ));
            }
            Some(path) => Some(cwd.join(path)),
            None => None,
        };

        let images = self
            .images
            .iter()
            .map(|token| token.parse::<ImageRef>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FreezeRequest {
            source: source_dataset(config, env_root, cwd)?,
            save_dataset,
            images,
        })
    }
}

/// Source dataset: the environment override, the configured root, or the
/// nearest dataset containing `cwd`.
pub fn source_dataset(
    config: &ToolsConfig,
    env_root: Option<PathBuf>,
    cwd: &Path,
) -> Result<PathBuf, FreezeError> {
    if let Some(root) = env_root.or_else(|| config.containers_root.clone()) {
        return Ok(cwd.join(root));
    }
    env::find_dataset_root(cwd).ok_or_else(|| FreezeError::MissingConfigStore {
        dataset: cwd.to_path_buf(),
        path: env::dataset_config_path(cwd),
    })
}

/// Run `freeze-versions` with already parsed arguments.
pub async fn run<R: CommandRunner>(
    args: &FreezeArgs,
    config: &ToolsConfig,
    runner: R,
) -> Result<FreezeOutcome, FreezeError> {
    let cwd = std::env::current_dir().map_err(|source| FreezeError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    let env_root = std::env::var_os(env::vars::CONTAINERS_ROOT)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);

    let request = args.to_request(config, env_root, &cwd)?;
    info!("Freezing in dataset {:?}", request.source);

    let outcome = Freezer::new(runner, &config.freeze).run(&request).await?;
    for frozen in &outcome.frozen {
        info!("{} -> {}", frozen.image, frozen.path);
    }
    Ok(outcome)
}
