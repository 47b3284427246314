//! `singularity-cmd` command line.
//!
//! Everything after the program name belongs to the container runtime, so
//! the parser claims no flags of its own.

use super::ToolsConfig;
use crate::executor::{CommandRunner, interrupted};
use crate::sandbox::{Engine, SandboxComposer, SandboxEnv, SandboxError, SandboxRequest};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "singularity-cmd")]
#[command(about = "Run singularity in a clean, reproducible sandbox")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct SandboxArgs {
    /// Runtime subcommand followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    pub argv: Vec<String>,
}

/// Containers root: the environment override, the configured root, or the
/// parent of the directory holding the executable (`<root>/scripts/`).
pub fn containers_root(env: &SandboxEnv, config: &ToolsConfig, exe: &Path) -> PathBuf {
    env.containers_root
        .clone()
        .or_else(|| config.containers_root.clone())
        .unwrap_or_else(|| {
            exe.parent()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/"))
        })
}

/// Run `singularity-cmd` with already parsed arguments.
///
/// Returns the runtime's exit code. An interruption while the sandbox is
/// being prepared drops the unfinished plan, scratch root included, and
/// yields the signal's exit code.
pub async fn run(
    args: SandboxArgs,
    config: &ToolsConfig,
    runner: &dyn CommandRunner,
) -> Result<i32, SandboxError> {
    let env = SandboxEnv::from_env();
    let cwd = std::env::current_dir().map_err(|source| SandboxError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    let exe = std::env::current_exe().map_err(|source| SandboxError::Io {
        path: PathBuf::from("singularity-cmd"),
        source,
    })?;

    let root = containers_root(&env, config, &exe);
    let request = SandboxRequest::from_argv(args.argv, cwd, env)?
        .with_interactive(std::io::stdin().is_terminal());
    let engine = Engine::discover(request.env.use_docker)?;
    info!("Using {} at {:?}", engine.name(), engine.program());

    let composer = SandboxComposer::new(root, config.sandbox.clone());
    info!("Containers root: {:?}", composer.root());

    // Listeners go in before compose creates the scratch root.
    let plan = tokio::select! {
        biased;
        Ok(interrupt) = interrupted() => {
            warn!("Interrupted ({:?}) while preparing the sandbox", interrupt);
            return Ok(interrupt.exit_code());
        }
        plan = composer.compose(&request, &engine) => plan?,
    };
    plan.run(runner).await
}
