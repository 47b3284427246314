//! # Execution Sandbox
//!
//! Runs a container runtime in a clean, reproducible environment:
//!
//! - a per-invocation scratch root replacing the guest's temp dirs, removed
//!   when the plan is dropped (after success, failure or interruption)
//! - a fixed synthetic home shared by all invocations, carrying only a
//!   git identity
//! - the host's working directory bound at the same path
//! - a UTC timezone file bound to `/etc/localtime`
//! - the container name exposed under both runtime env prefixes
//!
//! [`SandboxComposer::compose`] builds a [`SandboxPlan`] for a
//! [`SandboxRequest`] and an [`Engine`]; [`SandboxPlan::run`] executes it
//! and cleans up.

pub mod engine;
pub mod home;
pub mod mount;

pub use engine::{DockerOptions, Engine, Invocation};
pub use home::{Identity, RetryPolicy, SyntheticHome};
pub use mount::MountStrategy;

use crate::env::{self, sandbox as names, vars};
use crate::executor::{CommandRunner, ExecutionCommand, ExecutorError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors while composing or running a sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// No runtime subcommand given
    #[error("missing runtime subcommand (e.g. run, exec, shell)")]
    MissingSubcommand,

    /// Neither singularity nor docker is available
    #[error("no container runtime found on PATH (docker requested: {use_docker})")]
    NoRuntime { use_docker: bool },

    /// Filesystem error while preparing the sandbox
    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Runtime could not be run
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl SandboxError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingSubcommand => 2,
            _ => 1,
        }
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Sandbox settings from the tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Image used by the Docker engine
    pub docker_image: String,
    /// Identity used when the caller has no git identity
    pub fallback_user_name: String,
    pub fallback_user_email: String,
    /// Attempts at writing the synthetic home's identity
    pub identity_attempts: u32,
    /// Upper bound of the random pause between attempts
    pub max_backoff_ms: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            docker_image: names::DEFAULT_DOCKER_IMAGE.to_string(),
            fallback_user_name: "ReproNim User".to_string(),
            fallback_user_email: "nobody@example.com".to_string(),
            identity_attempts: 5,
            max_backoff_ms: 1000,
        }
    }
}

/// Environment variables the sandbox reacts to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxEnv {
    pub container_name: Option<String>,
    pub use_docker: bool,
    pub docker_extra_opts: Vec<String>,
    pub subcommand_override: Option<String>,
    pub containers_root: Option<PathBuf>,
    /// Caller's home, for the ambient git identity
    pub user_home: Option<PathBuf>,
}

impl SandboxEnv {
    /// Read the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read variables through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        Self {
            container_name: get(vars::CONTAINER_NAME),
            use_docker: get(vars::USE_DOCKER).is_some_and(|value| is_truthy(&value)),
            docker_extra_opts: get(vars::DOCKER_EXTRA_OPTS)
                .map(|opts| opts.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            subcommand_override: get(vars::SINGULARITY_CMD),
            containers_root: get(vars::CONTAINERS_ROOT).map(PathBuf::from),
            user_home: get("HOME").map(PathBuf::from),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// One sandboxed runtime invocation.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// Runtime subcommand (run, exec, shell, ...)
    pub subcommand: String,
    /// Arguments passed through after the sandbox arguments
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: SandboxEnv,
    /// Whether a terminal is attached
    pub interactive: bool,
}

impl SandboxRequest {
    /// Build a request from the command line arguments (without the
    /// program name). The subcommand override, when set, makes every
    /// argument a passthrough one.
    pub fn from_argv(
        argv: Vec<String>,
        cwd: PathBuf,
        env: SandboxEnv,
    ) -> Result<Self, SandboxError> {
        let mut argv = argv.into_iter();
        let subcommand = match env.subcommand_override.clone() {
            Some(subcommand) => subcommand,
            None => argv.next().ok_or(SandboxError::MissingSubcommand)?,
        };
        Ok(Self {
            subcommand,
            args: argv.collect(),
            cwd,
            env,
            interactive: false,
        })
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }
}

/// Composes sandboxed invocations for one containers root.
#[derive(Debug, Clone)]
pub struct SandboxComposer {
    root: PathBuf,
    settings: SandboxSettings,
}

impl SandboxComposer {
    pub fn new(root: impl Into<PathBuf>, settings: SandboxSettings) -> Self {
        Self {
            root: root.into(),
            settings,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prepare the sandbox for `request` and build the runtime command.
    ///
    /// The scratch root exists from here on and belongs to the returned
    /// plan. An error after its creation, or dropping the future while it
    /// waits for the identity lock, removes it again.
    pub async fn compose(
        &self,
        request: &SandboxRequest,
        engine: &Engine,
    ) -> Result<SandboxPlan, SandboxError> {
        let scratch = create_scratch()?;
        debug!("Scratch root: {:?}", scratch.path());

        let home = SyntheticHome::new(env::synthetic_home_path(&self.root));
        home.prepare().map_err(SandboxError::io(home.path()))?;
        let identity = Identity::ambient(request.env.user_home.as_deref(), &self.settings);
        home.ensure_identity(&identity, RetryPolicy::from(&self.settings))
            .await;

        let (command, strategy) = self.command_for(request, engine, home.path(), scratch.path())?;
        Ok(SandboxPlan {
            command,
            strategy,
            scratch,
        })
    }

    /// Runtime command for `request` once the home and scratch root exist.
    fn command_for(
        &self,
        request: &SandboxRequest,
        engine: &Engine,
        home: &Path,
        scratch: &Path,
    ) -> Result<(ExecutionCommand, MountStrategy), SandboxError> {
        let strategy = MountStrategy::choose(&request.cwd, &self.root);
        let mount_args = strategy
            .arguments(scratch)
            .map_err(SandboxError::io(scratch))?;
        debug!("Mount strategy: {:?}", strategy);

        let timezone = self.timezone_file();
        let cwd = request.cwd.display().to_string();

        let mut runtime_args = vec![
            request.subcommand.clone(),
            "--cleanenv".to_string(),
            "-B".to_string(),
            cwd.clone(),
            "--home".to_string(),
            home.display().to_string(),
            "--pwd".to_string(),
            cwd,
        ];
        runtime_args.extend(mount_args);
        runtime_args.push("-B".to_string());
        runtime_args.push(format!(
            "{}:{}",
            timezone.display(),
            names::GUEST_LOCALTIME
        ));
        runtime_args.extend(request.args.iter().cloned());

        let invocation = Invocation {
            runtime_args,
            guest_env: request
                .env
                .container_name
                .iter()
                .map(|name| (vars::CONTAINER_NAME.to_string(), name.clone()))
                .collect(),
            host_paths: vec![
                request.cwd.clone(),
                home.to_path_buf(),
                scratch.to_path_buf(),
                timezone,
            ],
            cwd: request.cwd.clone(),
        };
        let docker = DockerOptions {
            image: self.settings.docker_image.clone(),
            extra_opts: request.env.docker_extra_opts.clone(),
            interactive: request.interactive,
        };

        Ok((engine.command(&invocation, &docker), strategy))
    }

    /// Timezone file shipped with the containers root, else the system one.
    fn timezone_file(&self) -> PathBuf {
        let shipped = env::timezone_file_path(&self.root);
        if shipped.is_file() {
            shipped
        } else {
            PathBuf::from(names::SYSTEM_TIMEZONE_FILE)
        }
    }
}

/// Base directory for scratch roots. Kept short on macOS, where the
/// default temp dir makes socket paths inside the guest too long.
fn scratch_base() -> PathBuf {
    if cfg!(target_os = "macos") {
        PathBuf::from("/tmp")
    } else {
        std::env::temp_dir()
    }
}

fn create_scratch() -> Result<TempDir, SandboxError> {
    let base = scratch_base();
    tempfile::Builder::new()
        .prefix(names::SCRATCH_PREFIX)
        .tempdir_in(&base)
        .map_err(SandboxError::io(&base))
}

/// A composed invocation owning its scratch root.
#[derive(Debug)]
pub struct SandboxPlan {
    pub command: ExecutionCommand,
    pub strategy: MountStrategy,
    scratch: TempDir,
}

impl SandboxPlan {
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Run the command through `runner`, then remove the scratch root.
    ///
    /// Returns the runtime's exit code.
    pub async fn run(self, runner: &dyn CommandRunner) -> Result<i32, SandboxError> {
        info!("Running: {}", self.command.display());
        let result = runner.run(self.command).await;

        let scratch = self.scratch.path().to_path_buf();
        if let Err(e) = self.scratch.close() {
            warn!("Failed to remove scratch root {:?}: {}", scratch, e);
        }

        Ok(result?)
    }
}
