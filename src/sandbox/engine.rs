//! Container runtime selection and command construction.

use super::SandboxError;
use crate::env::vars;
use crate::executor::ExecutionCommand;
use std::path::{Path, PathBuf};
use tracing::debug;
use which::which;

/// Runtime executables tried in order for the native engine.
const SINGULARITY_PROGRAMS: [&str; 2] = ["singularity", "apptainer"];
const DOCKER_PROGRAM: &str = "docker";

/// Container runtime chosen for an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    /// Singularity or Apptainer on the host
    Singularity(PathBuf),
    /// Singularity inside a privileged Docker container
    Docker(PathBuf),
}

/// Runtime-independent part of a sandboxed invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Arguments for the singularity runtime, subcommand first
    pub runtime_args: Vec<String>,
    /// Variables to expose in the guest, without runtime prefix
    pub guest_env: Vec<(String, String)>,
    /// Host paths the runtime refers to
    pub host_paths: Vec<PathBuf>,
    pub cwd: PathBuf,
}

/// Settings only used by the Docker engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerOptions {
    pub image: String,
    pub extra_opts: Vec<String>,
    /// Attach a terminal to the container
    pub interactive: bool,
}

impl Engine {
    /// Pick the runtime, looking executables up with `find`.
    ///
    /// Singularity (or Apptainer) wins unless `use_docker` is set; Docker is
    /// the fallback in either case.
    pub fn select<F>(use_docker: bool, find: F) -> Result<Self, SandboxError>
    where
        F: Fn(&str) -> Option<PathBuf>,
    {
        if !use_docker {
            if let Some(path) = SINGULARITY_PROGRAMS.iter().find_map(|name| find(name)) {
                return Ok(Self::Singularity(path));
            }
            debug!("No singularity runtime found, trying docker");
        }
        find(DOCKER_PROGRAM)
            .map(Self::Docker)
            .ok_or(SandboxError::NoRuntime { use_docker })
    }

    /// Pick the runtime from executables on `PATH`.
    pub fn discover(use_docker: bool) -> Result<Self, SandboxError> {
        Self::select(use_docker, |name| which(name).ok())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Singularity(_) => "singularity",
            Self::Docker(_) => "docker",
        }
    }

    pub fn program(&self) -> &Path {
        match self {
            Self::Singularity(path) | Self::Docker(path) => path,
        }
    }

    /// Build the command running `invocation` on this engine.
    pub fn command(&self, invocation: &Invocation, docker: &DockerOptions) -> ExecutionCommand {
        let program = self.program().to_string_lossy().into_owned();
        match self {
            Self::Singularity(_) => {
                let mut command = ExecutionCommand::new(program, invocation.runtime_args.clone())
                    .with_working_dir(invocation.cwd.clone());
                for (key, value) in guest_variables(&invocation.guest_env) {
                    command = command.with_env(key, value);
                }
                command
            }
            Self::Docker(_) => {
                let mut args: Vec<String> = ["run", "--rm", "--privileged"]
                    .iter()
                    .map(|arg| arg.to_string())
                    .collect();
                if docker.interactive {
                    args.push("-it".to_string());
                }
                for (key, value) in guest_variables(&invocation.guest_env) {
                    args.push("-e".to_string());
                    args.push(format!("{}={}", key, value));
                }
                for path in &invocation.host_paths {
                    args.push("-v".to_string());
                    args.push(format!("{0}:{0}", path.display()));
                }
                args.push("-w".to_string());
                args.push(invocation.cwd.display().to_string());
                args.extend(docker.extra_opts.iter().cloned());
                args.push(docker.image.clone());
                args.push(SINGULARITY_PROGRAMS[0].to_string());
                args.extend(invocation.runtime_args.iter().cloned());

                ExecutionCommand::new(program, args).with_working_dir(invocation.cwd.clone())
            }
        }
    }
}

/// Every guest variable under each runtime prefix.
fn guest_variables(env: &[(String, String)]) -> Vec<(String, String)> {
    env.iter()
        .flat_map(|(key, value)| {
            vars::GUEST_ENV_PREFIXES
                .iter()
                .map(move |prefix| (format!("{}{}", prefix, key), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finder(available: &'static [&'static str]) -> impl Fn(&str) -> Option<PathBuf> {
        move |name: &str| {
            available
                .iter()
                .any(|candidate| *candidate == name)
                .then(|| PathBuf::from(format!("/usr/bin/{}", name)))
        }
    }

    fn invocation() -> Invocation {
        Invocation {
            runtime_args: vec![
                "exec".to_string(),
                "--cleanenv".to_string(),
                "image.sif".to_string(),
            ],
            guest_env: vec![(
                "DATALAD_CONTAINER_NAME".to_string(),
                "app-tool".to_string(),
            )],
            host_paths: vec![PathBuf::from("/data/study"), PathBuf::from("/opt/HOME")],
            cwd: PathBuf::from("/data/study"),
        }
    }

    fn docker_options() -> DockerOptions {
        DockerOptions {
            image: "repronim/containers:latest".to_string(),
            extra_opts: vec!["--network".to_string(), "none".to_string()],
            interactive: false,
        }
    }

    #[test]
    fn test_engine_selection() {
        assert_eq!(
            Engine::select(false, finder(&["singularity", "docker"])).unwrap(),
            Engine::Singularity(PathBuf::from("/usr/bin/singularity"))
        );
        assert_eq!(
            Engine::select(false, finder(&["apptainer"])).unwrap(),
            Engine::Singularity(PathBuf::from("/usr/bin/apptainer"))
        );
        assert_eq!(
            Engine::select(false, finder(&["docker"])).unwrap(),
            Engine::Docker(PathBuf::from("/usr/bin/docker"))
        );
        assert_eq!(
            Engine::select(true, finder(&["singularity", "docker"])).unwrap(),
            Engine::Docker(PathBuf::from("/usr/bin/docker"))
        );
        assert!(matches!(
            Engine::select(true, finder(&["singularity"])),
            Err(SandboxError::NoRuntime { use_docker: true })
        ));
        assert!(Engine::select(false, finder(&[])).is_err());
    }

    #[test]
    fn test_singularity_command() {
        let engine = Engine::Singularity(PathBuf::from("/usr/bin/singularity"));
        let command = engine.command(&invocation(), &docker_options());

        assert_eq!(command.program, "/usr/bin/singularity");
        assert_eq!(command.args, invocation().runtime_args);
        assert_eq!(command.working_dir, Some(PathBuf::from("/data/study")));
        assert_eq!(
            command
                .env
                .get("SINGULARITYENV_DATALAD_CONTAINER_NAME")
                .map(String::as_str),
            Some("app-tool")
        );
        assert_eq!(
            command
                .env
                .get("APPTAINERENV_DATALAD_CONTAINER_NAME")
                .map(String::as_str),
            Some("app-tool")
        );
    }

    #[test]
    fn test_docker_command() {
        let engine = Engine::Docker(PathBuf::from("/usr/bin/docker"));
        let command = engine.command(&invocation(), &docker_options());

        assert_eq!(command.program, "/usr/bin/docker");
        assert_eq!(
            command.args,
            vec![
                "run",
                "--rm",
                "--privileged",
                "-e",
                "SINGULARITYENV_DATALAD_CONTAINER_NAME=app-tool",
                "-e",
                "APPTAINERENV_DATALAD_CONTAINER_NAME=app-tool",
                "-v",
                "/data/study:/data/study",
                "-v",
                "/opt/HOME:/opt/HOME",
                "-w",
                "/data/study",
                "--network",
                "none",
                "repronim/containers:latest",
                "singularity",
                "exec",
                "--cleanenv",
                "image.sif",
            ]
        );
        assert!(command.env.is_empty());
    }

    #[test]
    fn test_docker_interactive() {
        let engine = Engine::Docker(PathBuf::from("/usr/bin/docker"));
        let options = DockerOptions {
            interactive: true,
            ..docker_options()
        };
        let command = engine.command(&invocation(), &options);
        assert_eq!(command.args[3], "-it");
    }
}
