//! # Command Execution Layer
//!
//! Both tools end by handing control to an external program: the freezer
//! records its work with `datalad save`, the sandbox hands the terminal to
//! the container runtime. This module gives those invocations one shape.
//!
//! ## Core Components
//!
//! - **[`ExecutionCommand`]**: program, arguments, working directory and
//!   extra environment
//! - **[`CommandRunner`]**: async trait running a command to completion and
//!   reporting its exit code
//! - **[`HostRunner`]**: runs commands on the host with inherited stdio and
//!   forwards interruption to the child
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use containers_tools::executor::{CommandRunner, ExecutionCommand, HostRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = HostRunner::new();
//!     let command = ExecutionCommand::new("echo", vec!["hello".to_string()]);
//!
//!     let code = runner.run(command).await?;
//!     println!("Exit code: {}", code);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;

/// Host-based command execution.
///
/// Implements [`HostRunner`] on top of `tokio::process::Command`.
pub mod host;

pub use host::{HostRunner, Interrupt, interrupted};

/// Command to execute
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionCommand {
    /// Program name or path to execute
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Working directory for command execution
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set on top of the inherited environment
    pub env: HashMap<String, String>,
}

impl ExecutionCommand {
    /// Create a new command with just program and args
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-quoted command line, for logs and dry runs
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| shell_escape::escape(Cow::from(part.as_str())).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Errors during command execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Program could not be started
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// I/O error while waiting for the program
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Runs commands to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` and return its exit code.
    ///
    /// A child killed by a signal reports `128 + signal`; an interrupted
    /// runner reports the code of the signal it received.
    async fn run(&self, command: ExecutionCommand) -> Result<i32, ExecutorError>;
}
