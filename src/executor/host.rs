//! Native host command execution.
//!
//! Executes commands directly on the host system using `tokio::process::Command`.
//! The child shares the caller's terminal. If the runner itself receives
//! SIGINT, SIGTERM or SIGHUP while waiting, the child is killed and the
//! runner returns normally so that callers can release scoped resources
//! before the process exits.

use super::{CommandRunner, ExecutionCommand, ExecutorError};
use async_trait::async_trait;
use std::process::ExitStatus;
use tokio::process::Command;
use tracing::{debug, warn};

/// Executes commands directly on the host system
#[derive(Debug, Clone)]
pub struct HostRunner;

impl HostRunner {
    /// Create a new host runner
    pub fn new() -> Self {
        Self
    }
}

impl Default for HostRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal that stopped a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Hangup,
    Interrupt,
    Terminate,
}

impl Interrupt {
    /// Shell convention: 128 plus the signal number.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Hangup => 129,
            Self::Interrupt => 130,
            Self::Terminate => 143,
        }
    }
}

/// Resolves on the first SIGINT, SIGTERM or SIGHUP.
///
/// Listeners are installed on first poll. From then on these signals no
/// longer terminate the process.
#[cfg(unix)]
pub async fn interrupted() -> std::io::Result<Interrupt> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| Interrupt::Interrupt),
        _ = terminate.recv() => Ok(Interrupt::Terminate),
        _ = hangup.recv() => Ok(Interrupt::Hangup),
    }
}

#[cfg(not(unix))]
pub async fn interrupted() -> std::io::Result<Interrupt> {
    tokio::signal::ctrl_c().await.map(|_| Interrupt::Interrupt)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, cmd: ExecutionCommand) -> Result<i32, ExecutorError> {
        debug!("Executing command on host: {}", cmd.display());

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);

        if let Some(ref dir) = cmd.working_dir {
            command.current_dir(dir);
        }

        for (key, value) in &cmd.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| ExecutorError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        tokio::select! {
            status = child.wait() => Ok(exit_code(status?)),
            Ok(interrupt) = interrupted() => {
                warn!("Interrupted ({:?}), stopping {}", interrupt, cmd.program);
                if let Err(e) = child.kill().await {
                    warn!("Failed to stop {}: {}", cmd.program, e);
                }
                Ok(interrupt.exit_code())
            }
        }
    }
}
