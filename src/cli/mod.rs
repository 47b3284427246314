//! CLI-specific functionality for the container tools
//!
//! This module contains the argument parsing and top-level flow of the
//! `freeze-versions` and `singularity-cmd` binaries, configuration
//! discovery and logging setup.

pub mod config;
pub mod freeze;
pub mod sandbox;

pub use config::{ConfigDiscovery, ToolsConfig};
pub use freeze::FreezeArgs;
pub use sandbox::SandboxArgs;

use clap::error::ErrorKind;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber.
///
/// `RUST_LOG` takes precedence; otherwise only warnings are shown, or
/// progress as well with `verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        "containers_tools=info"
    } else {
        "containers_tools=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Exit code for an argument parsing outcome.
pub fn clap_exit_code(err: &clap::Error) -> u8 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        ErrorKind::UnknownArgument => 5,
        _ => 2,
    }
}

/// Process exit code for a child's exit code.
pub fn process_exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
