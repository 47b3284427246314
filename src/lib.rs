//! # Containers Tools
//!
//! Operator tooling for a DataLad dataset of container images:
//!
//! - **`freeze-versions`** pins a dataset's container registrations to
//!   specific image files, in place or copied into an ancestor dataset
//! - **`singularity-cmd`** runs the Singularity runtime (directly or inside
//!   Docker) in a sanitized sandbox with a synthetic home, a private
//!   scratch root and a fixed timezone
//!
//! ## Architecture Overview
//!
//! - **[`store`]**: git-config style configuration store behind the
//!   [`ConfigStore`](store::ConfigStore) trait
//! - **[`freeze`]**: image resolution and registration rewriting
//! - **[`sandbox`]**: sandbox composition and runtime selection
//! - **[`executor`]**: running external programs
//! - **[`cli`]**: argument parsing, configuration discovery and logging
//! - **[`env`]**: paths, keys and variable names
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use containers_tools::executor::HostRunner;
//! use containers_tools::freeze::{FreezeRequest, FreezeSettings, Freezer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let freezer = Freezer::new(HostRunner::new(), &FreezeSettings::default());
//!     let request = FreezeRequest {
//!         source: "/data/containers".into(),
//!         save_dataset: None,
//!         images: vec!["app-tool=1.2".parse()?],
//!     };
//!
//!     let outcome = freezer.run(&request).await?;
//!     println!("Froze {} image(s)", outcome.frozen.len());
//!     Ok(())
//! }
//! ```

/// Command line layer of both binaries.
pub mod cli;

/// Environment constants and path utilities.
pub mod env;

/// External program execution.
pub mod executor;

/// Container version freezing.
///
/// Resolves `name[=version]` tokens to image files and records them in a
/// dataset's configuration store.
pub mod freeze;

/// Sanitized container runtime invocation.
pub mod sandbox;

/// Configuration store abstraction and its git-config file backend.
pub mod store;

pub use freeze::{FreezeError, Freezer, ImageRef};
pub use sandbox::{Engine, SandboxComposer, SandboxError};
pub use store::{ConfigStore, GitConfigFile, StoreError};
