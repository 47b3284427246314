//! Placement of the scratch root inside the guest.

use std::fs;
use std::io;
use std::path::Path;

/// How the per-invocation scratch root replaces the guest's temp dirs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStrategy {
    /// Runtime-native `--contain --workdir <scratch>`.
    Contain,
    /// Explicit binds of `<scratch>/tmp` and `<scratch>/var/tmp`.
    ///
    /// Used when the working directory or the containers root is itself
    /// under `/tmp`: the contained `/tmp` would shadow it, which some
    /// Singularity 3.x releases get wrong.
    ManualBinds,
}

impl MountStrategy {
    /// Pick the strategy for a working directory and containers root.
    pub fn choose(cwd: &Path, root: &Path) -> Self {
        if under_tmp(cwd) || under_tmp(root) {
            Self::ManualBinds
        } else {
            Self::Contain
        }
    }

    /// Runtime arguments for `scratch`, creating bind sources as needed.
    pub fn arguments(&self, scratch: &Path) -> io::Result<Vec<String>> {
        match self {
            Self::Contain => Ok(vec![
                "--contain".to_string(),
                "--workdir".to_string(),
                scratch.display().to_string(),
            ]),
            Self::ManualBinds => {
                let mut args = Vec::with_capacity(4);
                for guest in ["/tmp", "/var/tmp"] {
                    let host = scratch.join(guest.trim_start_matches('/'));
                    fs::create_dir_all(&host)?;
                    args.push("-B".to_string());
                    args.push(format!("{}:{}", host.display(), guest));
                }
                Ok(args)
            }
        }
    }
}

fn under_tmp(path: &Path) -> bool {
    path.starts_with("/tmp")
}
