//! Synthetic home directory shared by all sandbox invocations.
//!
//! The directory persists across runs and only carries a minimal git
//! identity. Concurrent invocations may race on its `.gitconfig`, so the
//! identity write is retried with a random pause instead of failing.

use super::SandboxSettings;
use crate::env;
use crate::store::{ConfigStore, GitConfigFile, StoreError};
use rand::Rng;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const NAME_KEY: &str = "user.name";
const EMAIL_KEY: &str = "user.email";

/// Git identity written into the synthetic home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    /// Identity of the caller, read from their git configuration under
    /// `user_home`, with the configured placeholders for missing parts.
    pub fn ambient(user_home: Option<&Path>, settings: &SandboxSettings) -> Self {
        let stores: Vec<GitConfigFile> = user_home
            .map(|home| {
                [
                    home.join(env::sandbox::GITCONFIG_FILE_NAME),
                    home.join(".config/git/config"),
                ]
                .into_iter()
                .filter(|path| path.is_file())
                .filter_map(|path| GitConfigFile::open(path).ok())
                .collect()
            })
            .unwrap_or_default();

        let lookup = |key: &str| {
            stores
                .iter()
                .find_map(|store| store.get(key).ok().flatten())
        };

        Self {
            name: lookup(NAME_KEY).unwrap_or_else(|| settings.fallback_user_name.clone()),
            email: lookup(EMAIL_KEY).unwrap_or_else(|| settings.fallback_user_email.clone()),
        }
    }
}

/// Bounded retry with a random pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    fn pause(&self) -> Duration {
        let max = u64::try_from(self.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=max))
    }
}

impl From<&SandboxSettings> for RetryPolicy {
    fn from(settings: &SandboxSettings) -> Self {
        Self {
            attempts: settings.identity_attempts.max(1),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }
}

/// The fixed home directory bound into every sandbox.
#[derive(Debug, Clone)]
pub struct SyntheticHome {
    dir: PathBuf,
}

impl SyntheticHome {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Identity file inside the home.
    pub fn gitconfig_path(&self) -> PathBuf {
        self.dir.join(env::sandbox::GITCONFIG_FILE_NAME)
    }

    /// Create the directory if needed.
    pub fn prepare(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    /// Make sure the home has a git identity.
    ///
    /// Returns whether an identity is in place afterwards. Giving up after
    /// the last attempt only logs a warning.
    pub async fn ensure_identity(&self, identity: &Identity, policy: RetryPolicy) -> bool {
        for attempt in 1..=policy.attempts {
            match self.write_identity(identity) {
                Ok(written) => {
                    if written {
                        debug!("Wrote identity to {:?}", self.gitconfig_path());
                    }
                    return true;
                }
                Err(e) => {
                    debug!("Identity write attempt {} failed: {}", attempt, e);
                    if attempt < policy.attempts {
                        tokio::time::sleep(policy.pause()).await;
                    }
                }
            }
        }

        warn!(
            "Could not write identity to {:?} after {} attempts, continuing without it",
            self.gitconfig_path(),
            policy.attempts
        );
        false
    }

    /// Fill in missing identity fields; returns whether the file changed.
    fn write_identity(&self, identity: &Identity) -> Result<bool, StoreError> {
        let mut store = GitConfigFile::open(self.gitconfig_path())?;
        let mut changed = false;

        for (key, value) in [(NAME_KEY, &identity.name), (EMAIL_KEY, &identity.email)] {
            if store.get(key)?.is_none() {
                store.replace_all(key, value)?;
                changed = true;
            }
        }

        if changed {
            store.save()?;
        }
        Ok(changed)
    }
}
