//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Explicit file: `$CONTAINERS_TOOLS_CONFIG`
//! 2. Current directory: ./containers-tools.toml or ./.containers-tools/config.toml
//! 3. User config: ~/.containers-tools/config.toml
//! 4. System config: /etc/containers-tools/config.toml
//! 5. Built-in defaults

use crate::env;
use crate::freeze::FreezeSettings;
use crate::sandbox::SandboxSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Containers dataset; overridden by `$REPRONIM_CONTAINERS_ROOT`
    pub containers_root: Option<PathBuf>,
    pub freeze: FreezeSettings,
    pub sandbox: SandboxSettings,
}

impl ToolsConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid configuration file {:?}", path))
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<ToolsConfig> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return ToolsConfig::from_toml_file(config_path);
        }

        debug!("No configuration file found, using defaults");
        Ok(ToolsConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    ///
    /// An explicitly named file is returned even when missing, so that
    /// loading it reports the problem instead of silently using defaults.
    pub fn find_config_file() -> Option<PathBuf> {
        if let Some(explicit) = std_env::var_os(env::vars::TOOLS_CONFIG).filter(|v| !v.is_empty())
        {
            return Some(PathBuf::from(explicit));
        }

        let current_dir = std_env::current_dir().ok();
        let candidates = Self::get_config_candidates(
            current_dir.as_deref(),
            Self::get_home_dir().as_deref(),
        );

        for candidate in candidates {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates(current_dir: Option<&Path>, home_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = current_dir {
            candidates.push(current_dir.join(env::LOCAL_CONFIG_FILE_NAME));
            candidates.push(env::local_config_file_path(current_dir));
        }

        if let Some(home_dir) = home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from("/etc/containers-tools/config.toml"));

        candidates
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: ToolsConfig = toml::from_str(
            r#"
containers_root = "/data/containers"

[sandbox]
identity_attempts = 2
"#,
        )
        .unwrap();

        assert_eq!(config.containers_root, Some(PathBuf::from("/data/containers")));
        assert_eq!(config.sandbox.identity_attempts, 2);
        assert_eq!(config.sandbox.max_backoff_ms, 1000);
        assert_eq!(config.sandbox.docker_image, "repronim/containers:latest");
        assert_eq!(config.freeze.marker, "frozen");
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("containers-tools.toml");

        let mut original = ToolsConfig::default();
        original.freeze.marker = "pinned".to_string();
        fs::write(&config_path, toml::to_string_pretty(&original).unwrap()).unwrap();

        let loaded = ToolsConfig::from_toml_file(&config_path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.toml");
        fs::write(&config_path, "containers_root = [").unwrap();

        let err = ToolsConfig::from_toml_file(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.toml"));
    }

    #[test]
    fn test_config_candidates() {
        let candidates = ConfigDiscovery::get_config_candidates(
            Some(Path::new("/work")),
            Some(Path::new("/home/user")),
        );

        assert_eq!(candidates[0], Path::new("/work/containers-tools.toml"));
        assert_eq!(candidates[1], Path::new("/work/.containers-tools/config.toml"));
        assert_eq!(
            candidates[2],
            Path::new("/home/user/.containers-tools/config.toml")
        );
    }
}
