//! Environment constants and path utilities for the container tools.
//!
//! This module centralizes all hardcoded paths, configuration keys and
//! environment variable names used throughout the application, making them
//! easier to maintain and modify.

use std::path::{Path, PathBuf};

/// Dataset metadata directory name (hidden directory like .git)
pub const DATALAD_DIR_NAME: &str = ".datalad";

/// Configuration store file name within the dataset metadata directory
pub const DATASET_CONFIG_FILE_NAME: &str = "config";

/// Directory holding container images, one subdirectory per family
pub const IMAGES_DIR_NAME: &str = "images";

/// Tool configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Tool configuration directory name (in the user's home or current directory)
pub const TOOLS_DIR_NAME: &str = ".containers-tools";

/// Tool configuration file looked up directly in the current directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "containers-tools.toml";

/// Configuration store keys
pub mod keys {
    /// Section holding every container registration
    pub const SECTION: &str = "datalad";

    /// Subsection prefix, followed by the container name
    pub const CONTAINERS_PREFIX: &str = "containers";

    /// Field holding the image path relative to the dataset
    pub const IMAGE_FIELD: &str = "image";

    /// Field holding the execution command template
    pub const CMDEXEC_FIELD: &str = "cmdexec";

    /// Placeholder expanded to the dataset path at execution time
    pub const IMG_DSPATH_PLACEHOLDER: &str = "{img_dspath}";

    /// Default marker appended to frozen image entries
    pub const FROZEN_MARKER: &str = "frozen";
}

/// Sandbox-related directory and file names
pub mod sandbox {
    /// Directory under the containers root with persistent bind sources
    pub const BINDS_DIR_NAME: &str = "binds";

    /// Synthetic home directory name within binds
    pub const HOME_DIR_NAME: &str = "HOME";

    /// Timezone file within binds
    pub const TIMEZONE_FILE: &str = "zoneinfo/UTC";

    /// Host timezone file used when the containers root ships none
    pub const SYSTEM_TIMEZONE_FILE: &str = "/usr/share/zoneinfo/UTC";

    /// Guest path receiving the timezone file
    pub const GUEST_LOCALTIME: &str = "/etc/localtime";

    /// Identity file name within the synthetic home
    pub const GITCONFIG_FILE_NAME: &str = ".gitconfig";

    /// Prefix of per-invocation scratch directories
    pub const SCRATCH_PREFIX: &str = "singtmp.";

    /// Default image used when running through Docker
    pub const DEFAULT_DOCKER_IMAGE: &str = "repronim/containers:latest";
}

/// Environment variable names
pub mod vars {
    /// Overrides the source dataset / containers root
    pub const CONTAINERS_ROOT: &str = "REPRONIM_CONTAINERS_ROOT";

    /// Overrides tool configuration discovery
    pub const TOOLS_CONFIG: &str = "CONTAINERS_TOOLS_CONFIG";

    /// Name of the container being executed
    pub const CONTAINER_NAME: &str = "DATALAD_CONTAINER_NAME";

    /// Forces the Docker engine when set to a truthy value
    pub const USE_DOCKER: &str = "REPRONIM_USE_DOCKER";

    /// Extra options for `docker run`, split on whitespace
    pub const DOCKER_EXTRA_OPTS: &str = "REPRONIM_DOCKER_EXTRAOPTS";

    /// Overrides the runtime subcommand
    pub const SINGULARITY_CMD: &str = "SINGULARITY_CMD";

    /// Guest environment prefixes understood by the two runtime generations
    pub const GUEST_ENV_PREFIXES: [&str; 2] = ["SINGULARITYENV_", "APPTAINERENV_"];
}

/// Build the dataset metadata directory path
pub fn datalad_dir_path(dataset: &Path) -> PathBuf {
    dataset.join(DATALAD_DIR_NAME)
}

/// Build the configuration store path of a dataset
pub fn dataset_config_path(dataset: &Path) -> PathBuf {
    datalad_dir_path(dataset).join(DATASET_CONFIG_FILE_NAME)
}

/// Build the image directory of a family, relative to the dataset root
pub fn family_images_rel(family: &str) -> String {
    format!("{}/{}", IMAGES_DIR_NAME, family)
}

/// Build the binds directory path from a containers root
pub fn binds_dir_path(root: &Path) -> PathBuf {
    root.join(sandbox::BINDS_DIR_NAME)
}

/// Build the synthetic home directory path
pub fn synthetic_home_path(root: &Path) -> PathBuf {
    binds_dir_path(root).join(sandbox::HOME_DIR_NAME)
}

/// Build the timezone file path shipped with the containers root
pub fn timezone_file_path(root: &Path) -> PathBuf {
    binds_dir_path(root).join(sandbox::TIMEZONE_FILE)
}

/// Build the configuration store key of a container field
pub fn container_key(name: &str, field: &str) -> String {
    format!(
        "{}.{}.{}.{}",
        keys::SECTION,
        keys::CONTAINERS_PREFIX,
        name,
        field
    )
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    home_dir.join(TOOLS_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Build local config file path in current directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(TOOLS_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Locate the nearest ancestor of `start` (inclusive) that holds a
/// configuration store.
pub fn find_dataset_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dataset_config_path(dir).is_file())
        .map(Path::to_path_buf)
}
