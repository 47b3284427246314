//! Integration tests for CLI functionality
//!
//! These tests run the `freeze-versions` binary and check its exit codes
//! and effects. Unit tests for individual functions are located in the
//! respective module files.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const REGISTRATION: &str = "\
[datalad \"containers.app-tool\"]
\timage = images/app/app-tool--1.0.sif
";

fn create_dataset(root: &Path) {
    fs::create_dir_all(root.join(".datalad")).unwrap();
    fs::write(root.join(".datalad/config"), REGISTRATION).unwrap();
    for image in ["app-tool--1.0.sif", "app-tool--1.2.0.sif"] {
        let path = root.join("images/app").join(image);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }
}

fn freeze_versions(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_freeze-versions"))
        .args(args)
        .current_dir(cwd)
        .env("HOME", cwd)
        .env_remove("REPRONIM_CONTAINERS_ROOT")
        .env_remove("CONTAINERS_TOOLS_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run freeze-versions")
}

#[test]
fn test_freeze_from_dataset_subdirectory() {
    let temp_dir = TempDir::new().unwrap();
    create_dataset(temp_dir.path());
    let nested = temp_dir.path().join("images/app");

    let output = freeze_versions(&nested, &["app-tool=1.2.0"]);

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let config = fs::read_to_string(temp_dir.path().join(".datalad/config")).unwrap();
    assert!(config.contains("\timage = images/app/app-tool--1.2.0.sif # frozen\n"));
}

#[test]
fn test_environment_root_override() {
    let temp_dir = TempDir::new().unwrap();
    let dataset = temp_dir.path().join("containers");
    create_dataset(&dataset);
    let elsewhere = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_freeze-versions"))
        .arg("app-tool=1.2")
        .current_dir(elsewhere.path())
        .env("HOME", elsewhere.path())
        .env("REPRONIM_CONTAINERS_ROOT", &dataset)
        .env_remove("CONTAINERS_TOOLS_CONFIG")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let config = fs::read_to_string(dataset.join(".datalad/config")).unwrap();
    assert!(config.contains("app-tool--1.2.0.sif # frozen"));
}

#[test]
fn test_usage_exit_codes() {
    let temp_dir = TempDir::new().unwrap();
    create_dataset(temp_dir.path());

    let unknown = freeze_versions(temp_dir.path(), &["--frobnicate", "app-tool"]);
    assert_eq!(unknown.status.code(), Some(5));

    let empty_save = freeze_versions(temp_dir.path(), &["--save-dataset=", "app-tool"]);
    assert_eq!(empty_save.status.code(), Some(2));

    let no_images = freeze_versions(temp_dir.path(), &[]);
    assert_eq!(no_images.status.code(), Some(2));

    let help = freeze_versions(temp_dir.path(), &["--help"]);
    assert_eq!(help.status.code(), Some(0));

    // Nothing was written
    let config = fs::read_to_string(temp_dir.path().join(".datalad/config")).unwrap();
    assert_eq!(config, REGISTRATION);
}

#[test]
fn test_resolution_and_dataset_exit_codes() {
    let temp_dir = TempDir::new().unwrap();
    let dataset = temp_dir.path().join("containers");
    create_dataset(&dataset);

    let not_found = freeze_versions(&dataset, &["app-tool=3"]);
    assert_eq!(not_found.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&not_found.stderr);
    assert!(stderr.contains("images/app/app-tool--1.0.sif"));
    assert!(stderr.contains("images/app/app-tool--1.2.0.sif"));

    // Parent directory is not a dataset
    let missing_store = freeze_versions(&dataset, &["--save-dataset=..", "app-tool=1.2"]);
    assert_eq!(missing_store.status.code(), Some(4));

    let outside = TempDir::new().unwrap();
    fs::create_dir_all(outside.path().join(".datalad")).unwrap();
    fs::write(outside.path().join(".datalad/config"), "").unwrap();
    let save_dataset = format!("--save-dataset={}", outside.path().display());
    let not_descendant = freeze_versions(&dataset, &[&save_dataset, "app-tool=1.2"]);
    assert_eq!(not_descendant.status.code(), Some(2));
}

#[test]
fn test_config_file_marker() {
    let temp_dir = TempDir::new().unwrap();
    create_dataset(temp_dir.path());
    fs::write(
        temp_dir.path().join("containers-tools.toml"),
        "[freeze]\nmarker = \"pinned\"\n",
    )
    .unwrap();

    let output = freeze_versions(temp_dir.path(), &["app-tool=1.2.0"]);

    assert_eq!(output.status.code(), Some(0));
    let config = fs::read_to_string(temp_dir.path().join(".datalad/config")).unwrap();
    assert!(config.contains("app-tool--1.2.0.sif # pinned"));
}
