//! Configuration loading and root folder resolution
//!
//! Tests that manipulate SHELFCAM_ROOT_FOLDER or SHELFCAM_CONFIG are marked
//! #[serial] so they never race on the process environment.

use serial_test::serial;
use shelfcam_common::config::{
    find_config_file, load_or_default, load_toml_config, resolve_root_folder, TomlConfig,
    CONFIG_FILE_ENV, ROOT_FOLDER_ENV,
};
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_env_root_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/shelfcam-env-root");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/shelfcam-toml-root")),
        ..Default::default()
    };
    let root = resolve_root_folder(None, &config);

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(root, PathBuf::from("/tmp/shelfcam-env-root"));
}

#[test]
#[serial]
fn test_toml_root_used_without_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/shelfcam-toml-root")),
        ..Default::default()
    };
    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/tmp/shelfcam-toml-root")
    );
}

#[test]
#[serial]
fn test_default_root_when_nothing_configured() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root = resolve_root_folder(None, &TomlConfig::default());
    assert!(!root.as_os_str().is_empty());
    assert!(root.ends_with("shelfcam") || root.ends_with("shelfcam_data"));
}

#[test]
fn test_load_toml_from_disk() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        "robot_number = \"1\"\n[sorting]\nboxes_per_shelf = 3\nsample_seed = 7\n",
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.robot_number.as_deref(), Some("1"));
    assert_eq!(config.sorting.boxes_per_shelf, Some(3));
    assert_eq!(config.sorting.sample_seed, Some(7));
}

#[test]
fn test_explicit_unparseable_config_is_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "[sorting\nboxes_per_shelf = ").unwrap();

    assert!(load_or_default(Some(&path)).is_err());
}

#[test]
fn test_explicit_missing_config_is_error() {
    assert!(load_or_default(Some(Path::new("/nonexistent/shelfcam.toml"))).is_err());
}

#[test]
#[serial]
fn test_config_env_var_points_to_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("env.toml");
    std::fs::write(&path, "[render]\nframe_rate = 10\n").unwrap();

    env::set_var(CONFIG_FILE_ENV, &path);
    let found = find_config_file(None);
    let config = load_or_default(None).unwrap();
    env::remove_var(CONFIG_FILE_ENV);

    assert_eq!(found, Some(path));
    assert_eq!(config.render.frame_rate, Some(10));
}
