//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Every value is optional:
//! a missing file or a missing key falls back to built-in defaults, so the
//! sorter runs zero-config on a fresh install.
//!
//! Root folder priority:
//! 1. Command-line argument
//! 2. `SHELFCAM_ROOT_FOLDER` environment variable
//! 3. TOML `root_folder`
//! 4. OS-dependent default (`~/.local/share/shelfcam` on Linux)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the install root
pub const ROOT_FOLDER_ENV: &str = "SHELFCAM_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "SHELFCAM_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Install root holding the `data/` tree
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Robot index (`robot<N>` data directory)
    #[serde(default)]
    pub robot_number: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sorting: SortingConfig,

    #[serde(default)]
    pub locator: LocatorConfig,

    #[serde(default)]
    pub render: RenderConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Sorting heuristics. Unset values use the sorter's built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SortingConfig {
    pub boxes_per_shelf: Option<u32>,
    /// `drop`, `carry` or `quarantine`
    pub remainder_policy: Option<String>,
    pub sample_size: Option<usize>,
    pub confidence_cutoff: Option<f32>,
    pub sample_seed: Option<u64>,
    /// Ordered preprocessing variants, e.g. `["raw", "blur", "adaptive_mean:69:2", "otsu"]`
    pub variants: Option<Vec<String>>,
    /// Runs without growth before an experiment is finished
    pub grace_runs: Option<u32>,
}

/// QR locator selection
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LocatorConfig {
    /// `grid` (built-in) or `command` (external detector process)
    pub kind: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Video encoder settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RenderConfig {
    pub ffmpeg: Option<String>,
    pub frame_rate: Option<u32>,
    pub codec: Option<String>,
    pub crf: Option<u32>,
    pub pixel_format: Option<String>,
    pub input_glob: Option<String>,
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Locate the config file: explicit path, `SHELFCAM_CONFIG`, user config dir, `/etc`
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("shelfcam").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/shelfcam/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Load configuration, falling back to defaults when no file is available
///
/// An explicitly requested file that cannot be read or parsed is an error;
/// a discovered file that fails to parse is reported and ignored.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    match find_config_file(explicit) {
        Some(path) if explicit.is_some() => {
            let config = load_toml_config(&path)?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        Some(path) => match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!("Ignoring unreadable config: {}", e);
                Ok(TomlConfig::default())
            }
        },
        None => {
            warn!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve the install root following the priority order above
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default install root
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("shelfcam"))
        .unwrap_or_else(|| PathBuf::from("./shelfcam_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_default() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_toml() {
        let config: TomlConfig = toml::from_str(
            r#"
            root_folder = "/srv/shelfcam"
            robot_number = "2"

            [logging]
            level = "debug"

            [sorting]
            boxes_per_shelf = 4
            remainder_policy = "quarantine"
            variants = ["raw", "otsu"]
            grace_runs = 2

            [locator]
            kind = "command"
            command = "qr-detect"
            args = ["--model", "qr.onnx"]

            [render]
            frame_rate = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/shelfcam")));
        assert_eq!(config.sorting.boxes_per_shelf, Some(4));
        assert_eq!(config.sorting.variants.as_ref().map(Vec::len), Some(2));
        assert_eq!(config.locator.args, vec!["--model", "qr.onnx"]);
        assert_eq!(config.render.frame_rate, Some(30));
        assert_eq!(config.render.codec, None);
    }

    #[test]
    fn test_cli_root_wins() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let root = resolve_root_folder(Some(Path::new("/from/cli")), &config);
        assert_eq!(root, PathBuf::from("/from/cli"));
    }
}
