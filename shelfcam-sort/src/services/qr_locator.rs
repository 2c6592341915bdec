//! QR code locator
//!
//! Finds the bounding box of a QR code in a captured frame. The locator is a
//! black box to the identifier: zero or one box plus a confidence score.
//!
//! Two implementations:
//! - [`GridLocator`]: pure-Rust finder-pattern search via `rqrr`; a located
//!   grid scores 1.0.
//! - [`CommandLocator`]: runs an external detector (e.g. a trained object
//!   detection model) as a subprocess and parses its JSON answer.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use shelfcam_common::config::LocatorConfig;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{SortError, SortResult};

/// Locator errors
#[derive(Debug, Error)]
pub enum LocatorError {
    /// Detector binary not found in PATH
    #[error("Detector binary not found: {0}")]
    BinaryNotFound(String),

    /// Failed to execute detector command
    #[error("Failed to execute detector: {0}")]
    ExecutionError(String),

    /// Detector exited with an error
    #[error("Detector failed: {0}")]
    DetectorFailed(String),

    /// Detector output was not the expected JSON
    #[error("Failed to parse detector output: {0}")]
    ParseError(String),
}

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

/// A located QR code
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Finds at most one QR bounding box in an image
pub trait QrLocator: Send + Sync {
    /// `image_path` identifies the frame for logging and external detectors;
    /// `image` is the already decoded frame.
    fn locate(&self, image_path: &Path, image: &DynamicImage)
        -> Result<Option<Detection>, LocatorError>;
}

/// Locator selection resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LocatorSettings {
    #[default]
    Grid,
    Command { binary: String, args: Vec<String> },
}

impl LocatorSettings {
    pub fn from_config(config: &LocatorConfig) -> SortResult<Self> {
        match config.kind.as_deref().map(str::trim) {
            None | Some("") | Some("grid") => Ok(LocatorSettings::Grid),
            Some("command") => {
                let binary = config
                    .command
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        SortError::InvalidParameter(
                            "locator kind 'command' requires locator.command".to_string(),
                        )
                    })?;
                Ok(LocatorSettings::Command {
                    binary,
                    args: config.args.clone(),
                })
            }
            Some(other) => Err(SortError::InvalidParameter(format!(
                "unknown locator kind '{}' (expected grid or command)",
                other
            ))),
        }
    }

    pub fn build(&self) -> Arc<dyn QrLocator> {
        match self {
            LocatorSettings::Grid => Arc::new(GridLocator::new()),
            LocatorSettings::Command { binary, args } => {
                Arc::new(CommandLocator::new(binary.clone(), args.clone()))
            }
        }
    }
}

// ============================================================================
// Built-in grid locator
// ============================================================================

/// Finder-pattern QR locator
#[derive(Debug, Default)]
pub struct GridLocator;

impl GridLocator {
    pub fn new() -> Self {
        Self
    }
}

impl QrLocator for GridLocator {
    fn locate(
        &self,
        image_path: &Path,
        image: &DynamicImage,
    ) -> Result<Option<Detection>, LocatorError> {
        let gray = image.to_luma8();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            gray.width() as usize,
            gray.height() as usize,
            |x, y| gray.get_pixel(x as u32, y as u32).0[0],
        );
        let grids = prepared.detect_grids();

        let Some(grid) = grids.first() else {
            tracing::debug!(image = %image_path.display(), "No QR grid located");
            return Ok(None);
        };

        let xs = grid.bounds.iter().map(|p| p.x as f32);
        let ys = grid.bounds.iter().map(|p| p.y as f32);
        let bbox = BoundingBox::new(
            xs.clone().fold(f32::INFINITY, f32::min),
            ys.clone().fold(f32::INFINITY, f32::min),
            xs.fold(f32::NEG_INFINITY, f32::max),
            ys.fold(f32::NEG_INFINITY, f32::max),
        );

        Ok(Some(Detection { bbox, score: 1.0 }))
    }
}

// ============================================================================
// External detector
// ============================================================================

/// Detector process output: `{"box": [x1, y1, x2, y2], "score": 0.93}`
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorOutput {
    #[serde(rename = "box")]
    pub bbox: Option<[f32; 4]>,
    #[serde(default)]
    pub score: f32,
}

impl DetectorOutput {
    pub fn into_detection(self) -> Option<Detection> {
        self.bbox.map(|[x1, y1, x2, y2]| Detection {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            score: self.score,
        })
    }
}

/// Runs `<binary> <args..> <image path>` for every frame
#[derive(Debug, Clone)]
pub struct CommandLocator {
    binary: String,
    args: Vec<String>,
}

impl CommandLocator {
    pub fn new(binary: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            args,
        }
    }

    /// Parse detector stdout
    pub fn parse_output(stdout: &str) -> Result<Option<Detection>, LocatorError> {
        let output: DetectorOutput = serde_json::from_str(stdout.trim())
            .map_err(|e| LocatorError::ParseError(e.to_string()))?;
        Ok(output.into_detection())
    }
}

impl QrLocator for CommandLocator {
    fn locate(
        &self,
        image_path: &Path,
        _image: &DynamicImage,
    ) -> Result<Option<Detection>, LocatorError> {
        let start = std::time::Instant::now();

        let output = Command::new(&self.binary)
            .args(&self.args)
            .arg(image_path)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LocatorError::BinaryNotFound(self.binary.clone()),
                _ => LocatorError::ExecutionError(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LocatorError::DetectorFailed(format!(
                "Exit code: {:?}, stderr: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let detection = Self::parse_output(&String::from_utf8_lossy(&output.stdout))?;

        tracing::debug!(
            image = %image_path.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            score = detection.map(|d| d.score),
            "QR detector finished"
        );

        Ok(detection)
    }
}
