//! Video renderer
//!
//! Encodes a finished experiment's frames into an MP4 with `ffmpeg`,
//! optionally stabilized with the vid.stab filters, and publishes the result
//! to the video stores.
//!
//! Runs inside the experiment directory:
//! 1. `ffmpeg -framerate 15 -pattern_type glob -i "*.png" -c:v libx264 -crf 24 -pix_fmt yuv420p outfile.mp4`
//! 2. `vidstabdetect` pass writing `transforms.trf` (stabilize only)
//! 3. `vidstabtransform` pass writing `outfile_stabilized.mp4` (stabilize only)

use serde::Serialize;
use shelfcam_common::config::RenderConfig;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

const PLAIN_OUTPUT: &str = "outfile.mp4";
const STABILIZED_OUTPUT: &str = "outfile_stabilized.mp4";
const TRANSFORMS_FILE: &str = "transforms.trf";

/// Renderer errors
#[derive(Debug, Error)]
pub enum RenderError {
    /// Encoder binary not found in PATH
    #[error("Encoder binary not found: {0}")]
    BinaryNotFound(String),

    /// Failed to execute encoder command
    #[error("Failed to execute encoder: {0}")]
    ExecutionError(String),

    /// Encoder exited with an error
    #[error("Encoder step '{step}' failed: {detail}")]
    EncoderFailed { step: &'static str, detail: String },

    /// I/O error (publishing or cleanup)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Published video files
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedVideos {
    pub unstabilized: PathBuf,
    /// Stabilized video, or a copy of the plain one when stabilization is off
    pub stabilized: PathBuf,
    pub stabilization_applied: bool,
}

/// Renders one experiment directory into videos named `name`
pub trait VideoRenderer: Send + Sync {
    fn render(
        &self,
        experiment_dir: &Path,
        name: &str,
        stabilize: bool,
    ) -> Result<RenderedVideos, RenderError>;
}

/// Encoder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub ffmpeg: String,
    pub frame_rate: u32,
    pub codec: String,
    pub crf: u32,
    pub pixel_format: String,
    pub input_glob: String,
    pub smoothing: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            frame_rate: 15,
            codec: "libx264".to_string(),
            crf: 24,
            pixel_format: "yuv420p".to_string(),
            input_glob: "*.png".to_string(),
            smoothing: 10,
        }
    }
}

impl RenderSettings {
    /// Apply the `[render]` TOML section over the defaults
    pub fn from_config(config: &RenderConfig) -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg: config.ffmpeg.clone().unwrap_or(defaults.ffmpeg),
            frame_rate: config.frame_rate.unwrap_or(defaults.frame_rate),
            codec: config.codec.clone().unwrap_or(defaults.codec),
            crf: config.crf.unwrap_or(defaults.crf),
            pixel_format: config.pixel_format.clone().unwrap_or(defaults.pixel_format),
            input_glob: config.input_glob.clone().unwrap_or(defaults.input_glob),
            smoothing: defaults.smoothing,
        }
    }

    pub fn encode_args(&self) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-framerate".to_string(),
            self.frame_rate.to_string(),
            "-pattern_type".to_string(),
            "glob".to_string(),
            "-i".to_string(),
            self.input_glob.clone(),
            "-c:v".to_string(),
            self.codec.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            PLAIN_OUTPUT.to_string(),
        ]
    }

    pub fn detect_args(&self) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            PLAIN_OUTPUT.to_string(),
            "-vf".to_string(),
            format!(
                "vidstabdetect=stepsize=32:shakiness=10:accuracy=10:result={}",
                TRANSFORMS_FILE
            ),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ]
    }

    pub fn transform_args(&self) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            PLAIN_OUTPUT.to_string(),
            "-vf".to_string(),
            format!(
                "vidstabtransform=smoothing={}:input={}",
                self.smoothing, TRANSFORMS_FILE
            ),
            STABILIZED_OUTPUT.to_string(),
        ]
    }
}

/// `ffmpeg` subprocess renderer
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    settings: RenderSettings,
    unstabilized_dir: PathBuf,
    stabilized_dir: PathBuf,
}

impl FfmpegRenderer {
    pub fn new(settings: RenderSettings, unstabilized_dir: PathBuf, stabilized_dir: PathBuf) -> Self {
        Self {
            settings,
            unstabilized_dir,
            stabilized_dir,
        }
    }

    fn run(&self, step: &'static str, dir: &Path, args: &[String]) -> Result<(), RenderError> {
        let start = std::time::Instant::now();

        let output = Command::new(&self.settings.ffmpeg)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    RenderError::BinaryNotFound(self.settings.ffmpeg.clone())
                }
                _ => RenderError::ExecutionError(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(RenderError::EncoderFailed {
                step,
                detail: format!("exit code {:?}: {}", output.status.code(), tail),
            });
        }

        tracing::debug!(
            step,
            dir = %dir.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Encoder step finished"
        );
        Ok(())
    }
}

impl VideoRenderer for FfmpegRenderer {
    fn render(
        &self,
        experiment_dir: &Path,
        name: &str,
        stabilize: bool,
    ) -> Result<RenderedVideos, RenderError> {
        let start = std::time::Instant::now();
        let plain = experiment_dir.join(PLAIN_OUTPUT);
        let file_name = format!("{}.mp4", name);

        self.run("encode", experiment_dir, &self.settings.encode_args())?;

        let stabilized_source = if stabilize {
            self.run("vidstabdetect", experiment_dir, &self.settings.detect_args())?;
            self.run("vidstabtransform", experiment_dir, &self.settings.transform_args())?;
            experiment_dir.join(STABILIZED_OUTPUT)
        } else {
            plain.clone()
        };

        std::fs::create_dir_all(&self.stabilized_dir)?;
        std::fs::create_dir_all(&self.unstabilized_dir)?;

        let videos = RenderedVideos {
            stabilized: self.stabilized_dir.join(&file_name),
            unstabilized: self.unstabilized_dir.join(&file_name),
            stabilization_applied: stabilize,
        };
        std::fs::copy(&stabilized_source, &videos.stabilized)?;
        std::fs::copy(&plain, &videos.unstabilized)?;

        for intermediate in [PLAIN_OUTPUT, STABILIZED_OUTPUT, TRANSFORMS_FILE] {
            let path = experiment_dir.join(intermediate);
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }

        tracing::info!(
            experiment = name,
            stabilized = stabilize,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Video rendered"
        );

        Ok(videos)
    }
}
