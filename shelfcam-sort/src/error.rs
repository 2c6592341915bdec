//! Error types for shelfcam-sort
//!
//! Classification failures (QR not found, QR unreadable) are not errors: they
//! are values routed to the junk stores. Errors here are the fatal kind that
//! halt a run, plus the per-service errors that callers log and skip.

use crate::services::qr_locator::LocatorError;
use crate::services::video_renderer::RenderError;
use thiserror::Error;

/// Sorter error type
#[derive(Debug, Error)]
pub enum SortError {
    /// Store, config or naming error from shelfcam-common
    #[error("Common error: {0}")]
    Common(#[from] shelfcam_common::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image could not be decoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Run archive could not be read
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// QR locator failure
    #[error("QR locator error: {0}")]
    Locator(#[from] LocatorError),

    /// Video rendering failure
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Invalid sorting parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for sorter operations
pub type SortResult<T> = Result<T, SortError>;
