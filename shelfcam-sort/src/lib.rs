//! shelfcam-sort library interface
//!
//! Sorts zipped robot image runs into per-box batches, identifies each box's
//! experiment from its QR code, and folds the images into append-only
//! experiment stores that are finished into videos once they stop growing.
//!
//! Exposes public APIs for integration testing.

pub mod context;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::context::SortContext;
pub use crate::error::{SortError, SortResult};
pub use crate::workflow::{RunOptions, RunOutcome, SortPipeline};
