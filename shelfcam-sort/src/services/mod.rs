//! Sorting services

pub mod barcode_decoder;
pub mod batcher;
pub mod box_identifier;
pub mod experiment_merger;
pub mod janitor;
pub mod lifecycle;
pub mod preprocess;
pub mod qr_locator;
pub mod run_intake;
pub mod video_renderer;

pub use barcode_decoder::{BarcodeDecoder, RqrrDecoder};
pub use batcher::{BatchOutcome, Batcher};
pub use box_identifier::BoxIdentifier;
pub use experiment_merger::{ExperimentMerger, MergeOutcome};
pub use janitor::Janitor;
pub use lifecycle::{ExperimentSnapshot, LifecyclePaths, LifecycleTracker};
pub use preprocess::PreprocessVariant;
pub use qr_locator::{
    BoundingBox, CommandLocator, Detection, GridLocator, LocatorError, LocatorSettings, QrLocator,
};
pub use run_intake::{RunIntake, StagedRun};
pub use video_renderer::{FfmpegRenderer, RenderError, RenderSettings, RenderedVideos, VideoRenderer};
