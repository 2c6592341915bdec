//! Test Helper Utilities
//!
//! Stub collaborators and fixture builders for pipeline tests.
//!
//! Fixture frames are uniform 8×8 grayscale PNGs. The pixel value drives the
//! stubs:
//! - `0` → the locator finds nothing (NotFound)
//! - `1..=199` → located, and the raw frame decodes to the value itself
//! - `200..` → located, never decodes (Unreadable)

#![allow(dead_code)]

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use shelfcam_common::{ContentStore, MemStore};
use shelfcam_sort::services::{
    BarcodeDecoder, BoundingBox, Detection, LocatorError, QrLocator, RenderError, RenderedVideos,
    VideoRenderer,
};
use shelfcam_sort::{SortContext, SortPipeline};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Frame pixel value for "no QR code in the box"
pub const EMPTY_BOX: u8 = 0;

/// Frame pixel value for "QR code present but unreadable"
pub const SMUDGED: u8 = 250;

pub const FRAME_SIZE: u32 = 8;

/// PNG-encoded uniform frame
pub fn frame(value: u8) -> Vec<u8> {
    let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(FRAME_SIZE, FRAME_SIZE, Luma([value])));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

pub fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

/// Locator that sees a full-frame QR code unless the frame is black
pub struct StubLocator;

impl QrLocator for StubLocator {
    fn locate(&self, _: &Path, image: &DynamicImage) -> Result<Option<Detection>, LocatorError> {
        let gray = image.to_luma8();
        if gray.get_pixel(0, 0).0[0] == EMPTY_BOX {
            return Ok(None);
        }
        Ok(Some(Detection {
            bbox: BoundingBox::new(0.0, 0.0, gray.width() as f32, gray.height() as f32),
            score: 0.9,
        }))
    }
}

/// Decoder reading the experiment id from the pixel value
pub struct StubDecoder;

impl BarcodeDecoder for StubDecoder {
    fn decode(&self, image: &GrayImage) -> Vec<String> {
        match image.get_pixel_checked(0, 0).map(|p| p.0[0]) {
            Some(value) if (1..200).contains(&value) => vec![value.to_string()],
            _ => Vec::new(),
        }
    }
}

/// Renderer that records what it was asked to render
#[derive(Default)]
pub struct StubRenderer {
    pub rendered: Mutex<Vec<(String, bool)>>,
}

impl StubRenderer {
    pub fn names(&self) -> Vec<String> {
        self.rendered
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl VideoRenderer for StubRenderer {
    fn render(
        &self,
        _dir: &Path,
        name: &str,
        stabilize: bool,
    ) -> Result<RenderedVideos, RenderError> {
        self.rendered
            .lock()
            .unwrap()
            .push((name.to_string(), stabilize));
        Ok(RenderedVideos {
            unstabilized: PathBuf::from(format!("unstabilized/{}.mp4", name)),
            stabilized: PathBuf::from(format!("stabilized/{}.mp4", name)),
            stabilization_applied: stabilize,
        })
    }
}

/// In-memory pipeline with stub collaborators and a fixed sampling seed
pub struct Harness {
    pub store: Arc<MemStore>,
    pub renderer: Arc<StubRenderer>,
    pub pipeline: SortPipeline,
}

impl Harness {
    pub fn new(boxes_per_shelf: u32) -> Self {
        Self::with_context(context(boxes_per_shelf))
    }

    pub fn with_context(ctx: SortContext) -> Self {
        let store = Arc::new(MemStore::new());
        let renderer = Arc::new(StubRenderer::default());
        let pipeline = SortPipeline::new(
            ctx,
            store.clone(),
            Arc::new(StubLocator),
            Arc::new(StubDecoder),
            renderer.clone(),
        );
        pipeline.prepare().unwrap();
        Self {
            store,
            renderer,
            pipeline,
        }
    }

    pub fn ctx(&self) -> &SortContext {
        self.pipeline.context()
    }

    /// Place raw captures `shelf-0001.png..` in `unsorted/<run>/`, one second apart
    pub fn extracted_run(&self, run: &str, values: &[u8]) {
        let dir = self.ctx().layout.unsorted_run(run);
        for (i, value) in values.iter().enumerate() {
            self.store
                .insert_file(
                    &dir.join(format!("shelf-{:04}.png", i + 1)),
                    &frame(*value),
                    at(1_000 + i as u64),
                )
                .unwrap();
        }
    }

    /// Stage a run archive holding one frame per value
    pub fn staged_run(&self, file_name: &str, values: &[u8]) {
        let entries: Vec<(String, Vec<u8>)> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("{}/shelf-{:04}.png", file_name, i + 1), frame(*v)))
            .collect();
        self.store
            .insert_file(
                &self.ctx().layout.staging.join(file_name),
                &zip_archive(&entries),
                at(1),
            )
            .unwrap();
    }

    /// Existing experiment with `count` images
    pub fn experiment(&self, name: &str, count: u64) {
        let dir = self.ctx().layout.experiment(name);
        for seq in 1..=count {
            self.store
                .insert_file(
                    &dir.join(format!("{:08}_{}.000000.png", seq, 500 + seq)),
                    &frame(1),
                    at(500 + seq),
                )
                .unwrap();
        }
    }

    pub fn names(&self, dir: &Path) -> Vec<String> {
        self.store
            .list_or_empty(dir)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    pub fn count(&self, dir: &Path) -> usize {
        self.store.count_files(dir).unwrap()
    }
}

/// Context rooted at `/srv` with a fixed seed
pub fn context(boxes_per_shelf: u32) -> SortContext {
    let mut ctx = SortContext::init("/srv", None, boxes_per_shelf).unwrap();
    ctx.params.sample_seed = Some(20200106);
    ctx
}

/// Zip archive bytes from `(path, data)` entries
pub fn zip_archive(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, data) in entries {
        writer.start_file(name.as_str(), options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
