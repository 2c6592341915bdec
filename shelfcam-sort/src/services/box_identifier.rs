//! Box identifier
//!
//! Classifies one box batch by the experiment QR code placed in the box.
//!
//! # Algorithm
//! 1. Sample up to `sample_size` images without replacement
//! 2. Run the locator on each until a box scores at least `confidence_cutoff`
//! 3. Crop to the box, blur, and try the decoder on every preprocessing
//!    variant in order; the first non-empty decode wins
//! 4. Parse the payload as an unsigned experiment id
//!
//! No located box → `NotFound`. A located box that never yields an id →
//! `Unreadable` carrying the crop's pixel sum.

use crate::error::SortResult;
use crate::models::{BoxClassification, SortParameters};
use crate::services::barcode_decoder::BarcodeDecoder;
use crate::services::preprocess::{PreparedCrop, PreprocessVariant};
use crate::services::qr_locator::{Detection, QrLocator};
use image::DynamicImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shelfcam_common::ContentStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// QR-based batch classifier
pub struct BoxIdentifier {
    store: Arc<dyn ContentStore>,
    locator: Arc<dyn QrLocator>,
    decoder: Arc<dyn BarcodeDecoder>,
    sample_size: usize,
    confidence_cutoff: f32,
    variants: Vec<PreprocessVariant>,
    rng: StdRng,
}

impl BoxIdentifier {
    pub fn new(
        store: Arc<dyn ContentStore>,
        locator: Arc<dyn QrLocator>,
        decoder: Arc<dyn BarcodeDecoder>,
        params: &SortParameters,
    ) -> Self {
        let rng = match params.sample_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            store,
            locator,
            decoder,
            sample_size: params.sample_size,
            confidence_cutoff: params.confidence_cutoff,
            variants: params.variants.clone(),
            rng,
        }
    }

    /// Classify the batch in `batch_dir`
    pub fn identify(&mut self, batch_dir: &Path) -> SortResult<BoxClassification> {
        let images: Vec<PathBuf> = self
            .store
            .list(batch_dir)?
            .into_iter()
            .filter(|e| e.is_file())
            .map(|e| batch_dir.join(e.name))
            .collect();

        let Some((path, frame, detection)) = self.locate_in_sample(&images) else {
            info!(
                batch = %batch_dir.display(),
                sampled = images.len().min(self.sample_size),
                "No QR code found in batch"
            );
            return Ok(BoxClassification::NotFound);
        };

        debug!(
            image = %path.display(),
            score = detection.score,
            "QR code located"
        );

        let prepared = PreparedCrop::new(frame.to_luma8(), &detection.bbox);
        let diagnostic = prepared.crop_sum();

        for variant in &self.variants {
            let Some(candidate) = prepared.apply(*variant) else {
                continue;
            };

            let Some(payload) = self.decoder.decode(&candidate).into_iter().next() else {
                continue;
            };

            return Ok(match payload.trim().parse::<u64>() {
                Ok(experiment_id) => {
                    info!(
                        batch = %batch_dir.display(),
                        experiment_id,
                        variant = %variant,
                        "Batch identified"
                    );
                    BoxClassification::Identified { experiment_id }
                }
                Err(_) => {
                    warn!(
                        batch = %batch_dir.display(),
                        payload = %payload,
                        "QR payload is not an experiment id, routing to junk review"
                    );
                    BoxClassification::Unreadable {
                        diagnostic,
                        payload: Some(payload),
                    }
                }
            });
        }

        warn!(
            batch = %batch_dir.display(),
            diagnostic,
            variants = self.variants.len(),
            "QR code located but unreadable, routing to junk review"
        );
        Ok(BoxClassification::Unreadable {
            diagnostic,
            payload: None,
        })
    }

    /// First sampled image with a confident detection
    fn locate_in_sample(
        &mut self,
        images: &[PathBuf],
    ) -> Option<(PathBuf, DynamicImage, Detection)> {
        if images.is_empty() {
            return None;
        }

        let amount = self.sample_size.min(images.len());
        let sample = rand::seq::index::sample(&mut self.rng, images.len(), amount);

        for index in sample.iter() {
            let path = &images[index];

            let frame = match self.load(path) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(image = %path.display(), error = %e, "Skipping unreadable image");
                    continue;
                }
            };

            match self.locator.locate(path, &frame) {
                Ok(Some(detection)) if detection.score >= self.confidence_cutoff => {
                    return Some((path.clone(), frame, detection));
                }
                Ok(Some(detection)) => {
                    debug!(
                        image = %path.display(),
                        score = detection.score,
                        cutoff = self.confidence_cutoff,
                        "QR detection below confidence cutoff"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(image = %path.display(), error = %e, "QR locator failed");
                }
            }
        }

        None
    }

    fn load(&self, path: &Path) -> SortResult<DynamicImage> {
        let bytes = self.store.read(path)?;
        Ok(image::load_from_memory(&bytes)?)
    }
}
