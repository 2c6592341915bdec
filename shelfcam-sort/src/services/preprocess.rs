//! QR crop preprocessing variants
//!
//! The decoder is tried against a fixed, ordered list of preprocessed images.
//! The order is a tie-break heuristic: the first variant that decodes wins, so
//! reordering changes which payload is reported when several variants decode.
//!
//! Adaptive thresholds follow the usual definition: a pixel becomes white when
//! it is brighter than its local (box or Gaussian weighted) mean minus `c`.

use crate::error::SortError;
use crate::services::qr_locator::BoundingBox;
use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use std::fmt;
use std::str::FromStr;

/// Sigma for the 3×3 Gaussian applied to every QR crop
const CROP_BLUR_SIGMA: f32 = 0.8;

/// One way of preparing an image for the barcode decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessVariant {
    /// Full grayscale frame, uncropped
    Raw,
    /// Blurred QR crop
    Blurred,
    /// Blurred crop, box-mean adaptive threshold
    AdaptiveMean { block: u32, c: i32 },
    /// Blurred crop, Gaussian-weighted adaptive threshold
    AdaptiveGaussian { block: u32, c: i32 },
    /// Blurred crop, global Otsu threshold
    Otsu,
}

/// Field-tested variant order
pub fn default_variants() -> Vec<PreprocessVariant> {
    use PreprocessVariant::*;
    vec![
        Raw,
        Blurred,
        AdaptiveMean { block: 69, c: 2 },
        AdaptiveGaussian { block: 69, c: 2 },
        Otsu,
        AdaptiveMean { block: 89, c: 2 },
        AdaptiveMean { block: 31, c: 11 },
    ]
}

impl FromStr for PreprocessVariant {
    type Err = SortError;

    /// `raw`, `blur`, `otsu`, `adaptive_mean:<block>:<c>`, `adaptive_gaussian:<block>:<c>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            SortError::InvalidParameter(format!("preprocessing variant '{}': {}", s, reason))
        };

        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            ["raw"] => Ok(PreprocessVariant::Raw),
            ["blur"] | ["blurred"] => Ok(PreprocessVariant::Blurred),
            ["otsu"] => Ok(PreprocessVariant::Otsu),
            [kind @ ("adaptive_mean" | "adaptive_gaussian"), block, c] => {
                let block: u32 = block.parse().map_err(|_| invalid("block is not a number"))?;
                let c: i32 = c.parse().map_err(|_| invalid("c is not a number"))?;
                if block < 3 || block % 2 == 0 {
                    return Err(invalid("block must be odd and at least 3"));
                }
                if *kind == "adaptive_mean" {
                    Ok(PreprocessVariant::AdaptiveMean { block, c })
                } else {
                    Ok(PreprocessVariant::AdaptiveGaussian { block, c })
                }
            }
            _ => Err(invalid("unknown variant")),
        }
    }
}

impl fmt::Display for PreprocessVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreprocessVariant::Raw => write!(f, "raw"),
            PreprocessVariant::Blurred => write!(f, "blur"),
            PreprocessVariant::AdaptiveMean { block, c } => {
                write!(f, "adaptive_mean:{}:{}", block, c)
            }
            PreprocessVariant::AdaptiveGaussian { block, c } => {
                write!(f, "adaptive_gaussian:{}:{}", block, c)
            }
            PreprocessVariant::Otsu => write!(f, "otsu"),
        }
    }
}

impl serde::Serialize for PreprocessVariant {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for PreprocessVariant {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Crop and blur of the located QR region, plus the full frame for `Raw`
pub struct PreparedCrop {
    pub frame: GrayImage,
    pub crop: GrayImage,
    pub blurred: GrayImage,
}

impl PreparedCrop {
    pub fn new(frame: GrayImage, bbox: &BoundingBox) -> Self {
        let crop = crop(&frame, bbox);
        let blurred = if is_empty(&crop) {
            crop.clone()
        } else {
            gaussian_blur_f32(&crop, CROP_BLUR_SIGMA)
        };
        Self {
            frame,
            crop,
            blurred,
        }
    }

    /// Summed pixel intensity of the crop (operator triage signal)
    pub fn crop_sum(&self) -> u64 {
        pixel_sum(&self.crop)
    }

    /// Image for `variant`, or `None` when the crop is empty
    pub fn apply(&self, variant: PreprocessVariant) -> Option<GrayImage> {
        if variant != PreprocessVariant::Raw && is_empty(&self.blurred) {
            return None;
        }

        let image = match variant {
            PreprocessVariant::Raw => self.frame.clone(),
            PreprocessVariant::Blurred => self.blurred.clone(),
            PreprocessVariant::AdaptiveMean { block, c } => {
                let radius = block / 2;
                let local = box_filter(&self.blurred, radius, radius);
                threshold_against(&self.blurred, &local, c)
            }
            PreprocessVariant::AdaptiveGaussian { block, c } => {
                let local = gaussian_blur_f32(&self.blurred, gaussian_sigma(block));
                threshold_against(&self.blurred, &local, c)
            }
            PreprocessVariant::Otsu => {
                let level = otsu_level(&self.blurred);
                binarize(&self.blurred, |p| p > level)
            }
        };
        Some(image)
    }
}

/// Crop `frame` to `bbox`, clamped to the frame
pub fn crop(frame: &GrayImage, bbox: &BoundingBox) -> GrayImage {
    let (width, height) = frame.dimensions();
    let clamp = |v: f32, max: u32| -> u32 {
        if v.is_nan() || v <= 0.0 {
            0
        } else {
            (v as u32).min(max)
        }
    };

    let x1 = clamp(bbox.x1.min(bbox.x2), width);
    let x2 = clamp(bbox.x1.max(bbox.x2), width);
    let y1 = clamp(bbox.y1.min(bbox.y2), height);
    let y2 = clamp(bbox.y1.max(bbox.y2), height);

    image::imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image()
}

pub fn pixel_sum(image: &GrayImage) -> u64 {
    image.pixels().map(|p| u64::from(p.0[0])).sum()
}

fn is_empty(image: &GrayImage) -> bool {
    image.width() == 0 || image.height() == 0
}

/// Gaussian sigma matching a square kernel of `block` pixels
fn gaussian_sigma(block: u32) -> f32 {
    0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn threshold_against(image: &GrayImage, local: &GrayImage, c: i32) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = i32::from(image.get_pixel(x, y).0[0]);
        let mean = i32::from(local.get_pixel(x, y).0[0]);
        if value > mean - c {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn binarize(image: &GrayImage, is_white: impl Fn(u8) -> bool) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if is_white(image.get_pixel(x, y).0[0]) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([(x * 255 / width.max(1)) as u8]))
    }

    #[test]
    fn test_default_order() {
        let names: Vec<String> = default_variants().iter().map(|v| v.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "raw",
                "blur",
                "adaptive_mean:69:2",
                "adaptive_gaussian:69:2",
                "otsu",
                "adaptive_mean:89:2",
                "adaptive_mean:31:11",
            ]
        );
    }

    #[test]
    fn test_parse_round_trip_names() {
        for variant in default_variants() {
            let parsed: PreprocessVariant = variant.to_string().parse().unwrap();
            assert_eq!(parsed, variant);
        }
        assert_eq!(
            "adaptive_gaussian:55:11".parse::<PreprocessVariant>().unwrap(),
            PreprocessVariant::AdaptiveGaussian { block: 55, c: 11 }
        );
    }

    #[test]
    fn test_parse_rejects_bad_blocks() {
        assert!("adaptive_mean:4:2".parse::<PreprocessVariant>().is_err());
        assert!("adaptive_mean:1:2".parse::<PreprocessVariant>().is_err());
        assert!("adaptive_mean:x:2".parse::<PreprocessVariant>().is_err());
        assert!("sharpen".parse::<PreprocessVariant>().is_err());
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = gradient(20, 10);
        let bbox = BoundingBox::new(-5.0, 2.0, 50.0, 8.0);
        let cropped = crop(&frame, &bbox);
        assert_eq!(cropped.dimensions(), (20, 6));
    }

    #[test]
    fn test_crop_sum() {
        let frame = GrayImage::from_pixel(10, 10, Luma([3]));
        let prepared = PreparedCrop::new(frame, &BoundingBox::new(0.0, 0.0, 4.0, 5.0));
        assert_eq!(prepared.crop_sum(), 4 * 5 * 3);
    }

    #[test]
    fn test_variants_are_binary() {
        let frame = gradient(240, 240);
        let prepared = PreparedCrop::new(frame, &BoundingBox::new(20.0, 20.0, 220.0, 220.0));
        for variant in [
            PreprocessVariant::AdaptiveMean { block: 31, c: 11 },
            PreprocessVariant::AdaptiveGaussian { block: 69, c: 2 },
            PreprocessVariant::Otsu,
        ] {
            let image = prepared.apply(variant).unwrap();
            assert_eq!(image.dimensions(), (200, 200));
            assert!(image.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        }
    }

    #[test]
    fn test_raw_is_full_frame() {
        let frame = gradient(40, 30);
        let prepared = PreparedCrop::new(frame, &BoundingBox::new(5.0, 5.0, 10.0, 10.0));
        assert_eq!(
            prepared.apply(PreprocessVariant::Raw).unwrap().dimensions(),
            (40, 30)
        );
    }

    #[test]
    fn test_empty_crop_only_raw_applies() {
        let frame = gradient(10, 10);
        let prepared = PreparedCrop::new(frame, &BoundingBox::new(4.0, 4.0, 4.0, 9.0));
        assert_eq!(prepared.crop_sum(), 0);
        assert!(prepared.apply(PreprocessVariant::Raw).is_some());
        assert!(prepared.apply(PreprocessVariant::Blurred).is_none());
        assert!(prepared.apply(PreprocessVariant::Otsu).is_none());
    }
}
