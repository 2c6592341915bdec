//! Barcode decoder
//!
//! Returns every payload decodable from a preprocessed grayscale image.

use image::GrayImage;

/// Decodes zero or more payload strings from an image
pub trait BarcodeDecoder: Send + Sync {
    fn decode(&self, image: &GrayImage) -> Vec<String>;
}

/// QR decoder backed by `rqrr`
#[derive(Debug, Default)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl BarcodeDecoder for RqrrDecoder {
    fn decode(&self, image: &GrayImage) -> Vec<String> {
        if image.width() == 0 || image.height() == 0 {
            return Vec::new();
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            image.width() as usize,
            image.height() as usize,
            |x, y| image.get_pixel(x as u32, y as u32).0[0],
        );
        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| match grid.decode() {
                Ok((_, content)) => Some(content),
                Err(e) => {
                    tracing::trace!(error = %e, "QR grid located but not decodable");
                    None
                }
            })
            .filter(|content| !content.trim().is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_blank_image_decodes_nothing() {
        let image = GrayImage::from_pixel(32, 32, Luma([255]));
        assert!(RqrrDecoder::new().decode(&image).is_empty());
    }

    #[test]
    fn test_empty_image_decodes_nothing() {
        let image = GrayImage::new(0, 0);
        assert!(RqrrDecoder::new().decode(&image).is_empty());
    }
}
