//! Marking region extraction
//!
//! The current extractor does not look for the marking boundary: it assumes
//! the part is centered in the frame, crops the middle of the image and
//! equalizes its histogram to lift low-contrast laser etching.

use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::contrast::equalize_histogram;
use tracing::{debug, warn};

use super::preprocess::to_grayscale;
use super::BoundingBox;
use crate::error::InspectError;

/// Default fraction trimmed from each edge (keeps 20%..80% of each axis)
pub const DEFAULT_CROP_MARGIN: f64 = 0.2;

/// Upper bound for the crop margin; 0.5 would leave nothing
const MAX_CROP_MARGIN: f64 = 0.49;

/// Contrast-normalized marking region and where it came from
#[derive(Debug, Clone)]
pub struct MarkingRegion {
    /// Region pixels, three channels
    pub image: RgbImage,
    /// Region rectangle in original-image coordinates
    pub bbox: BoundingBox,
}

/// Stage that locates the marking in a full package image
pub trait RegionExtractor: Send + Sync {
    /// Extract the marking region
    ///
    /// Fails with [`InspectError::InvalidImage`] for zero-area input.
    fn extract(&self, image: &DynamicImage) -> Result<MarkingRegion, InspectError>;
}

/// Center crop followed by histogram equalization
#[derive(Debug, Clone, Copy)]
pub struct CenterCropExtractor {
    margin: f64,
}

impl Default for CenterCropExtractor {
    fn default() -> Self {
        Self {
            margin: DEFAULT_CROP_MARGIN,
        }
    }
}

impl CenterCropExtractor {
    /// Create an extractor trimming `margin` of each dimension from both sides
    pub fn new(margin: f64) -> Self {
        let clamped = if margin.is_nan() {
            DEFAULT_CROP_MARGIN
        } else {
            margin.clamp(0.0, MAX_CROP_MARGIN)
        };
        if clamped != margin {
            warn!("Crop margin {} out of range, using {}", margin, clamped);
        }
        Self { margin: clamped }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Crop rectangle for an image of the given size
    pub fn crop_bounds(&self, width: u32, height: u32) -> BoundingBox {
        let start = self.margin;
        let end = 1.0 - self.margin;
        // Truncate toward zero, like integer pixel indexing
        let x1 = (start * width as f64) as u32;
        let y1 = (start * height as f64) as u32;
        let x2 = (end * width as f64) as u32;
        let y2 = (end * height as f64) as u32;
        BoundingBox::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }
}

impl RegionExtractor for CenterCropExtractor {
    fn extract(&self, image: &DynamicImage) -> Result<MarkingRegion, InspectError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(InspectError::InvalidImage(format!(
                "image has zero area ({}x{})",
                width, height
            )));
        }

        let bbox = self.crop_bounds(width, height);
        if bbox.area() == 0 {
            return Err(InspectError::InvalidImage(format!(
                "image {}x{} too small for a marking region",
                width, height
            )));
        }

        let crop = image.crop_imm(bbox.x, bbox.y, bbox.width, bbox.height);
        let equalized: GrayImage = equalize_histogram(&to_grayscale(&crop.to_rgb8()));
        let region = DynamicImage::ImageLuma8(equalized).to_rgb8();

        debug!(
            "Extracted marking region {:?} from {}x{} image",
            bbox, width, height
        );

        Ok(MarkingRegion {
            image: region,
            bbox,
        })
    }
}
