//! Vision/OCR Layer
//!
//! Isolates the marking region of a package photo and reads its text.
//! The glyph-level engine sits behind [`TextEngine`]:
//! - Tesseract via leptess (cargo feature `tesseract`)
//! - any test double or alternative engine implementing the trait

pub mod preprocess;
pub mod recognizer;
pub mod region;
#[cfg(feature = "tesseract")]
pub mod tesseract;

pub use preprocess::{preprocess_for_ocr, Binarization};
pub use recognizer::{
    PageSegMode, Recognition, RecognitionConfig, TextEngine, TextRecognizer, UnsupportedPageSegMode,
    WordToken, DEFAULT_WHITELIST,
};
pub use region::{CenterCropExtractor, MarkingRegion, RegionExtractor, DEFAULT_CROP_MARGIN};
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractEngine;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in original-image pixel coordinates
///
/// Serializes as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Area in pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl From<[u32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [u32; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<BoundingBox> for [u32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}
