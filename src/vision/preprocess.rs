//! Image preprocessing for marking OCR
//!
//! Turns an equalized marking region into a clean binary image:
//! grayscale, edge-preserving smoothing to suppress etch noise, min-max
//! normalization, then adaptive-mean or Otsu binarization.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use tracing::debug;

/// Bilateral filter diameter in pixels
pub const BILATERAL_DIAMETER: u32 = 5;
/// Bilateral filter range (intensity) sigma
pub const BILATERAL_SIGMA_COLOR: f32 = 50.0;
/// Bilateral filter spatial sigma
pub const BILATERAL_SIGMA_SPACE: f32 = 50.0;
/// Adaptive threshold window size (odd)
pub const ADAPTIVE_BLOCK_SIZE: u32 = 25;
/// Constant subtracted from the local mean
pub const ADAPTIVE_OFFSET: i32 = 10;

/// Binarization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binarization {
    /// Local mean over a square window minus a constant
    AdaptiveMean { block_size: u32, offset: i32 },
    /// Single global threshold chosen by Otsu's method
    Otsu,
}

impl Binarization {
    /// Strategy selected by the adaptive-threshold toggle
    pub fn from_toggle(use_adaptive_threshold: bool) -> Self {
        if use_adaptive_threshold {
            Binarization::AdaptiveMean {
                block_size: ADAPTIVE_BLOCK_SIZE,
                offset: ADAPTIVE_OFFSET,
            }
        } else {
            Binarization::Otsu
        }
    }
}

/// Full preprocessing chain for a marking region
pub fn preprocess_for_ocr(region: &RgbImage, use_adaptive_threshold: bool) -> GrayImage {
    let gray = to_grayscale(region);
    let smoothed = bilateral_filter(
        &gray,
        BILATERAL_DIAMETER,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPACE,
    );
    let mut normalized = smoothed;
    normalize_min_max(&mut normalized);

    let mode = Binarization::from_toggle(use_adaptive_threshold);
    debug!(
        "OCR preprocessing {}x{} region with {:?}",
        region.width(),
        region.height(),
        mode
    );
    binarize(&normalized, mode)
}

/// Apply a binarization strategy
pub fn binarize(image: &GrayImage, mode: Binarization) -> GrayImage {
    match mode {
        Binarization::AdaptiveMean { block_size, offset } => {
            adaptive_mean_threshold(image, block_size, offset)
        }
        Binarization::Otsu => otsu_threshold(image),
    }
}

/// Convert RGB to grayscale with BT.601 luma weights
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        let value = 0.299 * src[0] as f32 + 0.587 * src[1] as f32 + 0.114 * src[2] as f32;
        dst[0] = value.round().clamp(0.0, 255.0) as u8;
    }
    gray
}

/// Edge-preserving bilateral filter
///
/// Neighbours inside a circular window of `diameter` pixels are weighted by
/// both spatial distance and intensity difference, so strokes keep sharp
/// edges while flat areas are smoothed. Borders replicate the edge pixels.
///
/// `imageproc::filter::bilateral_filter` weighs a square window; this keeps
/// OpenCV's circular one so the threshold constants below behave the same.
pub fn bilateral_filter(
    image: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let radius = (diameter / 2) as i64;
    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);

    // Spatial kernel over the circular window
    let mut kernel: Vec<(i64, i64, f32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist_sq = (dx * dx + dy * dy) as f32;
            if dist_sq.sqrt() > radius as f32 {
                continue;
            }
            kernel.push((dx, dy, (dist_sq * space_coeff).exp()));
        }
    }

    // Range weights for every possible intensity difference
    let color_weights: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let max_x = w as i64 - 1;
    let max_y = h as i64 - 1;
    let mut out = GrayImage::new(w, h);

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let center = image.get_pixel(x as u32, y as u32)[0];
            let mut sum = 0.0f32;
            let mut weight_sum = 0.0f32;

            for &(dx, dy, spatial) in &kernel {
                let nx = (x + dx).clamp(0, max_x) as u32;
                let ny = (y + dy).clamp(0, max_y) as u32;
                let value = image.get_pixel(nx, ny)[0];
                let weight = spatial * color_weights[value.abs_diff(center) as usize];
                sum += weight * value as f32;
                weight_sum += weight;
            }

            let filtered = if weight_sum > 0.0 {
                sum / weight_sum
            } else {
                center as f32
            };
            out.put_pixel(x as u32, y as u32, Luma([filtered.round().clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

/// Stretch intensities to the full 0..=255 range in place
///
/// A constant image maps to all zeros.
pub fn normalize_min_max(image: &mut GrayImage) {
    let Some(min) = image.pixels().map(|p| p[0]).min() else {
        return;
    };
    let max = image.pixels().map(|p| p[0]).max().unwrap_or(min);

    if max == min {
        for px in image.pixels_mut() {
            px[0] = 0;
        }
        return;
    }

    let scale = 255.0 / (max - min) as f32;
    for px in image.pixels_mut() {
        px[0] = ((px[0] - min) as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
}

/// Adaptive mean thresholding
///
/// A pixel becomes white when it is brighter than the mean of its
/// `block_size` x `block_size` neighbourhood minus `offset`, black otherwise.
/// The window is clipped at the image borders.
pub fn adaptive_mean_threshold(image: &GrayImage, block_size: u32, offset: i32) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    // Summed-area table with a zero row and column
    let stride = w as usize + 1;
    let mut integral = vec![0u64; stride * (h as usize + 1)];
    for y in 0..h as usize {
        let mut row_sum = 0u64;
        for x in 0..w as usize {
            row_sum += image.get_pixel(x as u32, y as u32)[0] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let radius = (block_size / 2) as usize;
    for y in 0..h as usize {
        let top = y.saturating_sub(radius);
        let bottom = (y + radius + 1).min(h as usize);
        for x in 0..w as usize {
            let left = x.saturating_sub(radius);
            let right = (x + radius + 1).min(w as usize);

            let sum = integral[bottom * stride + right] + integral[top * stride + left]
                - integral[top * stride + right]
                - integral[bottom * stride + left];
            let count = ((bottom - top) * (right - left)) as u64;
            let mean = (sum as f64 / count as f64).round() as i32;

            let value = image.get_pixel(x as u32, y as u32)[0] as i32;
            let binary = if value > mean - offset { 255 } else { 0 };
            out.put_pixel(x as u32, y as u32, Luma([binary]));
        }
    }

    out
}

/// Global threshold at Otsu's level
pub fn otsu_threshold(image: &GrayImage) -> GrayImage {
    let level = otsu_level(image);
    debug!("Otsu threshold level {}", level);
    let mut out = image.clone();
    for px in out.pixels_mut() {
        px[0] = if px[0] > level { 255 } else { 0 };
    }
    out
}
