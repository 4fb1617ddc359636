// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Annotation-mask crop extraction
//!
//! An annotation mask is an RGB image the same size as the original; a
//! pixel is marked iff its red channel is saturated (255), regardless of
//! the green/blue channels — tolerant to anti-aliased mask edges. The crop
//! is the tight bounding box of the marked region with everything outside
//! the mask fully transparent.

use image::{Rgba, RgbaImage, RgbImage};
use thiserror::Error;

/// Errors raised while extracting a crop
#[derive(Debug, Error)]
pub enum CropError {
    #[error("Image sizes don't match: original {original_width}x{original_height}, mask {mask_width}x{mask_height}")]
    SizeMismatch {
        original_width: u32,
        original_height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("No marked pixels found in mask")]
    EmptyMask,
}

/// A transparent-background crop of one annotated object
#[derive(Debug, Clone)]
pub struct Crop {
    /// RGBA raster, exactly the marked region's bounding box
    pub image: RgbaImage,
    /// Index of the annotation this crop came from
    pub index: usize,
}

impl Crop {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Red channel value that marks a mask pixel
const MARK_THRESHOLD: u8 = 255;

/// Extract the sub-region of `original` marked by `mask`
///
/// # Errors
/// - [`CropError::SizeMismatch`] when the two images differ in size,
///   checked before any pixel access
/// - [`CropError::EmptyMask`] when no pixel is marked
pub fn extract_crop(original: &RgbImage, mask: &RgbImage) -> Result<RgbaImage, CropError> {
    if original.dimensions() != mask.dimensions() {
        return Err(CropError::SizeMismatch {
            original_width: original.width(),
            original_height: original.height(),
            mask_width: mask.width(),
            mask_height: mask.height(),
        });
    }

    let (width, height) = original.dimensions();

    // Tight bounding box over marked pixels
    let mut x_min = u32::MAX;
    let mut x_max = 0u32;
    let mut y_min = u32::MAX;
    let mut y_max = 0u32;
    let mut any = false;

    for y in 0..height {
        for x in 0..width {
            if mask.get_pixel(x, y).0[0] >= MARK_THRESHOLD {
                any = true;
                x_min = x_min.min(x);
                x_max = x_max.max(x);
                y_min = y_min.min(y);
                y_max = y_max.max(y);
            }
        }
    }

    if !any {
        return Err(CropError::EmptyMask);
    }

    // Buffer starts fully transparent; marked pixels are copied opaque
    let mut crop = RgbaImage::new(x_max - x_min + 1, y_max - y_min + 1);
    for y in y_min..=y_max {
        for x in x_min..=x_max {
            if mask.get_pixel(x, y).0[0] >= MARK_THRESHOLD {
                let [r, g, b] = original.get_pixel(x, y).0;
                crop.put_pixel(x - x_min, y - y_min, Rgba([r, g, b, 255]));
            }
        }
    }

    Ok(crop)
}
