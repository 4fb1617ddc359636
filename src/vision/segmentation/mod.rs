// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Foreground/background segmentation
//!
//! Two interchangeable strategies isolate the vegetation pixels of a whole
//! image. [`SegmentationStrategy::WholeImageCut`] runs the
//! rectangle-initialized cut; [`SegmentationStrategy::SeededWatershed`]
//! runs the thresholding/distance-transform/watershed chain. Callers pick
//! the strategy explicitly.

pub mod components;
pub mod distance;
pub mod morphology;
pub mod rect_cut;
pub mod watershed;

use crate::config::PipelineParams;
use image::RgbImage;
use tracing::debug;

use rect_cut::{rect_cut_states, STATE_BGD, STATE_PR_BGD};

/// Segmentation strategy, selected explicitly by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationStrategy {
    /// Rectangle-initialized whole-image cut
    WholeImageCut,
    /// Otsu / distance-transform / marker-watershed chain
    SeededWatershed,
}

/// Binary foreground mask with the same dimensions as its source image
///
/// Values are {0,1}. An all-zero mask is a valid "no foreground" result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ForegroundMask {
    /// Build a mask from raw {0,1} data
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), width as usize * height as usize);
        debug_assert!(data.iter().all(|&v| v <= 1));
        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel at (x, y) is foreground
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.data[y as usize * self.width as usize + x as usize] == 1
    }

    /// Number of foreground pixels
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&v| v == 1).count()
    }

    /// Raw row-major mask values
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Segment an image into a foreground mask
pub fn segment(
    image: &RgbImage,
    strategy: SegmentationStrategy,
    params: &PipelineParams,
) -> ForegroundMask {
    let mask = match strategy {
        SegmentationStrategy::WholeImageCut => whole_image_cut(image, params),
        SegmentationStrategy::SeededWatershed => seeded_watershed(image, params),
    };
    debug!(
        strategy = ?strategy,
        foreground = mask.foreground_count(),
        total = (mask.width() * mask.height()) as usize,
        "segmentation complete"
    );
    mask
}

/// Whole-image strategy: cut states {0,2} map to background, {1,3} to foreground
fn whole_image_cut(image: &RgbImage, params: &PipelineParams) -> ForegroundMask {
    let states = rect_cut_states(image, params.cut_rect_inset, params.cut_iterations);
    let data = states
        .iter()
        .map(|&s| u8::from(s != STATE_BGD && s != STATE_PR_BGD))
        .collect();
    ForegroundMask::new(image.width(), image.height(), data)
}

/// Seeded strategy: inverse-Otsu binarization, opening, dilation, distance
/// transform, confident-seed extraction and marker watershed
fn seeded_watershed(image: &RgbImage, params: &PipelineParams) -> ForegroundMask {
    let width = image.width() as usize;
    let height = image.height() as usize;

    let gray = morphology::to_grayscale(image);
    let threshold = morphology::otsu_threshold(&gray);
    let binary = morphology::threshold_binary_inv(&gray, threshold);

    let opened = morphology::open(&binary, width, height, params.opening_iterations);
    let sure_bg = morphology::dilate(&opened, width, height, params.dilation_iterations);

    let dist = distance::distance_transform(&opened, width, height);
    let max_dist = dist.iter().cloned().fold(0.0f32, f32::max);
    let seed_threshold = params.sure_foreground_ratio * max_dist;
    let sure_fg: Vec<u8> = dist
        .iter()
        .map(|&d| if d > seed_threshold { 255 } else { 0 })
        .collect();

    // Band that belongs to neither confident region
    let unknown: Vec<u8> = sure_bg
        .iter()
        .zip(&sure_fg)
        .map(|(&bg, &fg)| bg.saturating_sub(fg))
        .collect();

    // Components offset by +1 so 0 stays reserved for the unknown band
    let (labels, component_count) = components::connected_components(&sure_fg, width, height);
    let mut markers: Vec<i32> = labels.iter().map(|&l| l + 1).collect();
    for (marker, &u) in markers.iter_mut().zip(&unknown) {
        if u != 0 {
            *marker = 0;
        }
    }
    debug!(component_count, max_dist, "watershed markers prepared");

    watershed::watershed(image, &mut markers);

    // Label 1 is the background basin, -1 the watershed boundary
    let data = markers.iter().map(|&m| u8::from(m > 1)).collect();
    ForegroundMask::new(image.width(), image.height(), data)
}
