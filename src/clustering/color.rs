// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Color-space clustering of segmented foreground pixels
//!
//! Gathers the foreground pixels in row-major mask order, groups them with
//! mean-shift in RGB space, and materializes the visual artifacts consumed
//! by the description stage: a full-size raster with every foreground pixel
//! painted in its cluster centroid color, and one masked image per cluster
//! with non-members painted white.

use crate::clustering::mean_shift::{estimate_bandwidth, mean_shift};
use crate::config::PipelineParams;
use crate::vision::segmentation::ForegroundMask;
use image::{Rgb, RgbImage};
use tracing::{debug, info};

/// Result of clustering the foreground pixels of one image
///
/// `labels` follows row-major mask order: the i-th label belongs to the
/// i-th foreground pixel encountered scanning rows top to bottom. A run
/// with zero foreground pixels produces the empty result (no clusters),
/// which is a valid outcome rather than an error.
#[derive(Debug, Clone)]
pub struct ColorClustering {
    /// Cluster label per foreground pixel, in mask order
    pub labels: Vec<usize>,
    /// Centroid color per cluster id
    pub centers: Vec<[f32; 3]>,
    /// Bandwidth actually used (estimated when not supplied)
    pub bandwidth: f32,
}

impl ColorClustering {
    pub fn cluster_count(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Cluster the masked pixels of `image` by color
///
/// When `bandwidth` is `None` it is estimated from a bounded sample of the
/// foreground pixels; larger bandwidths produce fewer, coarser groups.
pub fn cluster_colors(
    image: &RgbImage,
    mask: &ForegroundMask,
    bandwidth: Option<f32>,
    params: &PipelineParams,
) -> ColorClustering {
    let points = foreground_pixels(image, mask);
    if points.is_empty() {
        debug!("no foreground pixels; returning the empty clustering");
        return ColorClustering {
            labels: Vec::new(),
            centers: Vec::new(),
            bandwidth: 0.0,
        };
    }

    let bandwidth = bandwidth.unwrap_or_else(|| {
        estimate_bandwidth(&points, params.bandwidth_quantile, params.bandwidth_samples)
    });

    let result = mean_shift(&points, bandwidth, params.mean_shift_max_iter);
    info!(
        clusters = result.cluster_count(),
        pixels = points.len(),
        bandwidth,
        "color clustering complete"
    );

    ColorClustering {
        labels: result.labels,
        centers: result.centers,
        bandwidth,
    }
}

/// Foreground pixel colors in row-major mask order
fn foreground_pixels(image: &RgbImage, mask: &ForegroundMask) -> Vec<[f32; 3]> {
    let mut points = Vec::new();
    for y in 0..image.height() {
        for x in 0..image.width() {
            if mask.is_foreground(x, y) {
                let [r, g, b] = image.get_pixel(x, y).0;
                points.push([r as f32, g as f32, b as f32]);
            }
        }
    }
    points
}

/// Paint every foreground pixel with its cluster centroid color
///
/// Background pixels stay black. The walk order must match
/// [`foreground_pixels`] so labels line up with their pixels.
pub fn paint_clustered_image(
    image: &RgbImage,
    mask: &ForegroundMask,
    clustering: &ColorClustering,
) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    let mut label_idx = 0usize;
    for y in 0..image.height() {
        for x in 0..image.width() {
            if mask.is_foreground(x, y) {
                let center = clustering.centers[clustering.labels[label_idx]];
                out.put_pixel(
                    x,
                    y,
                    Rgb([center[0] as u8, center[1] as u8, center[2] as u8]),
                );
                label_idx += 1;
            }
        }
    }
    out
}

/// One masked image per cluster, ordered by ascending cluster id
///
/// Members keep their original color; background and non-member foreground
/// pixels are painted white for the description stage.
pub fn materialize_cluster_images(
    image: &RgbImage,
    mask: &ForegroundMask,
    clustering: &ColorClustering,
) -> Vec<RgbImage> {
    let white = Rgb([255, 255, 255]);
    let mut images = Vec::with_capacity(clustering.cluster_count());

    for cluster_id in 0..clustering.cluster_count() {
        let mut out = RgbImage::from_pixel(image.width(), image.height(), white);
        let mut label_idx = 0usize;
        for y in 0..image.height() {
            for x in 0..image.width() {
                if mask.is_foreground(x, y) {
                    if clustering.labels[label_idx] == cluster_id {
                        out.put_pixel(x, y, *image.get_pixel(x, y));
                    }
                    label_idx += 1;
                }
            }
        }
        images.push(out);
    }

    images
}

/// Keep foreground pixels, black out the rest
pub fn paint_segmented_image(image: &RgbImage, mask: &ForegroundMask) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for y in 0..image.height() {
        for x in 0..image.width() {
            if mask.is_foreground(x, y) {
                out.put_pixel(x, y, *image.get_pixel(x, y));
            }
        }
    }
    out
}
