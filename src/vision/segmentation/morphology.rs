// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Grayscale conversion, Otsu thresholding and 3x3 morphology
//!
//! Binary maps use the 0/255 convention throughout this module; the final
//! {0,1} foreground mask is produced at the segmentation boundary.

use image::RgbImage;

/// Convert an RGB image to 8-bit grayscale (Rec. 601 luma)
pub fn to_grayscale(img: &RgbImage) -> Vec<u8> {
    img.pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
        })
        .collect()
}

/// Compute the optimal threshold with Otsu's method
///
/// Maximizes between-class variance over the 256-bin histogram. Returns the
/// threshold value; callers decide the polarity of the binarization.
pub fn otsu_threshold(gray: &[u8]) -> u8 {
    let mut histogram = [0u32; 256];
    for &v in gray {
        histogram[v as usize] += 1;
    }

    let total = gray.len() as f64;
    let mut sum = 0.0;
    for (i, &count) in histogram.iter().enumerate() {
        sum += i as f64 * count as f64;
    }

    let mut sum_b = 0.0;
    let mut weight_b = 0.0;
    let mut max_variance = 0.0;
    let mut threshold = 0u8;

    for (i, &count) in histogram.iter().enumerate() {
        weight_b += count as f64;
        if weight_b == 0.0 {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0.0 {
            break;
        }
        sum_b += i as f64 * count as f64;

        let mean_b = sum_b / weight_b;
        let mean_f = (sum - sum_b) / weight_f;
        let variance = weight_b * weight_f * (mean_b - mean_f) * (mean_b - mean_f);

        if variance > max_variance {
            max_variance = variance;
            threshold = i as u8;
        }
    }

    threshold
}

/// Inverse binary threshold: pixels <= thresh become 255, the rest 0
pub fn threshold_binary_inv(gray: &[u8], thresh: u8) -> Vec<u8> {
    gray.iter().map(|&v| if v > thresh { 0 } else { 255 }).collect()
}

/// One 3x3 erosion pass; pixels outside the image count as background
fn erode_once(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut keep = true;
            'probe: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let ny = y as i64 + dy;
                    let nx = x as i64 + dx;
                    if ny < 0 || nx < 0 || ny >= height as i64 || nx >= width as i64 {
                        keep = false;
                        break 'probe;
                    }
                    if mask[ny as usize * width + nx as usize] == 0 {
                        keep = false;
                        break 'probe;
                    }
                }
            }
            if keep {
                out[y * width + x] = 255;
            }
        }
    }
    out
}

/// One 3x3 dilation pass
fn dilate_once(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut hit = false;
            'probe: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let ny = y as i64 + dy;
                    let nx = x as i64 + dx;
                    if ny < 0 || nx < 0 || ny >= height as i64 || nx >= width as i64 {
                        continue;
                    }
                    if mask[ny as usize * width + nx as usize] != 0 {
                        hit = true;
                        break 'probe;
                    }
                }
            }
            if hit {
                out[y * width + x] = 255;
            }
        }
    }
    out
}

/// Repeated 3x3 erosion
pub fn erode(mask: &[u8], width: usize, height: usize, iterations: u32) -> Vec<u8> {
    let mut current = mask.to_vec();
    for _ in 0..iterations {
        current = erode_once(&current, width, height);
    }
    current
}

/// Repeated 3x3 dilation
pub fn dilate(mask: &[u8], width: usize, height: usize, iterations: u32) -> Vec<u8> {
    let mut current = mask.to_vec();
    for _ in 0..iterations {
        current = dilate_once(&current, width, height);
    }
    current
}

/// Morphological opening: n erosions followed by n dilations
pub fn open(mask: &[u8], width: usize, height: usize, iterations: u32) -> Vec<u8> {
    let eroded = erode(mask, width, height, iterations);
    dilate(&eroded, width, height, iterations)
}
