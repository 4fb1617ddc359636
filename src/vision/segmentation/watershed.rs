// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Marker-based watershed segmentation
//!
//! Floods the image's gradient landscape from labeled markers with a
//! priority queue: lowest-gradient pixels are claimed first, and pixels
//! where two different basins meet become boundary pixels (label -1).

use image::RgbImage;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Boundary label written where basins meet
pub const WATERSHED_BOUNDARY: i32 = -1;

/// Per-pixel gradient magnitude: the largest channel difference against the
/// 4-neighborhood. Cheap, and sufficient as a flooding relief.
fn gradient_relief(image: &RgbImage) -> Vec<u16> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let mut relief = vec![0u16; width * height];

    for y in 0..height {
        for x in 0..width {
            let here = image.get_pixel(x as u32, y as u32).0;
            let mut max_diff = 0u16;
            for (dx, dy) in [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)] {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let there = image.get_pixel(nx as u32, ny as u32).0;
                for c in 0..3 {
                    let diff = (here[c] as i16 - there[c] as i16).unsigned_abs();
                    max_diff = max_diff.max(diff);
                }
            }
            relief[y * width + x] = max_diff;
        }
    }
    relief
}

/// Flood `markers` in place from its positive labels
///
/// On entry `markers[i] > 0` marks a seed basin and `markers[i] == 0` marks
/// unknown territory. On exit every pixel carries a basin label or
/// [`WATERSHED_BOUNDARY`].
pub fn watershed(image: &RgbImage, markers: &mut [i32]) {
    let width = image.width() as usize;
    let height = image.height() as usize;
    debug_assert_eq!(markers.len(), width * height);

    let relief = gradient_relief(image);

    // (priority, insertion order, index): the order tiebreak keeps the
    // flood deterministic for equal relief values
    let mut heap: BinaryHeap<Reverse<(u16, u64, usize)>> = BinaryHeap::new();
    let mut queued = vec![false; markers.len()];
    let mut order = 0u64;

    let neighbors = |idx: usize| {
        let x = idx % width;
        let y = idx / width;
        let mut out = [usize::MAX; 4];
        let mut n = 0;
        if x > 0 {
            out[n] = idx - 1;
            n += 1;
        }
        if x + 1 < width {
            out[n] = idx + 1;
            n += 1;
        }
        if y > 0 {
            out[n] = idx - width;
            n += 1;
        }
        if y + 1 < height {
            out[n] = idx + width;
            n += 1;
        }
        (out, n)
    };

    for idx in 0..markers.len() {
        if markers[idx] <= 0 {
            continue;
        }
        let (nbrs, n) = neighbors(idx);
        for &nb in nbrs.iter().take(n) {
            if markers[nb] == 0 && !queued[nb] {
                queued[nb] = true;
                heap.push(Reverse((relief[nb], order, nb)));
                order += 1;
            }
        }
    }

    while let Some(Reverse((_, _, idx))) = heap.pop() {
        if markers[idx] != 0 {
            continue;
        }

        // Collect the labels already claimed around this pixel
        let (nbrs, n) = neighbors(idx);
        let mut label = 0i32;
        let mut contested = false;
        for &nb in nbrs.iter().take(n) {
            let m = markers[nb];
            if m > 0 {
                if label == 0 {
                    label = m;
                } else if label != m {
                    contested = true;
                }
            }
        }

        if contested {
            markers[idx] = WATERSHED_BOUNDARY;
            continue;
        }
        if label == 0 {
            // Re-queued neighbor of a boundary pixel; leave for later rounds
            continue;
        }
        markers[idx] = label;

        for &nb in nbrs.iter().take(n) {
            if markers[nb] == 0 && !queued[nb] {
                queued[nb] = true;
                heap.push(Reverse((relief[nb], order, nb)));
                order += 1;
            }
        }
    }

    // Pixels never reached by any basin (fully fenced by boundaries) stay 0;
    // fold them into the boundary so every pixel carries a final label
    for m in markers.iter_mut() {
        if *m == 0 {
            *m = WATERSHED_BOUNDARY;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn flat_image(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn test_single_marker_floods_everything() {
        let img = flat_image(5, 5, 100);
        let mut markers = vec![0i32; 25];
        markers[12] = 1;
        watershed(&img, &mut markers);
        assert!(markers.iter().all(|&m| m == 1));
    }

    #[test]
    fn test_two_markers_meet_at_boundary() {
        let img = flat_image(9, 1, 100);
        let mut markers = vec![0i32; 9];
        markers[0] = 1;
        markers[8] = 2;
        watershed(&img, &mut markers);
        let boundary = markers.iter().filter(|&&m| m == WATERSHED_BOUNDARY).count();
        assert!(boundary >= 1, "basins must be separated: {:?}", markers);
        assert!(markers.iter().any(|&m| m == 1));
        assert!(markers.iter().any(|&m| m == 2));
    }

    #[test]
    fn test_flood_respects_gradient_walls() {
        // Dark blob on bright background with a sharp edge: the basin
        // seeded inside the blob claims the blob before spilling outside
        let mut img = flat_image(9, 9, 220);
        for y in 2..=6 {
            for x in 2..=6 {
                img.put_pixel(x, y, Rgb([30, 30, 30]));
            }
        }
        let mut markers = vec![0i32; 81];
        markers[4 * 9 + 4] = 2; // inside the blob
        markers[0] = 1; // background corner
        watershed(&img, &mut markers);

        assert_eq!(markers[4 * 9 + 4], 2);
        assert_eq!(markers[3 * 9 + 3], 2, "blob interior joins the blob basin");
        assert_eq!(markers[8 * 9 + 8], 1, "far background joins the outer basin");
    }

    #[test]
    fn test_all_pixels_labeled_after_flood() {
        let img = flat_image(6, 4, 50);
        let mut markers = vec![0i32; 24];
        markers[0] = 1;
        markers[23] = 2;
        watershed(&img, &mut markers);
        assert!(markers.iter().all(|&m| m != 0));
    }
}
