// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Rectangle-initialized whole-image foreground cut
//!
//! Energy-minimization segmentation over the four-state vocabulary
//! {definite background = 0, definite foreground = 1, probable background
//! = 2, probable foreground = 3}. The border band outside the inset
//! rectangle is pinned to definite background; everything inside starts as
//! probable foreground. Each refinement iteration re-fits per-class color
//! models (k-means palettes with mixture weights) and relabels the probable
//! pixels by color likelihood plus a neighbor-smoothness term.

use image::RgbImage;

/// Pixel states, matching the classic graph-cut vocabulary
pub const STATE_BGD: u8 = 0;
pub const STATE_FGD: u8 = 1;
pub const STATE_PR_BGD: u8 = 2;
pub const STATE_PR_FGD: u8 = 3;

/// Color components per class model
const MODEL_COMPONENTS: usize = 5;

/// k-means refinement passes when fitting a class model
const MODEL_FIT_ITERATIONS: usize = 8;

/// Variance floor keeping flat color regions from degenerating
const VARIANCE_FLOOR: f32 = 25.0;

/// A weighted isotropic color component
#[derive(Debug, Clone, Copy)]
struct Component {
    mean: [f32; 3],
    variance: f32,
    weight: f32,
}

/// Per-class color model: up to [`MODEL_COMPONENTS`] weighted components
#[derive(Debug, Clone)]
struct ColorModel {
    components: Vec<Component>,
}

impl ColorModel {
    /// Fit a model to the given colors with deterministic k-means:
    /// initial centroids are luma-quantile colors, so identical input
    /// always produces identical models.
    fn fit(colors: &[[f32; 3]]) -> Option<Self> {
        if colors.is_empty() {
            return None;
        }
        let k = MODEL_COMPONENTS.min(colors.len());

        let mut by_luma: Vec<usize> = (0..colors.len()).collect();
        by_luma.sort_by(|&a, &b| {
            let la = luma(&colors[a]);
            let lb = luma(&colors[b]);
            la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
        });

        // Initial centroids spread across the luma range
        let mut means: Vec<[f32; 3]> = (0..k)
            .map(|i| {
                let pos = if k == 1 { 0 } else { i * (colors.len() - 1) / (k - 1) };
                colors[by_luma[pos]]
            })
            .collect();

        let mut assignment = vec![0usize; colors.len()];
        for _ in 0..MODEL_FIT_ITERATIONS {
            // Assign
            for (i, c) in colors.iter().enumerate() {
                let mut best = 0usize;
                let mut best_dist = f32::MAX;
                for (j, m) in means.iter().enumerate() {
                    let d = sq_dist(c, m);
                    if d < best_dist {
                        best_dist = d;
                        best = j;
                    }
                }
                assignment[i] = best;
            }
            // Update
            let mut sums = vec![[0.0f32; 3]; k];
            let mut counts = vec![0usize; k];
            for (i, c) in colors.iter().enumerate() {
                let a = assignment[i];
                for ch in 0..3 {
                    sums[a][ch] += c[ch];
                }
                counts[a] += 1;
            }
            for j in 0..k {
                if counts[j] > 0 {
                    for ch in 0..3 {
                        means[j][ch] = sums[j][ch] / counts[j] as f32;
                    }
                }
            }
        }

        // Final statistics per component
        let mut variances = vec![0.0f32; k];
        let mut counts = vec![0usize; k];
        for (i, c) in colors.iter().enumerate() {
            let a = assignment[i];
            variances[a] += sq_dist(c, &means[a]);
            counts[a] += 1;
        }

        let total = colors.len() as f32;
        let components = (0..k)
            .filter(|&j| counts[j] > 0)
            .map(|j| Component {
                mean: means[j],
                variance: variances[j] / (3.0 * counts[j] as f32) + VARIANCE_FLOOR,
                weight: counts[j] as f32 / total,
            })
            .collect();

        Some(Self { components })
    }

    /// Negative log likelihood of a color under the mixture
    fn cost(&self, color: &[f32; 3]) -> f32 {
        let mut likelihood = 0.0f64;
        for comp in &self.components {
            let d = sq_dist(color, &comp.mean) as f64;
            let var = comp.variance as f64;
            likelihood += comp.weight as f64 * (-d / (2.0 * var)).exp() / var.powf(1.5);
        }
        -(likelihood.max(1e-300)).ln() as f32
    }
}

fn luma(c: &[f32; 3]) -> f32 {
    0.299 * c[0] + 0.587 * c[1] + 0.114 * c[2]
}

fn sq_dist(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

/// Run the whole-image cut and return the per-pixel states
///
/// `inset` is the pixel border pinned to definite background on every side;
/// `iterations` is the number of model-refit/relabel rounds.
pub fn rect_cut_states(image: &RgbImage, inset: u32, iterations: u32) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;

    let colors: Vec<[f32; 3]> = image
        .pixels()
        .map(|p| [p.0[0] as f32, p.0[1] as f32, p.0[2] as f32])
        .collect();

    // Clamp so a tiny image still keeps an interior
    let inset_x = (inset as usize).min(width.saturating_sub(1) / 2);
    let inset_y = (inset as usize).min(height.saturating_sub(1) / 2);

    let mut states = vec![STATE_BGD; width * height];
    for y in inset_y..height - inset_y {
        for x in inset_x..width - inset_x {
            states[y * width + x] = STATE_PR_FGD;
        }
    }

    // Degenerate rectangle: nothing to refine
    if !states.contains(&STATE_PR_FGD) {
        return states;
    }

    for _ in 0..iterations {
        let bg_colors: Vec<[f32; 3]> = states
            .iter()
            .zip(&colors)
            .filter(|(s, _)| **s == STATE_BGD || **s == STATE_PR_BGD)
            .map(|(_, c)| *c)
            .collect();
        let fg_colors: Vec<[f32; 3]> = states
            .iter()
            .zip(&colors)
            .filter(|(s, _)| **s == STATE_FGD || **s == STATE_PR_FGD)
            .map(|(_, c)| *c)
            .collect();

        let bg_model = match ColorModel::fit(&bg_colors) {
            Some(m) => m,
            None => break,
        };
        let fg_model = match ColorModel::fit(&fg_colors) {
            Some(m) => m,
            None => break,
        };

        // Relabel every probable pixel by class likelihood. The subsequent
        // majority pass is the smoothness term of the energy: an exact
        // min-cut is replaced by relabel-then-regularize rounds.
        for idx in 0..states.len() {
            if states[idx] == STATE_BGD || states[idx] == STATE_FGD {
                continue;
            }
            let fg_cost = fg_model.cost(&colors[idx]);
            let bg_cost = bg_model.cost(&colors[idx]);
            states[idx] = if fg_cost < bg_cost { STATE_PR_FGD } else { STATE_PR_BGD };
        }

        smooth_probable(&mut states, width, height);
    }

    states
}

/// 3x3 majority vote over the probable pixels
///
/// A probable pixel flips only when a strict majority of its window
/// (itself included) carries the other class.
fn smooth_probable(states: &mut Vec<u8>, width: usize, height: usize) {
    let snapshot = states.clone();
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if snapshot[idx] == STATE_BGD || snapshot[idx] == STATE_FGD {
                continue;
            }

            let mut fg_votes = 0i32;
            let mut total = 0i32;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    total += 1;
                    match snapshot[ny as usize * width + nx as usize] {
                        STATE_FGD | STATE_PR_FGD => fg_votes += 1,
                        _ => {}
                    }
                }
            }

            if 2 * fg_votes > total {
                states[idx] = STATE_PR_FGD;
            } else if 2 * fg_votes < total {
                states[idx] = STATE_PR_BGD;
            }
        }
    }
}
