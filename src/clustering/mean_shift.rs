// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Flat-kernel mean-shift clustering with bin seeding
//!
//! Cluster count is not fixed in advance; it emerges from the data and the
//! bandwidth. Bandwidth can be estimated from a sample of the input at a
//! quantile, mirroring the usual estimator: the mean distance of each
//! sampled point to its ⌊quantile·n⌋-th nearest neighbor.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use std::collections::HashMap;
use tracing::debug;

/// Seed for bandwidth-estimation sampling. Fixed so repeated runs on the
/// same input agree; cross-implementation bit-exactness is not promised.
const SAMPLE_SEED: u64 = 42;

/// Convergence tolerance as a fraction of the bandwidth
const CONVERGENCE_RATIO: f32 = 1e-3;

/// Mean-shift output: one label per input point plus the mode colors
#[derive(Debug, Clone)]
pub struct MeanShiftResult {
    /// Cluster label per input point, in input order
    pub labels: Vec<usize>,
    /// Cluster centers (modes), indexed by label
    pub centers: Vec<[f32; 3]>,
}

impl MeanShiftResult {
    pub fn cluster_count(&self) -> usize {
        self.centers.len()
    }
}

/// Estimate a clustering bandwidth from a sample of the input
///
/// Returns 0.0 for degenerate inputs (fewer than two points, or identical
/// points); callers treat that as "everything is one cluster".
pub fn estimate_bandwidth(points: &[[f32; 3]], quantile: f32, max_samples: usize) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }

    let n_samples = points.len().min(max_samples.max(2));
    let sampled: Vec<[f32; 3]> = if points.len() > n_samples {
        let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
        sample(&mut rng, points.len(), n_samples)
            .iter()
            .map(|i| points[i])
            .collect()
    } else {
        points.to_vec()
    };

    // Distance to the k-th nearest neighbor, self included at rank 0
    let knn = ((n_samples as f32 * quantile) as usize).max(1);
    let mut total = 0.0f64;
    let mut dists = vec![0.0f32; n_samples];
    for a in &sampled {
        for (j, b) in sampled.iter().enumerate() {
            dists[j] = distance(a, b);
        }
        dists.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
        // Rank 0 is the point itself; the estimator reads rank knn-1
        total += dists[(knn - 1).min(n_samples - 1)] as f64;
    }

    (total / n_samples as f64) as f32
}

/// Run mean-shift over the points
///
/// Seeds are taken from occupied bandwidth-sized grid bins rather than from
/// every point, then shifted to their local density mode. Modes closer than
/// the bandwidth are merged, strongest first, and every point is labeled
/// with its nearest surviving mode.
pub fn mean_shift(points: &[[f32; 3]], bandwidth: f32, max_iter: usize) -> MeanShiftResult {
    if points.is_empty() {
        return MeanShiftResult {
            labels: Vec::new(),
            centers: Vec::new(),
        };
    }

    // Degenerate bandwidth: a single cluster at the mean
    if bandwidth <= 0.0 {
        let mut mean = [0.0f32; 3];
        for p in points {
            for c in 0..3 {
                mean[c] += p[c];
            }
        }
        for c in mean.iter_mut() {
            *c /= points.len() as f32;
        }
        return MeanShiftResult {
            labels: vec![0; points.len()],
            centers: vec![mean],
        };
    }

    let seeds = bin_seeds(points, bandwidth);
    debug!(seeds = seeds.len(), bandwidth, "mean-shift seeding");

    // Shift each seed to its mode
    let mut modes: Vec<([f32; 3], usize)> = Vec::new();
    let tolerance = bandwidth * CONVERGENCE_RATIO;
    for seed in seeds {
        let mut center = seed;
        let mut members = 0usize;
        for _ in 0..max_iter {
            let mut sum = [0.0f32; 3];
            let mut count = 0usize;
            for p in points {
                if distance(&center, p) <= bandwidth {
                    for c in 0..3 {
                        sum[c] += p[c];
                    }
                    count += 1;
                }
            }
            if count == 0 {
                break;
            }
            let next = [
                sum[0] / count as f32,
                sum[1] / count as f32,
                sum[2] / count as f32,
            ];
            let moved = distance(&center, &next);
            center = next;
            members = count;
            if moved < tolerance {
                break;
            }
        }
        if members > 0 {
            modes.push((center, members));
        }
    }

    // Merge modes within one bandwidth of a stronger mode
    modes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| {
        a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal)
    }));
    let mut centers: Vec<[f32; 3]> = Vec::new();
    for (mode, _) in &modes {
        if centers.iter().all(|kept| distance(kept, mode) > bandwidth) {
            centers.push(*mode);
        }
    }
    if centers.is_empty() {
        centers.push(modes.first().map(|(m, _)| *m).unwrap_or([0.0; 3]));
    }

    // Label every point with its nearest mode
    let labels = points
        .iter()
        .map(|p| {
            let mut best = 0usize;
            let mut best_dist = f32::MAX;
            for (i, c) in centers.iter().enumerate() {
                let d = distance(p, c);
                if d < best_dist {
                    best_dist = d;
                    best = i;
                }
            }
            best
        })
        .collect();

    MeanShiftResult { labels, centers }
}

/// One seed per occupied bandwidth-sized grid bin
fn bin_seeds(points: &[[f32; 3]], bin_size: f32) -> Vec<[f32; 3]> {
    let mut bins: HashMap<[i64; 3], usize> = HashMap::new();
    for p in points {
        let key = [
            (p[0] / bin_size).round() as i64,
            (p[1] / bin_size).round() as i64,
            (p[2] / bin_size).round() as i64,
        ];
        *bins.entry(key).or_insert(0) += 1;
    }

    let mut seeds: Vec<[f32; 3]> = bins
        .keys()
        .map(|k| {
            [
                k[0] as f32 * bin_size,
                k[1] as f32 * bin_size,
                k[2] as f32 * bin_size,
            ]
        })
        .collect();
    // HashMap iteration order is arbitrary; keep the seed list deterministic
    seeds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    seeds
}

fn distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    (dr * dr + dg * dg + db * db).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(color: [f32; 3], n: usize) -> Vec<[f32; 3]> {
        vec![color; n]
    }

    #[test]
    fn test_empty_input() {
        let result = mean_shift(&[], 10.0, 300);
        assert_eq!(result.cluster_count(), 0);
        assert!(result.labels.is_empty());
    }

    #[test]
    fn test_single_color_single_cluster() {
        let points = block([100.0, 150.0, 50.0], 40);
        let result = mean_shift(&points, 25.0, 300);
        assert_eq!(result.cluster_count(), 1);
        assert!(result.labels.iter().all(|&l| l == 0));
        let c = result.centers[0];
        assert!((c[0] - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_two_well_separated_colors() {
        let mut points = block([255.0, 0.0, 0.0], 50);
        points.extend(block([0.0, 255.0, 0.0], 50));
        // Bandwidth below the inter-color distance, above intra-color spread
        let result = mean_shift(&points, 60.0, 300);
        assert_eq!(result.cluster_count(), 2);
        assert_ne!(result.labels[0], result.labels[99]);
        // Each group is uniform
        assert!(result.labels[..50].iter().all(|&l| l == result.labels[0]));
        assert!(result.labels[50..].iter().all(|&l| l == result.labels[99]));
    }

    #[test]
    fn test_large_bandwidth_merges_everything() {
        let mut points = block([255.0, 0.0, 0.0], 30);
        points.extend(block([0.0, 255.0, 0.0], 30));
        let result = mean_shift(&points, 500.0, 300);
        assert_eq!(result.cluster_count(), 1);
    }

    #[test]
    fn test_zero_bandwidth_degenerates_to_one_cluster() {
        let points = block([10.0, 10.0, 10.0], 5);
        let result = mean_shift(&points, 0.0, 300);
        assert_eq!(result.cluster_count(), 1);
        assert!(result.labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_estimate_bandwidth_positive_for_spread_points() {
        let points: Vec<[f32; 3]> = (0..50).map(|i| [i as f32 * 3.0, 0.0, 0.0]).collect();
        let bw = estimate_bandwidth(&points, 0.2, 500);
        assert!(bw > 0.0);
    }

    #[test]
    fn test_estimate_bandwidth_degenerate_inputs() {
        assert_eq!(estimate_bandwidth(&[], 0.2, 500), 0.0);
        assert_eq!(estimate_bandwidth(&[[1.0, 2.0, 3.0]], 0.2, 500), 0.0);
        // Identical points: every neighbor distance is zero
        let same = block([5.0, 5.0, 5.0], 50);
        assert_eq!(estimate_bandwidth(&same, 0.2, 500), 0.0);
    }

    #[test]
    fn test_estimate_bandwidth_caps_samples() {
        // More points than the cap must still terminate and stay positive
        let mut points = Vec::new();
        for i in 0..2000 {
            let v = (i % 256) as f32;
            points.push([v, 255.0 - v, 128.0]);
        }
        let bw = estimate_bandwidth(&points, 0.2, 500);
        assert!(bw > 0.0);
    }

    #[test]
    fn test_deterministic_labels() {
        let mut points = block([20.0, 40.0, 60.0], 25);
        points.extend(block([220.0, 10.0, 90.0], 25));
        let a = mean_shift(&points, 50.0, 300);
        let b = mean_shift(&points, 50.0, 300);
        assert_eq!(a.labels, b.labels);
    }
}
