// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Agglomerative clustering of embedding vectors
//!
//! Bottom-up ward-linkage clustering with a distance threshold instead of a
//! fixed cluster count: the closest pair of clusters is merged repeatedly
//! until the closest remaining pair's linkage distance reaches the
//! threshold. Squared distances are maintained with the Lance-Williams
//! recurrence; reported heights are their square roots, so singleton merges
//! happen at plain Euclidean distance.

use tracing::debug;

/// Cluster embedding vectors, returning one label per input vector
///
/// Labels are dense non-negative integers assigned in order of each
/// cluster's first-seen input index, so label 0 always contains input 0.
/// Empty input yields an empty label list. Vectors must share one length.
pub fn agglomerate(embeddings: &[Vec<f32>], threshold: f32) -> Vec<usize> {
    let n = embeddings.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0];
    }

    // Active clusters: member lists plus pairwise squared ward distances
    let mut members: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();
    let mut dist2 = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = sq_euclidean(&embeddings[i], &embeddings[j]);
            dist2[i][j] = d;
            dist2[j][i] = d;
        }
    }

    let threshold2 = threshold * threshold;
    let mut active = n;

    while active > 1 {
        // Closest active pair
        let mut best = (0usize, 0usize);
        let mut best_d = f32::MAX;
        for i in 0..n {
            if members[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if members[j].is_none() {
                    continue;
                }
                if dist2[i][j] < best_d {
                    best_d = dist2[i][j];
                    best = (i, j);
                }
            }
        }

        // Merges at or above the threshold do not happen
        if best_d >= threshold2 {
            break;
        }

        let (i, j) = best;
        let ni = members[i].as_ref().map(Vec::len).unwrap_or(0) as f32;
        let nj = members[j].as_ref().map(Vec::len).unwrap_or(0) as f32;

        // Lance-Williams ward update against every other active cluster
        for k in 0..n {
            if k == i || k == j || members[k].is_none() {
                continue;
            }
            let nk = members[k].as_ref().map(Vec::len).unwrap_or(0) as f32;
            let updated = ((ni + nk) * dist2[i][k] + (nj + nk) * dist2[j][k]
                - nk * dist2[i][j])
                / (ni + nj + nk);
            dist2[i][k] = updated;
            dist2[k][i] = updated;
        }

        let absorbed = members[j].take().unwrap_or_default();
        if let Some(m) = members[i].as_mut() {
            m.extend(absorbed);
        }
        active -= 1;
    }

    debug!(clusters = active, items = n, threshold, "agglomeration complete");

    // Dense labels ordered by each cluster's smallest member index
    let mut clusters: Vec<Vec<usize>> = members.into_iter().flatten().collect();
    clusters.sort_by_key(|m| m.iter().min().copied().unwrap_or(usize::MAX));

    let mut labels = vec![0usize; n];
    for (label, cluster) in clusters.iter().enumerate() {
        for &item in cluster {
            labels[item] = label;
        }
    }
    labels
}

fn sq_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(values: &[f32]) -> Vec<f32> {
        values.to_vec()
    }

    #[test]
    fn test_empty_input() {
        let labels = agglomerate(&[], 20.0);
        assert!(labels.is_empty());
    }

    #[test]
    fn test_single_item() {
        let labels = agglomerate(&[embedding(&[1.0, 2.0])], 20.0);
        assert_eq!(labels, vec![0]);
    }

    #[test]
    fn test_identical_embeddings_single_cluster() {
        let e = embedding(&[3.0, 1.0, 4.0, 1.0]);
        let embeddings = vec![e.clone(), e.clone(), e.clone(), e.clone(), e];
        let labels = agglomerate(&embeddings, 20.0);
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_two_far_groups_two_clusters() {
        let embeddings = vec![
            embedding(&[0.0, 0.0]),
            embedding(&[1.0, 0.0]),
            embedding(&[100.0, 100.0]),
            embedding(&[101.0, 100.0]),
        ];
        let labels = agglomerate(&embeddings, 20.0);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_label_zero_contains_first_item() {
        let embeddings = vec![
            embedding(&[50.0, 50.0]),
            embedding(&[0.0, 0.0]),
            embedding(&[0.5, 0.0]),
        ];
        let labels = agglomerate(&embeddings, 5.0);
        assert_eq!(labels[0], 0, "first input always lands in label 0");
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[1], 1);
    }

    #[test]
    fn test_threshold_zero_keeps_singletons() {
        let embeddings = vec![
            embedding(&[0.0]),
            embedding(&[1.0]),
            embedding(&[2.0]),
        ];
        let labels = agglomerate(&embeddings, 0.0);
        assert_eq!(labels, vec![0, 1, 2]);
    }

    #[test]
    fn test_large_threshold_merges_everything() {
        let embeddings = vec![
            embedding(&[0.0, 0.0]),
            embedding(&[10.0, 0.0]),
            embedding(&[0.0, 10.0]),
        ];
        let labels = agglomerate(&embeddings, 1000.0);
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_merge_at_exact_threshold_does_not_happen() {
        let embeddings = vec![embedding(&[0.0]), embedding(&[5.0])];
        let labels = agglomerate(&embeddings, 5.0);
        assert_eq!(labels, vec![0, 1]);
    }
}
