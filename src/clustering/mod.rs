// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Clustering stages for both pipelines
//!
//! `color` groups segmented foreground pixels with mean-shift; `agglomerative`
//! groups crop embeddings with threshold-bounded ward linkage.

pub mod agglomerative;
pub mod color;
pub mod mean_shift;

pub use agglomerative::agglomerate;
pub use color::{
    cluster_colors, materialize_cluster_images, paint_clustered_image, paint_segmented_image,
    ColorClustering,
};
pub use mean_shift::{estimate_bandwidth, mean_shift, MeanShiftResult};
