// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crop embedding capability
//!
//! The clustering stage only needs `embed_batch`: a fixed-length vector per
//! crop, identical whether crops are embedded one at a time or batched.
//! [`vision_encoder::OnnxVisionEncoder`] is the production implementation;
//! [`DigestEmbedder`] is a deterministic stand-in used when no encoder
//! model is configured and by tests.

pub mod vision_encoder;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::RgbaImage;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub use vision_encoder::OnnxVisionEncoder;

/// Capability that turns crops into fixed-length feature vectors
#[async_trait]
pub trait CropEmbedder: Send + Sync {
    /// Embed a batch of crops; output order matches input order
    async fn embed_batch(&self, crops: &[RgbaImage]) -> Result<Vec<Vec<f32>>>;

    /// Output vector length
    fn dimension(&self) -> usize;
}

/// Deterministic pseudo-random embeddings derived from pixel content
///
/// Not a perceptual model: identical crops map to identical vectors and
/// anything else lands far away. Good enough for a degraded node and for
/// exercising the clustering path without model files.
#[derive(Debug, Clone)]
pub struct DigestEmbedder {
    dimension: usize,
    normalize: bool,
}

impl DigestEmbedder {
    pub fn new(dimension: usize, normalize: bool) -> Result<Self> {
        if dimension == 0 {
            return Err(anyhow!("Embedding dimension must be greater than 0"));
        }
        Ok(Self { dimension, normalize })
    }
}

#[async_trait]
impl CropEmbedder for DigestEmbedder {
    async fn embed_batch(&self, crops: &[RgbaImage]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(crops.len());

        for crop in crops {
            let mut hasher = DefaultHasher::new();
            crop.width().hash(&mut hasher);
            crop.height().hash(&mut hasher);
            crop.as_raw().hash(&mut hasher);
            let seed = hasher.finish();

            let mut embedding = Vec::with_capacity(self.dimension);
            let mut current_seed = seed;
            for i in 0..self.dimension {
                // Linear congruential generator for deterministic values
                current_seed =
                    (current_seed.wrapping_mul(1664525).wrapping_add(1013904223)) ^ (i as u64);
                let value = (current_seed as f64 / u64::MAX as f64) * 2.0 - 1.0;
                embedding.push(value as f32);
            }

            if self.normalize {
                let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for value in &mut embedding {
                        *value /= norm;
                    }
                }
            }

            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
