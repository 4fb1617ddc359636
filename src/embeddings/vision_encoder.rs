// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ONNX vision encoder for crop embeddings
//!
//! Wraps an ONNX Runtime session around a SigLIP-style vision transformer.
//! Crops are resized to the model's square input, normalized, and run in a
//! single NCHW batch; the pooled output (or mean-pooled token output) is
//! the embedding. Batched and per-crop invocations produce identical
//! vectors.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::RgbaImage;
use ndarray::{Array4, Axis};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::CropEmbedder;

/// Input side length for the SigLIP so400m-patch14-384 checkpoint
pub const ENCODER_INPUT_SIZE: u32 = 384;

/// Normalization mean (SigLIP rescales to [-1, 1])
pub const MEAN: [f32; 3] = [0.5, 0.5, 0.5];

/// Normalization std
pub const STD: [f32; 3] = [0.5, 0.5, 0.5];

/// ONNX-based vision encoder
///
/// # Thread Safety
/// The session is wrapped in `Arc<Mutex>` for cheap cloning and thread-safe
/// shared access; the encoder is built once at process start and shared.
#[derive(Clone)]
pub struct OnnxVisionEncoder {
    session: Arc<Mutex<Session>>,
    input_name: String,
    model_name: String,
    input_size: u32,
    dimension: usize,
}

impl std::fmt::Debug for OnnxVisionEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxVisionEncoder")
            .field("model_name", &self.model_name)
            .field("input_size", &self.input_size)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxVisionEncoder {
    /// Load the encoder from an ONNX model file
    ///
    /// Tries CUDA first and falls back to CPU. A probe inference on a zero
    /// tensor determines the embedding dimension and whether the model
    /// emits pooled `[batch, dim]` or token-level `[batch, tokens, dim]`
    /// output.
    pub async fn new<P: AsRef<Path>>(model_name: impl Into<String>, model_path: P) -> Result<Self> {
        let model_name = model_name.into();
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Vision encoder model not found: {}", model_path.display());
        }

        info!("Loading vision encoder from {}", model_path.display());

        let cuda_result = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .context("Failed to set CUDA execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path);

        let mut session = match cuda_result {
            Ok(s) => {
                info!("CUDA execution provider initialized");
                s
            }
            Err(e) => {
                warn!("CUDA execution provider failed: {e}; falling back to CPU");
                Session::builder()
                    .context("Failed to create session builder")?
                    .with_execution_providers([CPUExecutionProvider::default().build()])
                    .context("Failed to set CPU execution provider")?
                    .with_optimization_level(GraphOptimizationLevel::Level3)
                    .context("Failed to set optimization level")?
                    .with_intra_threads(4)
                    .context("Failed to set intra threads")?
                    .commit_from_file(model_path)
                    .context(format!(
                        "Failed to load vision encoder from {}",
                        model_path.display()
                    ))?
            }
        };

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());

        // Probe to learn the output shape
        let input_size = ENCODER_INPUT_SIZE;
        let dimension = {
            let probe = Array4::<f32>::zeros((1, 3, input_size as usize, input_size as usize));
            let outputs = session
                .run(ort::inputs![input_name.as_str() => Value::from_array(probe)?])
                .context("Encoder probe inference failed")?;
            let output = outputs[0]
                .try_extract_array::<f32>()
                .context("Failed to extract probe output tensor")?;
            let shape = output.shape();
            match shape.len() {
                2 => shape[1],
                3 => shape[2],
                _ => anyhow::bail!(
                    "Encoder outputs unexpected dimensions: {:?} (expected [batch, dim] or [batch, tokens, dim])",
                    shape
                ),
            }
        };

        info!(
            "Vision encoder ready: model={}, input={}x{}, dimension={}",
            model_name, input_size, input_size, dimension
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            model_name,
            input_size,
            dimension,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Fill one batch slot of the NCHW tensor from a crop
    ///
    /// The crop is resized to the square model input; transparent pixels
    /// carry zero color channels and stay black, matching the upstream
    /// convention for out-of-mask regions.
    fn fill_tensor_slot(&self, tensor: &mut Array4<f32>, slot: usize, crop: &RgbaImage) {
        let size = self.input_size;
        let resized = image::imageops::resize(
            crop,
            size,
            size,
            image::imageops::FilterType::Triangle,
        );

        for y in 0..size as usize {
            for x in 0..size as usize {
                let pixel = resized.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    let normalized = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
                    tensor[[slot, c, y, x]] = normalized;
                }
            }
        }
    }
}

#[async_trait]
impl CropEmbedder for OnnxVisionEncoder {
    async fn embed_batch(&self, crops: &[RgbaImage]) -> Result<Vec<Vec<f32>>> {
        if crops.is_empty() {
            return Ok(vec![]);
        }

        let size = self.input_size as usize;
        let mut tensor = Array4::<f32>::zeros((crops.len(), 3, size, size));
        for (slot, crop) in crops.iter().enumerate() {
            self.fill_tensor_slot(&mut tensor, slot, crop);
        }

        let mut session_guard = self.session.lock().unwrap();
        let outputs = session_guard
            .run(ort::inputs![self.input_name.as_str() => Value::from_array(tensor)?])
            .context("Encoder inference failed")?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;
        let shape = output.shape().to_vec();

        let mut embeddings = Vec::with_capacity(crops.len());
        for batch_idx in 0..crops.len() {
            let item = output.index_axis(Axis(0), batch_idx);
            let embedding: Vec<f32> = match shape.len() {
                // Pooled output: [batch, dim]
                2 => item.iter().copied().collect(),
                // Token-level output: mean pool over the token axis
                3 => {
                    let tokens = item.shape()[0];
                    let dim = item.shape()[1];
                    let mut pooled = vec![0.0f32; dim];
                    for t in 0..tokens {
                        for d in 0..dim {
                            pooled[d] += item[[t, d]];
                        }
                    }
                    for v in &mut pooled {
                        *v /= tokens.max(1) as f32;
                    }
                    pooled
                }
                _ => anyhow::bail!("Unexpected encoder output shape: {:?}", shape),
            };

            if embedding.len() != self.dimension {
                anyhow::bail!(
                    "Unexpected embedding dimension at index {}: {} (expected {})",
                    batch_idx,
                    embedding.len(),
                    self.dimension
                );
            }
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
