// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration loaded from environment variables

use std::env;
use std::path::PathBuf;

/// Top-level node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the HTTP API listens on
    pub api_port: u16,
    /// Base URL of the VLM sidecar (OpenAI-compatible), if configured
    pub vlm_endpoint: Option<String>,
    /// Model name announced to the VLM sidecar
    pub vlm_model: String,
    /// Path to the ONNX vision encoder used for crop embeddings
    pub encoder_model_path: Option<PathBuf>,
    /// Directory where survey rasters and cluster reports are written
    pub output_dir: PathBuf,
    /// Timeout for fetching images by URL, in seconds
    pub fetch_timeout_secs: u64,
    /// Timeout for a single VLM description call, in seconds
    pub describe_timeout_secs: u64,
    /// Tunables for the segmentation/clustering stages
    pub pipeline: PipelineParams,
}

/// Empirically tuned pipeline parameters
///
/// None of these values has a derivation; they are carried as configuration
/// rather than hard-coded so deployments can retune them.
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Inset of the initialization rectangle for the whole-image cut, in pixels
    pub cut_rect_inset: u32,
    /// Refinement iterations for the whole-image cut
    pub cut_iterations: u32,
    /// Morphological opening iterations in the seeded strategy
    pub opening_iterations: u32,
    /// Dilation iterations producing the sure-background estimate
    pub dilation_iterations: u32,
    /// Fraction of the max distance-transform value kept as sure foreground
    pub sure_foreground_ratio: f32,
    /// Quantile for mean-shift bandwidth estimation
    pub bandwidth_quantile: f32,
    /// Maximum number of pixels sampled for bandwidth estimation
    pub bandwidth_samples: usize,
    /// Maximum mean-shift iterations per seed
    pub mean_shift_max_iter: usize,
    /// Ward linkage distance threshold for crop clustering
    pub linkage_threshold: f32,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            cut_rect_inset: 5,
            cut_iterations: 5,
            opening_iterations: 2,
            dilation_iterations: 3,
            sure_foreground_ratio: 0.7,
            bandwidth_quantile: 0.2,
            bandwidth_samples: 500,
            mean_shift_max_iter: 300,
            linkage_threshold: 20.0,
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = PipelineParams::default();
        Self {
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            vlm_endpoint: env::var("VLM_ENDPOINT").ok(),
            vlm_model: env::var("VLM_MODEL").unwrap_or_else(|_| "qwen3-vl".to_string()),
            encoder_model_path: env::var("ENCODER_MODEL_PATH").ok().map(PathBuf::from),
            output_dir: env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./output")),
            fetch_timeout_secs: env::var("FETCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            describe_timeout_secs: env::var("DESCRIBE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            pipeline: PipelineParams {
                cut_rect_inset: parse_env("CUT_RECT_INSET", defaults.cut_rect_inset),
                cut_iterations: parse_env("CUT_ITERATIONS", defaults.cut_iterations),
                opening_iterations: parse_env("OPENING_ITERATIONS", defaults.opening_iterations),
                dilation_iterations: parse_env("DILATION_ITERATIONS", defaults.dilation_iterations),
                sure_foreground_ratio: parse_env(
                    "SURE_FOREGROUND_RATIO",
                    defaults.sure_foreground_ratio,
                ),
                bandwidth_quantile: parse_env("BANDWIDTH_QUANTILE", defaults.bandwidth_quantile),
                bandwidth_samples: parse_env("BANDWIDTH_SAMPLES", defaults.bandwidth_samples),
                mean_shift_max_iter: parse_env("MEAN_SHIFT_MAX_ITER", defaults.mean_shift_max_iter),
                linkage_threshold: parse_env("LINKAGE_THRESHOLD", defaults.linkage_threshold),
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
