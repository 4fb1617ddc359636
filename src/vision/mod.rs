// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing module for CPU-based image analysis
//!
//! This module provides:
//! - Image ingestion with a single canonical-RGB conversion boundary
//! - Foreground/background segmentation (two strategies)
//! - Annotation-mask crop extraction
//! - Vegetation descriptions via a VLM sidecar

pub mod crop;
pub mod image_utils;
pub mod segmentation;
pub mod vlm_client;

pub use crop::{extract_crop, Crop, CropError};
pub use image_utils::{decode_base64_image, decode_image_bytes, detect_format, ImageError, ImageInfo};
pub use segmentation::{segment, ForegroundMask, SegmentationStrategy};
pub use vlm_client::{parse_description, DescribeResult, VegetationDescription, VlmClient};
