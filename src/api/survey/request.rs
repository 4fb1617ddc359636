// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! SurveyRequest type for POST /v1/survey

use crate::api::ApiError;
use crate::vision::segmentation::SegmentationStrategy;
use serde::{Deserialize, Serialize};

/// Request body for POST /v1/survey
///
/// # Fields
/// - `image`: Base64-encoded image data (PNG, JPG, WebP, GIF)
/// - `strategy`: `"whole_image_cut"` (default) or `"seeded_watershed"`
/// - `bandwidth`: Optional fixed mean-shift bandwidth; estimated when unset
/// - `describe`: Whether to request VLM descriptions (default true)
///
/// # Example
/// ```json
/// {
///   "image": "iVBORw0KGgo...",
///   "strategy": "seeded_watershed",
///   "bandwidth": 40.0
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyRequest {
    /// Base64-encoded image
    pub image: String,

    /// Segmentation strategy name
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Fixed clustering bandwidth
    #[serde(default)]
    pub bandwidth: Option<f32>,

    /// Whether to run the description stages
    #[serde(default = "default_describe")]
    pub describe: bool,
}

fn default_strategy() -> String {
    "whole_image_cut".to_string()
}

fn default_describe() -> bool {
    true
}

impl SurveyRequest {
    /// Validates the survey request
    ///
    /// # Validation Rules
    /// 1. **image**: must not be empty
    /// 2. **strategy**: must name a known strategy
    /// 3. **bandwidth**: must be finite and positive when present
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.image.trim().is_empty() {
            return Err(ApiError::ValidationError {
                field: "image".to_string(),
                message: "image must not be empty".to_string(),
            });
        }

        self.parsed_strategy()?;

        if let Some(bandwidth) = self.bandwidth {
            if !bandwidth.is_finite() || bandwidth <= 0.0 {
                return Err(ApiError::ValidationError {
                    field: "bandwidth".to_string(),
                    message: "bandwidth must be a positive number".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The strategy named by the request
    pub fn parsed_strategy(&self) -> Result<SegmentationStrategy, ApiError> {
        match self.strategy.as_str() {
            "whole_image_cut" => Ok(SegmentationStrategy::WholeImageCut),
            "seeded_watershed" => Ok(SegmentationStrategy::SeededWatershed),
            other => Err(ApiError::ValidationError {
                field: "strategy".to_string(),
                message: format!(
                    "unknown strategy '{other}' (expected whole_image_cut or seeded_watershed)"
                ),
            }),
        }
    }
}
