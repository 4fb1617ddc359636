// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! SurveyResponse type for POST /v1/survey

use crate::pipeline::summary::SurveySummary;
use serde::{Deserialize, Serialize};

/// Response body for POST /v1/survey
///
/// The rasters themselves are persisted under the node's output directory;
/// the response carries their paths alongside the run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    /// Ordered stage summary of the run
    pub summary: SurveySummary,

    /// Path of the persisted segmented raster
    pub segmented_path: String,

    /// Path of the persisted clustered raster, absent with no foreground
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustered_path: Option<String>,

    /// Path of the persisted results document
    pub results_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clustered_path_skipped_when_none() {
        let response = SurveyResponse {
            summary: SurveySummary {
                run_id: "r".to_string(),
                pipeline_steps: vec![],
                initial_analysis: None,
                segmentation: None,
                clustering: None,
                cluster_analysis: vec![],
            },
            segmented_path: "/out/segmented_result.png".to_string(),
            clustered_path: None,
            results_path: "/out/results.json".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("clusteredPath").is_none());
        assert_eq!(json["segmentedPath"], "/out/segmented_result.png");
    }
}
