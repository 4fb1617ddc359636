// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Run summaries for both pipelines
//!
//! A summary lists exactly the stages that completed, in order, plus
//! per-stage payloads. External-call failures are carried as structured
//! per-item outcomes so one bad cluster or crop never aborts the batch.

use crate::vision::vlm_client::VegetationDescription;
use serde::{Deserialize, Serialize};

/// Status of one external call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Outcome of one description call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionOutcome {
    pub status: OutcomeStatus,
    /// Cluster the call was made for, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,
    /// Raw response text on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Structured fields, when the response parsed as JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<VegetationDescription>,
    /// Error payload on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DescriptionOutcome {
    pub fn success(
        cluster_id: Option<usize>,
        response: String,
        parsed: Option<VegetationDescription>,
    ) -> Self {
        Self {
            status: OutcomeStatus::Success,
            cluster_id,
            response: Some(response),
            parsed,
            error: None,
        }
    }

    pub fn failure(cluster_id: Option<usize>, error: String) -> Self {
        Self {
            status: OutcomeStatus::Error,
            cluster_id,
            response: None,
            parsed: None,
            error: Some(error),
        }
    }
}

/// Segmentation stage summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationSummary {
    /// Strategy that produced the mask
    pub method: String,
    /// Number of foreground pixels
    pub segmented_pixels: usize,
}

/// Color clustering stage summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSummary {
    pub method: String,
    pub n_clusters: usize,
    /// Bandwidth actually used (estimated when the request left it unset)
    pub bandwidth: f32,
}

/// Full summary of a whole-image survey run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveySummary {
    pub run_id: String,
    /// Names of the pipeline stages that completed, in order
    pub pipeline_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_analysis: Option<DescriptionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering: Option<ClusteringSummary>,
    pub cluster_analysis: Vec<DescriptionOutcome>,
}

/// Per-annotation failure in the crop-clustering pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemError {
    /// Index of the annotation in the ingress payload
    pub index: usize,
    pub error: String,
}

/// Membership of one crop cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMembers {
    pub cluster_id: usize,
    /// Original annotation indexes, in first-seen order
    pub members: Vec<usize>,
}

/// Full summary of an annotation-driven crop clustering run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationSummary {
    pub run_id: String,
    pub pipeline_steps: Vec<String>,
    /// Number of annotations in the payload
    pub object_count: usize,
    /// Crops that could not be produced or fetched, with their errors
    pub item_errors: Vec<ItemError>,
    pub cluster_count: usize,
    pub clusters: Vec<ClusterMembers>,
    /// Where the report was written, when that stage completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    /// Narrative outcome from the report stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<DescriptionOutcome>,
    /// Stage-level failure payloads, by stage name
    pub stage_errors: Vec<StageError>,
}

/// A failed stage, reported by name with its error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub stage: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization_skips_empty_fields() {
        let outcome = DescriptionOutcome::failure(Some(3), "timeout".to_string());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["cluster_id"], 3);
        assert_eq!(json["error"], "timeout");
        assert!(json.get("response").is_none());
        assert!(json.get("parsed").is_none());
    }

    #[test]
    fn test_success_outcome_round_trip() {
        let outcome = DescriptionOutcome::success(None, "an oak".to_string(), None);
        let json = serde_json::to_string(&outcome).unwrap();
        let back: DescriptionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, OutcomeStatus::Success);
        assert_eq!(back.response.as_deref(), Some("an oak"));
    }

    #[test]
    fn test_survey_summary_lists_steps_in_order() {
        let summary = SurveySummary {
            run_id: "r1".to_string(),
            pipeline_steps: vec!["segmentation".to_string(), "mean_shift_clustering".to_string()],
            initial_analysis: None,
            segmentation: Some(SegmentationSummary {
                method: "whole_image_cut".to_string(),
                segmented_pixels: 42,
            }),
            clustering: None,
            cluster_analysis: vec![],
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["pipeline_steps"][0], "segmentation");
        assert_eq!(json["segmentation"]["segmented_pixels"], 42);
    }
}
