// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Response type for POST /v1/annotations

use crate::pipeline::summary::AnnotationSummary;
use serde::{Deserialize, Serialize};

/// Response body for POST /v1/annotations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationResponse {
    /// "success" when the run completed (individual stages may still have
    /// recorded errors inside the summary)
    pub status: String,
    pub summary: AnnotationSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_summary() {
        let response = AnnotationResponse {
            status: "success".to_string(),
            summary: AnnotationSummary {
                run_id: "r".to_string(),
                pipeline_steps: vec!["fetch_images".to_string()],
                object_count: 1,
                item_errors: vec![],
                cluster_count: 0,
                clusters: vec![],
                report_path: None,
                narrative: None,
                stage_errors: vec![],
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["summary"]["object_count"], 1);
    }
}
