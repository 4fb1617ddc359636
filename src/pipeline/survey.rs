// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Whole-image survey pipeline
//!
//! Segmentation, color clustering and per-cluster description over a single
//! decoded image. The pipeline itself writes no files: rasters come back in
//! the output and the caller decides persistence. Description calls are
//! optional (the node may run without a VLM sidecar) and their failures are
//! captured per cluster, never propagated.

use crate::clustering::{
    cluster_colors, materialize_cluster_images, paint_clustered_image, paint_segmented_image,
};
use crate::config::PipelineParams;
use crate::pipeline::summary::{
    ClusteringSummary, DescriptionOutcome, SegmentationSummary, SurveySummary,
};
use crate::vision::image_utils::rgb_to_data_url;
use crate::vision::segmentation::{segment, SegmentationStrategy};
use crate::vision::vlm_client::{VlmClient, CLUSTER_PROMPT, OVERVIEW_PROMPT};
use image::RgbImage;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything a survey run produces
#[derive(Debug)]
pub struct SurveyOutput {
    pub summary: SurveySummary,
    /// Original pixels where the mask is foreground, black elsewhere
    pub segmented_image: RgbImage,
    /// Foreground painted with centroid colors; absent when no foreground
    pub clustered_image: Option<RgbImage>,
    /// One masked image per cluster, ascending cluster id
    pub cluster_images: Vec<RgbImage>,
}

/// Run the survey pipeline over a decoded image
pub async fn run_survey(
    image: &RgbImage,
    strategy: SegmentationStrategy,
    bandwidth: Option<f32>,
    params: &PipelineParams,
    describer: Option<&VlmClient>,
) -> SurveyOutput {
    let run_id = Uuid::new_v4().to_string();
    let mut steps: Vec<String> = Vec::new();
    info!(run_id, ?strategy, "survey run started");

    // Optional whole-image overview before any pixel work
    let initial_analysis = match describer {
        Some(client) => {
            let outcome = describe_image(client, image, OVERVIEW_PROMPT, None).await;
            steps.push("initial_vlm_analysis".to_string());
            Some(outcome)
        }
        None => None,
    };

    // Stage: segmentation
    let mask = segment(image, strategy, params);
    let segmented_pixels = mask.foreground_count();
    let segmentation = SegmentationSummary {
        method: match strategy {
            SegmentationStrategy::WholeImageCut => "whole_image_cut".to_string(),
            SegmentationStrategy::SeededWatershed => "seeded_watershed".to_string(),
        },
        segmented_pixels,
    };
    steps.push("segmentation".to_string());
    let segmented_image = paint_segmented_image(image, &mask);

    // Stage: mean-shift color clustering; an all-background mask yields the
    // empty clustering, which is a valid zero-result state
    let clustering = cluster_colors(image, &mask, bandwidth, params);
    let clustering_summary = ClusteringSummary {
        method: "mean_shift".to_string(),
        n_clusters: clustering.cluster_count(),
        bandwidth: clustering.bandwidth,
    };
    steps.push("mean_shift_clustering".to_string());

    let clustered_image = if clustering.is_empty() {
        None
    } else {
        Some(paint_clustered_image(image, &mask, &clustering))
    };
    let cluster_images = materialize_cluster_images(image, &mask, &clustering);

    // Stage: one description call per cluster image
    let mut cluster_analysis = Vec::new();
    if let Some(client) = describer {
        for (cluster_id, cluster_image) in cluster_images.iter().enumerate() {
            let outcome =
                describe_image(client, cluster_image, CLUSTER_PROMPT, Some(cluster_id)).await;
            cluster_analysis.push(outcome);
        }
        steps.push("cluster_identification".to_string());
    }

    info!(
        run_id,
        segmented_pixels,
        clusters = clustering_summary.n_clusters,
        "survey run complete"
    );

    SurveyOutput {
        summary: SurveySummary {
            run_id,
            pipeline_steps: steps,
            initial_analysis,
            segmentation: Some(segmentation),
            clustering: Some(clustering_summary),
            cluster_analysis,
        },
        segmented_image,
        clustered_image,
        cluster_images,
    }
}

/// One description call, reduced to a structured outcome
async fn describe_image(
    client: &VlmClient,
    image: &RgbImage,
    prompt: &str,
    cluster_id: Option<usize>,
) -> DescriptionOutcome {
    let data_url = match rgb_to_data_url(image) {
        Ok(url) => url,
        Err(e) => return DescriptionOutcome::failure(cluster_id, e.to_string()),
    };

    match client.describe(&data_url, prompt).await {
        Ok(result) => DescriptionOutcome::success(cluster_id, result.text, result.parsed),
        Err(e) => {
            warn!(?cluster_id, error = %e, "description call failed");
            DescriptionOutcome::failure(cluster_id, e.to_string())
        }
    }
}
