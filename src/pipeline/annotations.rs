// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Annotation-driven crop clustering pipeline
//!
//! Fetches the original image and every annotation mask by URL, extracts a
//! transparent-background crop per mask, embeds the crops and groups them
//! by agglomerative clustering, then hands the clusters to the report
//! collaborator. Each run carries its own context; nothing is shared
//! between requests except the immutable capabilities.
//!
//! Failure policy: an unusable original image is fatal to the run; a
//! failing mask fetch or crop extraction is isolated to that annotation;
//! failing external capabilities (embedder, describer, report sink) are
//! recorded as stage errors and the summary still lists whatever completed.

use crate::clustering::agglomerate;
use crate::config::PipelineParams;
use crate::embeddings::CropEmbedder;
use crate::pipeline::fetch::{FetchError, ImageSource};
use crate::pipeline::summary::{AnnotationSummary, ClusterMembers, ItemError, StageError};
use crate::report::ReportBuilder;
use crate::vision::crop::{extract_crop, Crop};
use crate::vision::vlm_client::VlmClient;
use chrono::Local;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Typed, validated ingress request for one run
#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    /// URL of the original survey image
    pub original_url: String,
    /// One mask image URL per annotated object
    pub annotation_urls: Vec<String>,
}

/// Fatal pipeline errors; everything else degrades into the summary
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("original image unusable: {0}")]
    Original(#[from] FetchError),
}

/// Output of one run: the summary plus the clustered crops
#[derive(Debug)]
pub struct AnnotationOutput {
    pub summary: AnnotationSummary,
    /// Cluster id to crops, first-seen order within each cluster
    pub clusters: BTreeMap<usize, Vec<Crop>>,
}

/// Run the crop-clustering pipeline
pub async fn run_annotations(
    request: &AnnotationRequest,
    source: &dyn ImageSource,
    embedder: &dyn CropEmbedder,
    describer: Option<&VlmClient>,
    report_builder: &ReportBuilder,
    params: &PipelineParams,
) -> Result<AnnotationOutput, PipelineError> {
    let run_id = Uuid::new_v4().to_string();
    let mut steps: Vec<String> = Vec::new();
    let mut item_errors: Vec<ItemError> = Vec::new();
    info!(
        run_id,
        annotations = request.annotation_urls.len(),
        "annotation run started"
    );

    // The original is load-bearing for every crop: failure is fatal
    let original = source.fetch_image(&request.original_url).await?;

    // Fetch masks and extract crops, isolating per-annotation failures
    let mut crops: Vec<Crop> = Vec::new();
    for (index, url) in request.annotation_urls.iter().enumerate() {
        let mask = match source.fetch_image(url).await {
            Ok(mask) => mask,
            Err(e) => {
                warn!(index, url, error = %e, "annotation fetch failed");
                item_errors.push(ItemError {
                    index,
                    error: e.to_string(),
                });
                continue;
            }
        };
        match extract_crop(&original, &mask) {
            Ok(image) => crops.push(Crop { image, index }),
            Err(e) => {
                warn!(index, error = %e, "crop extraction failed");
                item_errors.push(ItemError {
                    index,
                    error: e.to_string(),
                });
            }
        }
    }
    steps.push("fetch_images".to_string());
    steps.push("crop_extraction".to_string());

    let mut summary = AnnotationSummary {
        run_id: run_id.clone(),
        pipeline_steps: steps,
        object_count: request.annotation_urls.len(),
        item_errors,
        cluster_count: 0,
        clusters: Vec::new(),
        report_path: None,
        narrative: None,
        stage_errors: Vec::new(),
    };

    // No crops at all is a valid zero-result state
    if crops.is_empty() {
        info!(run_id, "no crops extracted; returning the empty clustering");
        return Ok(AnnotationOutput {
            summary,
            clusters: BTreeMap::new(),
        });
    }

    // Embed all crops through the external capability in one batch
    let images: Vec<_> = crops.iter().map(|c| c.image.clone()).collect();
    let embeddings = match embedder.embed_batch(&images).await {
        Ok(e) => e,
        Err(e) => {
            warn!(run_id, error = %e, "embedding stage failed");
            summary.stage_errors.push(StageError {
                stage: "embedding".to_string(),
                error: e.to_string(),
            });
            return Ok(AnnotationOutput {
                summary,
                clusters: BTreeMap::new(),
            });
        }
    };
    summary.pipeline_steps.push("embedding".to_string());

    // Threshold-bounded agglomerative clustering
    let labels = agglomerate(&embeddings, params.linkage_threshold);
    let clusters = group_crops(crops, &labels);
    summary.cluster_count = clusters.len();
    summary.clusters = clusters
        .iter()
        .map(|(&cluster_id, members)| ClusterMembers {
            cluster_id,
            members: members.iter().map(|c| c.index).collect(),
        })
        .collect();
    summary
        .pipeline_steps
        .push("agglomerative_clustering".to_string());

    // Report assembly; failure here is a stage error, not a run failure
    match report_builder
        .build(&clusters, &request.original_url, describer, Local::now())
        .await
    {
        Ok(report) => {
            summary.report_path = Some(report.path.display().to_string());
            summary.narrative = report.narrative;
            summary.pipeline_steps.push("report_generation".to_string());
        }
        Err(e) => {
            warn!(run_id, error = %e, "report stage failed");
            summary.stage_errors.push(StageError {
                stage: "report_generation".to_string(),
                error: e.to_string(),
            });
        }
    }

    info!(
        run_id,
        clusters = summary.cluster_count,
        errors = summary.item_errors.len(),
        "annotation run complete"
    );

    Ok(AnnotationOutput {
        summary,
        clusters,
    })
}

/// Group crops by label, preserving input order within each cluster
fn group_crops(crops: Vec<Crop>, labels: &[usize]) -> BTreeMap<usize, Vec<Crop>> {
    let mut clusters: BTreeMap<usize, Vec<Crop>> = BTreeMap::new();
    for (crop, &label) in crops.into_iter().zip(labels) {
        clusters.entry(label).or_default().push(crop);
    }
    clusters
}
