// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end pipeline tests over synthetic imagery

use async_trait::async_trait;
use fabstir_canopy_node::pipeline::fetch::{FetchError, ImageSource};
use fabstir_canopy_node::pipeline::{run_annotations, run_survey, AnnotationRequest};
use fabstir_canopy_node::vision::SegmentationStrategy;
use fabstir_canopy_node::{DigestEmbedder, PipelineParams, ReportBuilder};
use image::{Rgb, RgbImage};
use std::collections::HashMap;

/// 100x100 uniform dark background with two disjoint colored blobs
fn two_blob_image() -> RgbImage {
    let mut img = RgbImage::from_pixel(100, 100, Rgb([15, 18, 12]));
    for y in 20..40 {
        for x in 20..40 {
            img.put_pixel(x, y, Rgb([210, 40, 40]));
        }
    }
    for y in 60..85 {
        for x in 55..80 {
            img.put_pixel(x, y, Rgb([40, 200, 60]));
        }
    }
    img
}

fn in_blob(x: u32, y: u32) -> bool {
    let red = (20..40).contains(&x) && (20..40).contains(&y);
    let green = (55..80).contains(&x) && (60..85).contains(&y);
    red || green
}

#[tokio::test]
async fn test_survey_two_blobs_end_to_end() {
    let img = two_blob_image();
    let params = PipelineParams::default();

    // Bandwidth below the inter-blob color distance and above intra-blob
    // noise (the blobs are uniform): exactly two color clusters
    let output = run_survey(
        &img,
        SegmentationStrategy::WholeImageCut,
        Some(60.0),
        &params,
        None,
    )
    .await;

    let seg = output.summary.segmentation.as_ref().unwrap();
    assert!(
        seg.segmented_pixels >= 990 && seg.segmented_pixels <= 1025,
        "foreground covers the blobs: {}",
        seg.segmented_pixels
    );

    // No foreground outside the blobs
    for y in 0..100 {
        for x in 0..100 {
            if !in_blob(x, y) {
                assert_eq!(
                    output.segmented_image.get_pixel(x, y).0,
                    [0, 0, 0],
                    "background leaked into foreground at ({x},{y})"
                );
            }
        }
    }
    // Blob cores are foreground
    assert_ne!(output.segmented_image.get_pixel(30, 30).0, [0, 0, 0]);
    assert_ne!(output.segmented_image.get_pixel(67, 72).0, [0, 0, 0]);

    let clustering = output.summary.clustering.as_ref().unwrap();
    assert_eq!(clustering.n_clusters, 2);
    assert_eq!(output.cluster_images.len(), 2);

    // Clustered raster paints centroid colors; uniform blobs keep their color
    let clustered = output.clustered_image.as_ref().unwrap();
    assert_eq!(clustered.get_pixel(30, 30).0, [210, 40, 40]);
    assert_eq!(clustered.get_pixel(67, 72).0, [40, 200, 60]);
    assert_eq!(clustered.get_pixel(5, 5).0, [0, 0, 0]);
}

#[tokio::test]
async fn test_survey_deterministic_across_runs() {
    let img = two_blob_image();
    let params = PipelineParams::default();

    let a = run_survey(&img, SegmentationStrategy::WholeImageCut, Some(60.0), &params, None).await;
    let b = run_survey(&img, SegmentationStrategy::WholeImageCut, Some(60.0), &params, None).await;

    assert_eq!(
        a.summary.segmentation.as_ref().unwrap().segmented_pixels,
        b.summary.segmentation.as_ref().unwrap().segmented_pixels
    );
    assert_eq!(
        a.summary.clustering.as_ref().unwrap().n_clusters,
        b.summary.clustering.as_ref().unwrap().n_clusters
    );
    assert_eq!(a.segmented_image, b.segmented_image);
}

#[tokio::test]
async fn test_survey_estimated_bandwidth_cluster_range() {
    let img = two_blob_image();
    let params = PipelineParams::default();

    let output = run_survey(
        &img,
        SegmentationStrategy::WholeImageCut,
        None,
        &params,
        None,
    )
    .await;

    // Two perfectly uniform color populations degenerate the quantile
    // estimate; the clustering still comes back well-formed
    let clustering = output.summary.clustering.as_ref().unwrap();
    assert!(clustering.n_clusters >= 1 && clustering.n_clusters <= 3);
}

#[tokio::test]
async fn test_survey_all_background_zero_clusters() {
    let img = RgbImage::from_pixel(64, 64, Rgb([90, 90, 90]));
    let params = PipelineParams::default();

    let output = run_survey(
        &img,
        SegmentationStrategy::SeededWatershed,
        None,
        &params,
        None,
    )
    .await;

    assert_eq!(output.summary.segmentation.as_ref().unwrap().segmented_pixels, 0);
    assert_eq!(output.summary.clustering.as_ref().unwrap().n_clusters, 0);
    assert!(output.clustered_image.is_none());
}

// --- Annotation pipeline fixtures ---

struct MapSource {
    images: HashMap<String, RgbImage>,
}

#[async_trait]
impl ImageSource for MapSource {
    async fn fetch_image(&self, url: &str) -> Result<RgbImage, FetchError> {
        self.images.get(url).cloned().ok_or(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

fn red_mask(size: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> RgbImage {
    let mut mask = RgbImage::new(size, size);
    for y in y0..=y1 {
        for x in x0..=x1 {
            mask.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    mask
}

#[tokio::test]
async fn test_annotation_run_end_to_end() {
    let mut original = RgbImage::from_pixel(32, 32, Rgb([20, 110, 35]));
    for y in 16..28 {
        for x in 16..28 {
            original.put_pixel(x, y, Rgb([200, 180, 40]));
        }
    }

    let mut images = HashMap::new();
    images.insert("mem://orig".to_string(), original);
    // Three annotations over the same region plus one over another region:
    // digest embeddings make the identical crops coincide exactly
    images.insert("mem://a0".to_string(), red_mask(32, 2, 2, 9, 9));
    images.insert("mem://a1".to_string(), red_mask(32, 2, 2, 9, 9));
    images.insert("mem://a2".to_string(), red_mask(32, 2, 2, 9, 9));
    images.insert("mem://a3".to_string(), red_mask(32, 17, 17, 26, 26));
    let source = MapSource { images };

    let request = AnnotationRequest {
        original_url: "mem://orig".to_string(),
        annotation_urls: vec![
            "mem://a0".to_string(),
            "mem://a1".to_string(),
            "mem://a2".to_string(),
            "mem://a3".to_string(),
        ],
    };

    let embedder = DigestEmbedder::new(256, true).unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let builder = ReportBuilder::new(tmp.path());
    let params = PipelineParams {
        linkage_threshold: 0.5,
        ..PipelineParams::default()
    };

    let output = run_annotations(&request, &source, &embedder, None, &builder, &params)
        .await
        .unwrap();

    assert_eq!(output.summary.cluster_count, 2);
    assert_eq!(output.clusters[&0].len(), 3);
    assert_eq!(
        output.clusters[&0].iter().map(|c| c.index).collect::<Vec<_>>(),
        vec![0, 1, 2],
        "within-cluster order follows input order"
    );
    assert_eq!(output.clusters[&1][0].index, 3);

    // Report artifacts on disk
    let report_path = output.summary.report_path.unwrap();
    let report_dir = std::path::Path::new(&report_path);
    assert!(report_dir.join("report.json").exists());
    assert!(report_dir.join("cluster_0.png").exists());
    assert!(report_dir.join("cluster_1.png").exists());

    assert_eq!(
        output.summary.pipeline_steps,
        vec![
            "fetch_images",
            "crop_extraction",
            "embedding",
            "agglomerative_clustering",
            "report_generation"
        ]
    );
}

#[tokio::test]
async fn test_annotation_run_all_masks_bad() {
    let original = RgbImage::from_pixel(16, 16, Rgb([50, 50, 50]));
    let mut images = HashMap::new();
    images.insert("mem://orig".to_string(), original);
    // One all-black mask (nothing marked), one with the wrong size
    images.insert("mem://empty".to_string(), RgbImage::new(16, 16));
    images.insert("mem://small".to_string(), red_mask(8, 1, 1, 3, 3));
    let source = MapSource { images };

    let request = AnnotationRequest {
        original_url: "mem://orig".to_string(),
        annotation_urls: vec!["mem://empty".to_string(), "mem://small".to_string()],
    };

    let embedder = DigestEmbedder::new(64, true).unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let builder = ReportBuilder::new(tmp.path());

    let output = run_annotations(
        &request,
        &source,
        &embedder,
        None,
        &builder,
        &PipelineParams::default(),
    )
    .await
    .unwrap();

    assert_eq!(output.summary.item_errors.len(), 2);
    assert_eq!(output.summary.cluster_count, 0);
    assert!(output.clusters.is_empty());
    assert!(output.summary.report_path.is_none());
}
