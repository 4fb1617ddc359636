// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Ingress payload types for POST /v1/annotations
//!
//! The upstream annotator posts a wrapper document whose `content[0].text`
//! field carries a serialized annotation document. Both layers are parsed
//! with strict typed deserialization; any structural deviation is rejected
//! as a malformed payload and never evaluated as anything else.

use crate::api::ApiError;
use crate::pipeline::annotations::AnnotationRequest;
use serde::{Deserialize, Serialize};

/// Outer wrapper as delivered by the annotation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressPayload {
    pub content: Vec<ContentItem>,
}

/// One content entry; only the text is meaningful here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub text: String,
}

/// Inner annotation document, serialized into `content[0].text`
#[derive(Debug, Clone, Deserialize)]
struct AnnotationDocument {
    image: ImageRef,
    annotations: Vec<AnnotationEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ImageRef {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct AnnotationEntry {
    image: ImageRef,
}

/// Parse and validate the ingress payload into a typed pipeline request
pub fn parse_annotation_request(payload: &IngressPayload) -> Result<AnnotationRequest, ApiError> {
    let first = payload.content.first().ok_or_else(|| {
        ApiError::MalformedPayload("content must contain at least one item".to_string())
    })?;

    let document: AnnotationDocument = serde_json::from_str(&first.text).map_err(|e| {
        ApiError::MalformedPayload(format!(
            "content[0].text is not a valid annotation document: {e}"
        ))
    })?;

    if document.image.url.trim().is_empty() {
        return Err(ApiError::MalformedPayload(
            "image.url must not be empty".to_string(),
        ));
    }
    for (i, annotation) in document.annotations.iter().enumerate() {
        if annotation.image.url.trim().is_empty() {
            return Err(ApiError::MalformedPayload(format!(
                "annotations[{i}].image.url must not be empty"
            )));
        }
    }

    Ok(AnnotationRequest {
        original_url: document.image.url,
        annotation_urls: document
            .annotations
            .into_iter()
            .map(|a| a.image.url)
            .collect(),
    })
}
