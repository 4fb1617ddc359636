// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fetch-by-URL image source

use crate::vision::image_utils::{self, ImageError};
use async_trait::async_trait;
use image::RgbImage;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors raised while fetching an image by URL
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode image from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: ImageError,
    },
}

/// Capability that resolves an image URL to canonical RGB pixels
///
/// The HTTP implementation is the production path; tests substitute an
/// in-memory source.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<RgbImage, FetchError>;
}

/// HTTP image source with an explicit request timeout
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch_image(&self, url: &str) -> Result<RgbImage, FetchError> {
        url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            source: e,
        })?;
        debug!(url, bytes = bytes.len(), "fetched image");

        let (image, _info) =
            image_utils::decode_image_bytes(&bytes).map_err(|e| FetchError::Decode {
                url: url.to_string(),
                source: e,
            })?;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let source = HttpImageSource::new(5).unwrap();
        let err = source.fetch_image("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let source = HttpImageSource::new(1).unwrap();
        let err = source
            .fetch_image("http://127.0.0.1:59998/mask.png")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
    }
}
