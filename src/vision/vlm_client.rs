// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! VLM sidecar client for vegetation descriptions via OpenAI-compatible API

use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

// --- OpenAI-compatible serde structs ---

#[derive(serde::Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(serde::Serialize)]
struct ChatMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

// --- Result types ---

/// Structured fields expected (but not guaranteed) in a cluster description
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct VegetationDescription {
    pub tree_type: Option<String>,
    pub characteristics: Option<String>,
    pub confidence: Option<String>,
    pub notes: Option<String>,
}

/// Result from a VLM description call
#[derive(Debug, Clone)]
pub struct DescribeResult {
    /// Raw response text
    pub text: String,
    /// Structured fields, when the response parsed as JSON
    pub parsed: Option<VegetationDescription>,
    pub model: String,
    pub processing_time_ms: u64,
}

/// Client for calling a VLM sidecar service via OpenAI-compatible API
pub struct VlmClient {
    client: Client,
    endpoint: String,
    model_name: String,
}

/// Prompt for a single vegetation cluster image
pub const CLUSTER_PROMPT: &str = "Analyze this vegetation cluster and determine:\n\
1. What type of tree/plant it is likely to be\n\
2. Visible distinguishing characteristics (leaf shape, color, texture)\n\
3. Confidence level of the identification (low/medium/high)\n\
4. Additional notes\n\n\
Respond in JSON format with the fields: tree_type, characteristics, confidence, notes";

/// Prompt for the initial whole-image overview
pub const OVERVIEW_PROMPT: &str = "Analyze this image and provide a general overview:\n\
- How many trees or vegetation groups are visible?\n\
- What are the general characteristics of the environment?\n\
- Are there different types of vegetation?";

impl VlmClient {
    /// Create a new VLM client
    pub fn new(endpoint: &str, model_name: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "VLM client configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
        })
    }

    /// Get the model name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Check if the VLM sidecar is healthy
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("VLM health check failed: {}", e);
                false
            }
        }
    }

    /// Describe a single image (as a PNG data URL)
    pub async fn describe(&self, data_url: &str, prompt: &str) -> Result<DescribeResult> {
        self.describe_many(std::slice::from_ref(&data_url.to_string()), prompt, 1024)
            .await
    }

    /// Describe a set of images with one prompt
    ///
    /// Used for the report narrative, which sends sample crops from every
    /// cluster in a single request.
    pub async fn describe_many(
        &self,
        data_urls: &[String],
        prompt: &str,
        max_tokens: u32,
    ) -> Result<DescribeResult> {
        let start = std::time::Instant::now();

        let mut content = vec![serde_json::json!({"type": "text", "text": prompt})];
        for url in data_urls {
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": {"url": url}
            }));
        }

        let request = ChatRequest {
            model: self.model_name.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: serde_json::Value::Array(content),
            }],
            max_tokens,
            temperature: 0.3,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&request)
            .send()
            .await?;

        let chat_response: ChatResponse = response.json().await?;
        let text = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(DescribeResult {
            parsed: parse_description(&text),
            text,
            model: self.model_name.clone(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Best-effort parse of a description reply
///
/// Replies are expected to be JSON but frequently arrive fenced or as free
/// prose; anything that does not parse is simply carried as raw text.
pub fn parse_description(text: &str) -> Option<VegetationDescription> {
    let trimmed = text.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(stripped).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlm_client_new() {
        let client = VlmClient::new("http://localhost:8081", "qwen3-vl", 120).unwrap();
        assert_eq!(client.endpoint, "http://localhost:8081");
        assert_eq!(client.model_name, "qwen3-vl");
    }

    #[test]
    fn test_vlm_client_trailing_slash_trimmed() {
        let client = VlmClient::new("http://localhost:8081/", "test", 120).unwrap();
        assert_eq!(client.endpoint, "http://localhost:8081");
    }

    #[tokio::test]
    async fn test_vlm_client_health_check_unreachable() {
        let client = VlmClient::new("http://127.0.0.1:59999", "test-model", 5).unwrap();
        let healthy = client.health_check().await;
        assert!(!healthy);
    }

    #[test]
    fn test_cluster_prompt_requests_json_fields() {
        assert!(CLUSTER_PROMPT.contains("tree_type"));
        assert!(CLUSTER_PROMPT.contains("characteristics"));
        assert!(CLUSTER_PROMPT.contains("confidence"));
        assert!(CLUSTER_PROMPT.contains("notes"));
    }

    #[test]
    fn test_request_format() {
        let request = ChatRequest {
            model: "qwen3-vl".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: serde_json::json!([
                    {"type": "text", "text": CLUSTER_PROMPT},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,abc123"}}
                ]),
            }],
            max_tokens: 1024,
            temperature: 0.3,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "qwen3-vl");
        let content = &json["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
    }

    #[test]
    fn test_response_parsing() {
        let json = serde_json::json!({
            "choices": [{
                "message": { "content": "A stand of oaks." }
            }]
        });
        let response: ChatResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.choices[0].message.content, "A stand of oaks.");
    }

    #[test]
    fn test_parse_description_plain_json() {
        let text = r#"{"tree_type": "olive", "characteristics": "silver leaves", "confidence": "high", "notes": null}"#;
        let parsed = parse_description(text).unwrap();
        assert_eq!(parsed.tree_type.as_deref(), Some("olive"));
        assert_eq!(parsed.confidence.as_deref(), Some("high"));
        assert!(parsed.notes.is_none());
    }

    #[test]
    fn test_parse_description_fenced_json() {
        let text = "```json\n{\"tree_type\": \"pine\", \"characteristics\": null, \"confidence\": \"low\", \"notes\": \"sparse\"}\n```";
        let parsed = parse_description(text).unwrap();
        assert_eq!(parsed.tree_type.as_deref(), Some("pine"));
    }

    #[test]
    fn test_parse_description_prose_is_tolerated() {
        assert!(parse_description("It looks like a cypress hedge.").is_none());
        assert!(parse_description("").is_none());
    }
}
