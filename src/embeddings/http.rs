// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding client for OpenAI-compatible `/v1/embeddings` servers

use super::Embedder;
use crate::errors::{RagError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

// --- OpenAI-compatible serde structs ---

#[derive(serde::Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(serde::Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Client for a remote embedding service
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model_name: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(endpoint: &str, model_name: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Config(
                "Embedding dimension must be greater than 0".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::Config(format!("HTTP client: {}", e)))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Embedding client configured: endpoint={}, model={}, dimension={}",
            endpoint, model_name, dimension
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
            dimension,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model_name,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("HTTP {}: {}", status, body)));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("invalid response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        let mut embeddings = Vec::with_capacity(parsed.data.len());
        for data in parsed.data {
            if data.embedding.len() != self.dimension {
                return Err(RagError::dimension(self.dimension, data.embedding.len()));
            }
            embeddings.push(data.embedding);
        }
        debug!("Embedded {} texts via {}", embeddings.len(), self.endpoint);
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.request(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| RagError::Embedding("empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}
