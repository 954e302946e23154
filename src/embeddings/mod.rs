// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding and image-description collaborators
//!
//! The retrieval core treats the embedding model as an opaque
//! `text -> [f32; dimension]` function. A collection is tied to exactly one
//! model id and dimension; see `SceneCollection::bind_embedder`.

pub mod hash;
pub mod http;
pub mod retry;

pub use hash::HashEmbedder;
pub use http::HttpEmbedder;
pub use retry::RetryingEmbedder;

use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Text embedding model
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier persisted with the collection (model name)
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }
}

/// Vision model that turns an extracted image into searchable text
///
/// `context` is the document text surrounding the image, used to enhance
/// the description.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image: &[u8], context: &str) -> Result<String>;
}
