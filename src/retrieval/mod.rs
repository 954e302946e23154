// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Query-time retrieval over one scene collection
//!
//! The query is embedded outside the collection lock; search and
//! resolution happen under a single read lock so results come from one
//! consistent snapshot.

use crate::collection::SharedCollection;
use crate::embeddings::Embedder;
use crate::errors::{RagError, Result};
use crate::store::EntryKind;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    Image,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Text => write!(f, "text"),
            ItemKind::Image => write!(f, "image"),
        }
    }
}

/// One ranked result
///
/// For images `content` is the description and `source_path` is set only
/// when the artifact exists on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedItem {
    pub id: String,
    pub kind: ItemKind,
    pub content: String,
    pub source_path: Option<PathBuf>,
    /// Squared L2 distance; lower is closer
    pub score: f32,
}

impl RetrievedItem {
    /// `(kind, content, source_path, score)` as consumed by prompt building
    pub fn as_tuple(&self) -> (ItemKind, &str, Option<&PathBuf>, f32) {
        (self.kind, &self.content, self.source_path.as_ref(), self.score)
    }
}

pub struct RetrievalService {
    collection: SharedCollection,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalService {
    pub fn new(collection: SharedCollection, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collection,
            embedder,
        }
    }

    /// Up to `top_k` entries closest to `query`, ascending distance
    ///
    /// An empty list means no matches. Image entries whose artifact is
    /// missing are still returned, with `source_path: None`.
    ///
    /// # Errors
    /// - `DimensionMismatch` if the embedder's vectors do not fit the collection
    /// - `Config` if the collection was built with another embedding model
    /// - whatever the embedder returns when it fails
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedItem>> {
        {
            let collection = self.collection.read().await;
            if top_k == 0 || collection.is_empty() {
                debug!("Nothing to search in scene '{}'", collection.scene());
                return Ok(Vec::new());
            }
            self.check_embedder(collection.dimension(), collection.embedding_model())?;
        }

        let query_vector = self.embedder.embed(query).await?;

        let collection = self.collection.read().await;
        let hits = collection.search(&query_vector, top_k)?;

        let mut items = Vec::with_capacity(hits.len());
        for (neighbor, entry) in hits {
            let item = match &entry.kind {
                EntryKind::Text { .. } => RetrievedItem {
                    id: entry.id.clone(),
                    kind: ItemKind::Text,
                    content: entry.content.clone(),
                    source_path: None,
                    score: neighbor.distance,
                },
                EntryKind::Image { description, .. } => {
                    let mapped = collection.image_mapping().get(&entry.id);
                    let content = mapped
                        .map(|record| record.enhanced_description.as_str())
                        .filter(|d| !d.is_empty())
                        .unwrap_or(description.as_str())
                        .to_string();
                    let source_path = match collection.artifact_path(entry) {
                        Some(path) if path.exists() => Some(path),
                        Some(path) => {
                            warn!("Image artifact for {} missing at {}", entry.id, path.display());
                            None
                        }
                        None => {
                            warn!("Image {} has no recorded artifact", entry.id);
                            None
                        }
                    };
                    RetrievedItem {
                        id: entry.id.clone(),
                        kind: ItemKind::Image,
                        content,
                        source_path,
                        score: neighbor.distance,
                    }
                }
            };
            items.push(item);
        }

        info!(
            "Retrieved {} items for query in scene '{}'",
            items.len(),
            collection.scene()
        );
        Ok(items)
    }

    fn check_embedder(&self, dimension: usize, model: Option<&str>) -> Result<()> {
        if self.embedder.dimension() != dimension {
            return Err(RagError::dimension(dimension, self.embedder.dimension()));
        }
        match model {
            Some(model) if model != self.embedder.model_id() => Err(RagError::Config(format!(
                "collection was built with embedding model '{}', query uses '{}'",
                model,
                self.embedder.model_id()
            ))),
            _ => Ok(()),
        }
    }
}
