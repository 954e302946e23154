// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Shared fixtures for retrieval tests

use async_trait::async_trait;
use scenerag::collection::{SceneCollection, SharedCollection};
use scenerag::config::SceneLayout;
use scenerag::embeddings::{Embedder, HashEmbedder};
use scenerag::errors::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

pub const DIM: usize = 8;

/// Returns a fixed vector for known texts and a hashed one otherwise
pub struct FixedEmbedder {
    table: HashMap<String, Vec<f32>>,
    fallback: HashEmbedder,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            fallback: HashEmbedder::new(DIM).unwrap().with_model_id("fixed"),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), DIM);
        self.table.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_id(&self) -> &str {
        "fixed"
    }

    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self.table.get(text) {
            Some(vector) => Ok(vector.clone()),
            None => self.fallback.embed(text).await,
        }
    }
}

pub fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

pub fn open_scene(dir: &TempDir, scene: &str) -> SharedCollection {
    let layout = SceneLayout::new(dir.path(), scene, &format!("{}_docs", scene)).unwrap();
    SceneCollection::open(layout, DIM, None).unwrap().into_shared()
}

pub fn shared(embedder: FixedEmbedder) -> Arc<dyn Embedder> {
    Arc::new(embedder)
}
