// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Runtime configuration and on-disk layout of scene collections
//!
//! Every path a collection touches is derived from `data_dir` and the
//! scene name, so two scenes never share a file.

use crate::errors::{RagError, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DIMENSION: usize = 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 300;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Chunking parameters, measured in token-equivalents
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Exponential backoff for calls to external models
///
/// `max_retries: None` keeps retrying forever, which unattended batch
/// jobs sometimes want. The default caps at three retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: Option<usize>,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No retries at all; the first failure is returned
    pub fn none() -> Self {
        Self {
            max_retries: Some(0),
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = self.exponential_base.powi(attempt.min(i32::MAX as usize) as i32);
        let delay = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay as u64)
    }

    pub fn allows_retry(&self, retries_done: usize) -> bool {
        match self.max_retries {
            Some(max) => retries_done < max,
            None => true,
        }
    }
}

/// Top-level configuration for one scene
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub scene: String,
    /// Defaults to `<scene>_docs`
    pub collection_name: Option<String>,
    pub dimension: usize,
    pub embedding_model: String,
    pub embedding_endpoint: Option<String>,
    pub chunking: ChunkingConfig,
    pub retry: RetryPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./rag_data"),
            scene: "campus".to_string(),
            collection_name: None,
            dimension: DEFAULT_DIMENSION,
            embedding_model: "Qwen3-Embedding-0.6B".to_string(),
            embedding_endpoint: None,
            chunking: ChunkingConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RagConfig {
    pub fn new(data_dir: impl Into<PathBuf>, scene: impl Into<String>, dimension: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            scene: scene.into(),
            dimension,
            ..Self::default()
        }
    }

    /// Build configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = env::var("RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(scene) = env::var("RAG_SCENE") {
            config.scene = scene;
        }
        if let Ok(name) = env::var("RAG_COLLECTION") {
            config.collection_name = Some(name);
        }
        if let Some(dimension) = parse_env::<usize>("RAG_DIMENSION")? {
            config.dimension = dimension;
        }
        if let Some(size) = parse_env::<usize>("RAG_CHUNK_SIZE")? {
            config.chunking.chunk_size = size;
        }
        if let Some(overlap) = parse_env::<usize>("RAG_CHUNK_OVERLAP")? {
            config.chunking.chunk_overlap = overlap;
        }
        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        config.embedding_endpoint = env::var("EMBEDDING_ENDPOINT").ok();
        match env::var("EMBEDDING_MAX_RETRIES").as_deref() {
            Ok("unlimited") => config.retry.max_retries = None,
            Ok(value) => {
                let retries = value.parse::<usize>().map_err(|e| {
                    RagError::Config(format!("EMBEDDING_MAX_RETRIES={}: {}", value, e))
                })?;
                config.retry.max_retries = Some(retries);
            }
            Err(_) => {}
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(RagError::Config(
                "dimension must be greater than 0".to_string(),
            ));
        }
        validate_scene(&self.scene)?;
        if self.chunking.chunk_size == 0 {
            return Err(RagError::Config(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        Ok(())
    }

    pub fn collection_name(&self) -> String {
        self.collection_name
            .clone()
            .unwrap_or_else(|| format!("{}_docs", self.scene))
    }

    pub fn layout(&self) -> Result<SceneLayout> {
        SceneLayout::new(&self.data_dir, &self.scene, &self.collection_name())
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| RagError::Config(format!("{}={}: {}", key, value, e))),
        Err(_) => Ok(None),
    }
}

fn validate_scene(scene: &str) -> Result<()> {
    if scene.is_empty() {
        return Err(RagError::Config("scene name must not be empty".to_string()));
    }
    if scene.contains(['/', '\\']) || scene == "." || scene == ".." {
        return Err(RagError::Config(format!(
            "scene name '{}' must not contain path separators",
            scene
        )));
    }
    Ok(())
}

/// File locations of one scene collection
///
/// ```text
/// <data_dir>/<scene>/<collection>.index
/// <data_dir>/<scene>/<collection>_metadata.json
/// <data_dir>/<scene>/<scene>_image_mapping.json
/// <data_dir>/<scene>/processed_files_<scene>.json
/// <data_dir>/<scene>/images/
/// <data_dir>/backups/
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SceneLayout {
    pub scene: String,
    pub collection_name: String,
    pub scene_dir: PathBuf,
    pub backup_root: PathBuf,
}

impl SceneLayout {
    pub fn new(data_dir: &Path, scene: &str, collection_name: &str) -> Result<Self> {
        validate_scene(scene)?;
        if collection_name.is_empty() || collection_name.contains(['/', '\\']) {
            return Err(RagError::Config(format!(
                "invalid collection name '{}'",
                collection_name
            )));
        }
        Ok(Self {
            scene: scene.to_string(),
            collection_name: collection_name.to_string(),
            scene_dir: data_dir.join(scene),
            backup_root: data_dir.join("backups"),
        })
    }

    pub fn index_file(&self) -> PathBuf {
        self.scene_dir.join(format!("{}.index", self.collection_name))
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.scene_dir
            .join(format!("{}_metadata.json", self.collection_name))
    }

    pub fn image_mapping_file(&self) -> PathBuf {
        self.scene_dir
            .join(format!("{}_image_mapping.json", self.scene))
    }

    pub fn processed_file(&self) -> PathBuf {
        self.scene_dir
            .join(format!("processed_files_{}.json", self.scene))
    }

    pub fn image_dir(&self) -> PathBuf {
        self.scene_dir.join("images")
    }
}
