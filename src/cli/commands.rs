// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::collection::SceneCollection;
use crate::config::RagConfig;
use crate::embeddings::{Embedder, HashEmbedder, HttpEmbedder, RetryingEmbedder};
use crate::ingest::{IngestMode, IngestionPipeline};
use crate::retrieval::RetrievalService;
use crate::store::EntryId;

/// Arguments for build and insert
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Directory of .txt / .md documents
    pub dir: PathBuf,
}

/// Arguments for retrieve
#[derive(Args, Debug)]
pub struct RetrieveArgs {
    /// Question to search for
    pub query: String,

    /// Number of results
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,
}

/// Environment configuration with command-line overrides applied
pub fn load_config(data_dir: Option<PathBuf>, scene: Option<String>) -> Result<RagConfig> {
    let mut config = RagConfig::from_env().context("Invalid RAG configuration")?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    if let Some(scene) = scene {
        config.scene = scene;
    }
    config.validate().context("Invalid RAG configuration")?;
    Ok(config)
}

fn make_embedder(config: &RagConfig) -> Result<Arc<dyn Embedder>> {
    match &config.embedding_endpoint {
        Some(endpoint) => {
            let http = HttpEmbedder::new(endpoint, &config.embedding_model, config.dimension)?;
            Ok(Arc::new(RetryingEmbedder::new(http, config.retry.clone())))
        }
        None => {
            warn!("EMBEDDING_ENDPOINT not set, using the deterministic hash embedder");
            Ok(Arc::new(HashEmbedder::new(config.dimension)?))
        }
    }
}

fn open_collection(config: &RagConfig, model: Option<&str>) -> Result<SceneCollection> {
    let layout = config.layout()?;
    SceneCollection::open(layout, config.dimension, model)
        .with_context(|| format!("Failed to open scene '{}'", config.scene))
}

pub async fn status(config: &RagConfig) -> Result<()> {
    let collection = open_collection(config, None)?;
    let status = collection.status()?;

    println!("📁 Scene: {}", status.scene);
    println!("   Directory: {}", status.index_dir.display());
    if status.index_exists {
        println!("✅ Index present ({} entries)", status.entry_count);
    } else {
        println!("⚠️  No index built yet");
    }
    for file in &status.files {
        println!("   {} ({} bytes)", file.name, file.size_bytes);
    }
    Ok(())
}

pub async fn stats(config: &RagConfig) -> Result<()> {
    let collection = open_collection(config, None)?;
    println!("{}", serde_json::to_string_pretty(&collection.stats())?);
    Ok(())
}

pub async fn backup(config: &RagConfig) -> Result<()> {
    let collection = open_collection(config, None)?;
    let target = collection.backup(&collection.layout().backup_root)?;
    println!("✅ Backed up scene '{}' to {}", config.scene, target.display());
    Ok(())
}

pub async fn purge_images(config: &RagConfig) -> Result<()> {
    let mut collection = open_collection(config, None)?;
    let removed = collection.delete_by_id_prefix(&EntryId::image_prefix(&config.scene))?;
    println!("🗑️  Removed {} image entries from scene '{}'", removed, config.scene);
    Ok(())
}

pub async fn build(config: &RagConfig, args: SourceArgs) -> Result<()> {
    let embedder = make_embedder(config)?;
    // A rebuild may switch models; the cleared collection adopts the new one
    let collection = open_collection(config, None)?.into_shared();
    let pipeline = IngestionPipeline::new(collection.clone(), embedder, &config.chunking)?;

    info!("Rebuilding scene '{}' from {}", config.scene, args.dir.display());
    let outcome = pipeline
        .build(&args.dir)
        .await
        .with_context(|| format!("Failed to build from {}", args.dir.display()))?;

    let count = collection.read().await.count();
    println!(
        "✅ Built scene '{}': {} documents, {} entries",
        config.scene, outcome.documents, count
    );
    Ok(())
}

pub async fn insert(config: &RagConfig, args: SourceArgs) -> Result<()> {
    let embedder = make_embedder(config)?;
    let collection = open_collection(config, Some(embedder.model_id()))?.into_shared();
    let pipeline = IngestionPipeline::new(collection.clone(), embedder, &config.chunking)?;

    let report = pipeline
        .ingest_directory_report(&args.dir, IngestMode::Incremental)
        .await
        .with_context(|| format!("Failed to insert from {}", args.dir.display()))?;

    let count = collection.read().await.count();
    println!(
        "✅ Inserted {} new documents into scene '{}' ({} entries total)",
        report.added, config.scene, count
    );
    if report.failed > 0 {
        println!("⚠️  {} documents failed, see the log for details", report.failed);
    }
    Ok(())
}

pub async fn retrieve(config: &RagConfig, args: RetrieveArgs) -> Result<()> {
    let embedder = make_embedder(config)?;
    let collection = open_collection(config, None)?.into_shared();
    let service = RetrievalService::new(collection, embedder);

    let items = match service.retrieve(&args.query, args.top_k).await {
        Ok(items) => items,
        Err(e) => anyhow::bail!("{}", e.user_message()),
    };
    if items.is_empty() {
        println!("No matches in scene '{}'", config.scene);
        return Ok(());
    }

    for (rank, item) in items.iter().enumerate() {
        let (kind, content, source_path, score) = item.as_tuple();
        println!("{}. [{}] score={:.4}", rank + 1, kind, score);
        println!("   {}", content);
        if let Some(path) = source_path {
            println!("   📷 {}", path.display());
        }
    }
    Ok(())
}
