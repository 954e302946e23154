// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::documents::{collect_documents, read_document, TextDocument};
use super::{ImageRecord, IngestMode, IngestReport, RebuildOutcome};
use crate::chunking::{ChunkDeduper, TextSplitter};
use crate::collection::SharedCollection;
use crate::config::ChunkingConfig;
use crate::embeddings::{Embedder, ImageDescriber};
use crate::errors::{RagError, Result};
use crate::store::{Entry, EntryId, ImageMappingEntry};
use crate::utils::{content_hash, write_bytes_atomic};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Turns documents and image descriptions into entries of one scene
pub struct IngestionPipeline {
    collection: SharedCollection,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
}

impl IngestionPipeline {
    pub fn new(
        collection: SharedCollection,
        embedder: Arc<dyn Embedder>,
        chunking: &ChunkingConfig,
    ) -> Result<Self> {
        Ok(Self {
            collection,
            embedder,
            splitter: TextSplitter::from_config(chunking)?,
        })
    }

    pub fn collection(&self) -> &SharedCollection {
        &self.collection
    }

    /// Tie the collection to this pipeline's embedder, returning the scene name
    async fn bind(&self) -> Result<String> {
        let mut collection = self.collection.write().await;
        collection.bind_embedder(self.embedder.model_id(), self.embedder.dimension())?;
        Ok(collection.scene().to_string())
    }

    /// Chunk, embed and store documents, one checkpoint per document
    ///
    /// Returns the number of documents that produced entries. Duplicate
    /// documents, documents already processed (incremental mode) and
    /// documents without text are skipped; failing documents are logged and
    /// skipped.
    ///
    /// # Errors
    /// Only when the collection cannot be bound to the embedder
    pub async fn ingest_text(&self, documents: Vec<TextDocument>, mode: IngestMode) -> Result<usize> {
        Ok(self.ingest_batch(documents, mode, 0).await?.added)
    }

    /// Documents are visited in `(file_hash, source)` order so that chunk
    /// dedup keeps the same copy whatever order the caller passed
    async fn ingest_batch(
        &self,
        documents: Vec<TextDocument>,
        mode: IngestMode,
        unreadable: usize,
    ) -> Result<IngestReport> {
        let scene = self.bind().await?;
        let mut report = IngestReport {
            failed: unreadable,
            ..IngestReport::default()
        };
        let mut seen_files = HashSet::new();
        let mut batch_chunks = ChunkDeduper::new();

        let mut hashed: Vec<(String, TextDocument)> = documents
            .into_iter()
            .map(|document| (content_hash(document.text.as_bytes()), document))
            .collect();
        hashed.sort_by(|(a_hash, a), (b_hash, b)| (a_hash, &a.source).cmp(&(b_hash, &b.source)));

        for (file_hash, document) in &hashed {
            if !seen_files.insert(file_hash.clone()) {
                debug!("Skipping {}: same content as an earlier document", document.source);
                report.skipped += 1;
                continue;
            }
            if mode == IngestMode::Incremental {
                let collection = self.collection.read().await;
                if collection.processed().contains_file(file_hash) {
                    debug!("Skipping {}: already processed", document.source);
                    report.skipped += 1;
                    continue;
                }
            }

            match self
                .ingest_document(&scene, document, file_hash, &mut batch_chunks)
                .await
            {
                Ok(0) => report.skipped += 1,
                Ok(entries) => {
                    report.added += 1;
                    report.entries += entries;
                }
                Err(e) => {
                    error!("Failed to ingest {}: {}", document.source, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Text ingestion ({}) for scene '{}': {} added ({} chunks), {} skipped, {} failed",
            mode, scene, report.added, report.entries, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn ingest_document(
        &self,
        scene: &str,
        document: &TextDocument,
        file_hash: &str,
        batch_chunks: &mut ChunkDeduper,
    ) -> Result<usize> {
        let chunks = self.splitter.split_text(&document.text);
        if chunks.is_empty() {
            warn!("{} has no text content", document.source);
            return Ok(0);
        }

        // Chunk numbers are positions in the document, so ids stay stable
        // whatever else is in the batch
        let mut doc_chunks = ChunkDeduper::new();
        let kept: Vec<(usize, String)> = chunks
            .into_iter()
            .enumerate()
            .filter(|(_, chunk)| !batch_chunks.contains(chunk) && doc_chunks.admit(chunk))
            .collect();

        if kept.is_empty() {
            debug!("{}: every chunk duplicates earlier content", document.source);
            let mut collection = self.collection.write().await;
            collection.processed_mut().mark_file(file_hash);
            collection.persist()?;
            return Ok(0);
        }

        let texts: Vec<String> = kept.iter().map(|(_, chunk)| chunk.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let batch: Vec<(Entry, Vec<f32>)> = kept
            .into_iter()
            .zip(vectors)
            .map(|((index, chunk), vector)| {
                let id = EntryId::text(scene, file_hash, index).to_string();
                let entry = Entry::text(id, chunk, Some(document.source.clone()))
                    .with_metadata("scene", scene)
                    .with_metadata("chunk_index", index as u64);
                (entry, vector)
            })
            .collect();

        let added = {
            let mut collection = self.collection.write().await;
            let positions = collection.upsert_entries(batch)?;
            collection.processed_mut().mark_file(file_hash);
            collection.persist()?;
            positions.len()
        };
        batch_chunks.absorb(doc_chunks);
        debug!("Ingested {} chunks from {}", added, document.source);
        Ok(added)
    }

    /// Embed and store image descriptions, one checkpoint per image
    ///
    /// Full mode first purges every image entry of the scene and replaces
    /// the mapping table; incremental mode skips processed hashes and merges.
    pub async fn ingest_images(&self, records: Vec<ImageRecord>, mode: IngestMode) -> Result<usize> {
        let scene = self.bind().await?;

        if mode == IngestMode::Full {
            let mut collection = self.collection.write().await;
            let purged = collection.delete_by_id_prefix(&EntryId::image_prefix(&scene))?;
            collection.image_mapping_mut().clear();
            collection.processed_mut().clear_images();
            collection.persist()?;
            info!("Purged {} image entries from scene '{}'", purged, scene);
        }

        let mut report = IngestReport::default();
        let mut seen_images = HashSet::new();
        for record in &records {
            if !seen_images.insert(record.image_hash.clone()) {
                report.skipped += 1;
                continue;
            }
            if mode == IngestMode::Incremental {
                let collection = self.collection.read().await;
                if collection.processed().contains_image(&record.image_hash) {
                    debug!("Skipping image {}: already processed", record.image_hash);
                    report.skipped += 1;
                    continue;
                }
            }
            if record.description.trim().is_empty() {
                warn!(
                    "Image {} from {} has no description",
                    record.image_hash, record.source_file
                );
                report.skipped += 1;
                continue;
            }

            match self.ingest_image(&scene, record).await {
                Ok(()) => {
                    report.added += 1;
                    report.entries += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to ingest image {} from {}: {}",
                        record.image_hash, record.source_file, e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Image ingestion ({}) for scene '{}': {} added, {} skipped, {} failed",
            mode, scene, report.added, report.skipped, report.failed
        );
        Ok(report.added)
    }

    async fn ingest_image(&self, scene: &str, record: &ImageRecord) -> Result<()> {
        let id = EntryId::image(scene, &record.image_hash).to_string();
        let entry = Entry::image(
            id.clone(),
            record.description.clone(),
            record.artifact_path.clone(),
        )
        .with_metadata("scene", scene)
        .with_metadata("source_file", record.source_file.as_str())
        .with_metadata("image_hash", record.image_hash.as_str());

        let vector = self.embedder.embed(&entry.content).await?;

        let mapping = ImageMappingEntry {
            image_path: record
                .artifact_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            image_filename: record
                .artifact_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_file: record.source_file.clone(),
            enhanced_description: record.description.clone(),
            image_hash: record.image_hash.clone(),
        };

        let mut collection = self.collection.write().await;
        collection.upsert_entries(vec![(entry, vector)])?;
        collection.image_mapping_mut().insert(id, mapping);
        collection.processed_mut().mark_image(record.image_hash.clone());
        collection.persist()
    }

    /// Clear the scene, then ingest everything again in full mode
    pub async fn rebuild_scene(
        &self,
        documents: Vec<TextDocument>,
        images: Vec<ImageRecord>,
    ) -> Result<RebuildOutcome> {
        self.rebuild(documents, 0, images).await
    }

    async fn rebuild(
        &self,
        documents: Vec<TextDocument>,
        unreadable: usize,
        images: Vec<ImageRecord>,
    ) -> Result<RebuildOutcome> {
        {
            let mut collection = self.collection.write().await;
            collection.clear()?;
        }
        let documents = self.ingest_batch(documents, IngestMode::Full, unreadable).await?;
        let images = self.ingest_images(images, IngestMode::Full).await?;
        Ok(RebuildOutcome {
            documents: documents.added,
            images,
        })
    }

    /// Ingest every supported document under `dir`
    ///
    /// Files that cannot be read count as failed units.
    pub async fn ingest_directory(&self, dir: &Path, mode: IngestMode) -> Result<usize> {
        Ok(self.ingest_directory_report(dir, mode).await?.added)
    }

    /// Like [`ingest_directory`](Self::ingest_directory), with the full unit counts
    pub async fn ingest_directory_report(&self, dir: &Path, mode: IngestMode) -> Result<IngestReport> {
        let (documents, unreadable) = read_sources(dir)?;
        self.ingest_batch(documents, mode, unreadable).await
    }

    /// Rebuild the scene from the documents under `dir`
    ///
    /// Image entries are not rebuilt from a directory, so any the scene
    /// holds are dropped.
    pub async fn build(&self, dir: &Path) -> Result<RebuildOutcome> {
        let (documents, unreadable) = read_sources(dir)?;
        {
            let collection = self.collection.read().await;
            let images = collection
                .entries()
                .ids_with_prefix(&EntryId::image_prefix(collection.scene()))
                .len();
            if images > 0 {
                warn!(
                    "Rebuilding scene '{}' drops {} image entries; re-run image ingestion to restore them",
                    collection.scene(),
                    images
                );
            }
        }
        self.rebuild(documents, unreadable, Vec::new()).await
    }

    /// Add new or changed documents under `dir`
    pub async fn insert(&self, dir: &Path) -> Result<usize> {
        self.ingest_directory(dir, IngestMode::Incremental).await
    }

    /// Store an extracted image and describe it
    ///
    /// Returns `None` without calling the describer when the image is
    /// already processed and `mode` is incremental. The artifact is written
    /// to `<images>/<hash>.<ext>` unless it already exists.
    pub async fn prepare_image(
        &self,
        bytes: &[u8],
        extension: &str,
        source_file: &str,
        context: &str,
        describer: &dyn ImageDescriber,
        mode: IngestMode,
    ) -> Result<Option<ImageRecord>> {
        let image_hash = content_hash(bytes);
        let image_dir = {
            let collection = self.collection.read().await;
            if mode == IngestMode::Incremental && collection.processed().contains_image(&image_hash) {
                debug!("Image {} from {} already processed", image_hash, source_file);
                return Ok(None);
            }
            collection.layout().image_dir()
        };

        let extension = match extension.trim_start_matches('.').to_lowercase() {
            ext if ext.is_empty() => "png".to_string(),
            ext => ext,
        };
        let path = image_dir.join(format!("{}.{}", image_hash, extension));
        if !path.exists() {
            write_bytes_atomic(&path, bytes)?;
            debug!("Stored image artifact {}", path.display());
        }

        let description = describer.describe(bytes, context).await?;
        Ok(Some(ImageRecord {
            image_hash,
            artifact_path: Some(path),
            source_file: source_file.to_string(),
            description,
        }))
    }
}

/// Decoded documents under `dir`, plus the number that could not be read
fn read_sources(dir: &Path) -> Result<(Vec<TextDocument>, usize)> {
    let sources = collect_documents(dir)?;
    info!("Found {} documents under {}", sources.len(), dir.display());

    let mut documents = Vec::with_capacity(sources.len());
    let mut unreadable = 0;
    for source in sources {
        match read_document(&source.path) {
            Ok(document) => documents.push(document),
            Err(e) => {
                error!("Failed to read {}: {}", source.path.display(), e);
                unreadable += 1;
            }
        }
    }
    Ok((documents, unreadable))
}
