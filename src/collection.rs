// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Scene collection: the index, entry store, image mapping and processed set
//! of one scene, owned together and checkpointed together
//!
//! Ingestion and retrieval hold a [`SharedCollection`] handle to the same
//! collection. Mutations take the write lock for the synchronous
//! mutate-and-persist step only; embedding happens outside the lock.

use crate::config::SceneLayout;
use crate::errors::{RagError, Result};
use crate::store::{
    Entry, EntryId, EntryKind, EntryStore, ImageMapping, MetadataHeader, ProcessedSet,
};
use crate::vector::{FlatIndex, Neighbor};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub type SharedCollection = Arc<RwLock<SceneCollection>>;

/// Counts reported by `stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub scene: String,
    pub collection_name: String,
    pub dimension: usize,
    pub embedding_model: Option<String>,
    pub total_entries: usize,
    pub total_vectors: usize,
    pub text_entries: usize,
    pub image_entries: usize,
    pub image_mappings: usize,
    pub processed_files: usize,
    pub processed_images: usize,
    pub next_index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexFileInfo {
    pub name: String,
    pub size_bytes: u64,
}

/// What is on disk for a scene
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    pub scene: String,
    pub index_dir: PathBuf,
    pub index_exists: bool,
    pub entry_count: usize,
    pub files: Vec<IndexFileInfo>,
}

pub struct SceneCollection {
    layout: SceneLayout,
    index: FlatIndex,
    entries: EntryStore,
    images: ImageMapping,
    processed: ProcessedSet,
    embedding_model: Option<String>,
}

impl SceneCollection {
    /// Load a scene's checkpoint, creating the scene directories if needed
    ///
    /// Missing or corrupt files load as empty. Bindings without an entry and
    /// entries without a live binding are dropped, and the processed hashes
    /// of dropped ids are forgotten so that incremental ingestion restores
    /// them. Without a readable metadata file the processed set is cleared.
    ///
    /// # Errors
    /// - `Config` if `dimension` is 0 or the collection was built with a
    ///   different embedding model
    /// - `DimensionMismatch` if the persisted collection has another dimension
    /// - `Io` if the scene directories cannot be created
    pub fn open(layout: SceneLayout, dimension: usize, embedding_model: Option<&str>) -> Result<Self> {
        std::fs::create_dir_all(&layout.scene_dir)?;
        std::fs::create_dir_all(layout.image_dir())?;

        let index = FlatIndex::load(&layout.index_file(), dimension)?;
        let (entries, header) = EntryStore::load(&layout.metadata_file());
        let images = ImageMapping::load(&layout.image_mapping_file());
        let mut processed = ProcessedSet::load(&layout.processed_file());

        // Processed hashes without a readable metadata file point at nothing
        let healed =
            header.is_none() && (processed.file_count() > 0 || processed.image_count() > 0);
        if healed {
            warn!(
                "Scene '{}': no readable metadata, forgetting {} processed files and {} images",
                layout.scene,
                processed.file_count(),
                processed.image_count()
            );
            processed.clear();
        }

        let mut persisted_model = None;
        if let Some(header) = header {
            if header.dimension != 0 && header.dimension != dimension {
                return Err(RagError::dimension(dimension, header.dimension));
            }
            persisted_model = header.embedding_model;
        }
        let embedding_model = match (persisted_model, embedding_model) {
            (Some(persisted), Some(requested)) if persisted != requested && !entries.is_empty() => {
                return Err(RagError::Config(format!(
                    "scene '{}' was built with embedding model '{}', not '{}'",
                    layout.scene, persisted, requested
                )));
            }
            (_, Some(requested)) => Some(requested.to_string()),
            (persisted, None) => persisted,
        };

        let mut collection = Self {
            layout,
            index,
            entries,
            images,
            processed,
            embedding_model,
        };
        if collection.repair() > 0 || healed {
            if let Err(e) = collection.persist() {
                warn!("Repaired collection could not be saved yet: {}", e);
            }
        }

        info!(
            "Opened scene '{}': {} entries, {} vectors, {} image mappings",
            collection.layout.scene,
            collection.entries.len(),
            collection.index.total_vectors(),
            collection.images.len()
        );
        Ok(collection)
    }

    /// Discard any existing checkpoint and start an empty collection
    pub fn create_fresh(layout: SceneLayout, dimension: usize, embedding_model: Option<&str>) -> Result<Self> {
        std::fs::create_dir_all(&layout.scene_dir)?;
        std::fs::create_dir_all(layout.image_dir())?;

        let collection = Self {
            layout,
            index: FlatIndex::new(dimension)?,
            entries: EntryStore::new(),
            images: ImageMapping::new(),
            processed: ProcessedSet::new(),
            embedding_model: embedding_model.map(str::to_string),
        };
        collection.persist()?;
        info!("Created empty collection for scene '{}'", collection.layout.scene);
        Ok(collection)
    }

    pub fn into_shared(self) -> SharedCollection {
        Arc::new(RwLock::new(self))
    }

    /// Drop every entry, vector, mapping and processed hash, then checkpoint
    pub fn clear(&mut self) -> Result<()> {
        self.index.reset();
        self.entries.clear();
        self.images.clear();
        self.processed.clear();
        info!("Cleared scene '{}'", self.layout.scene);
        self.persist()
    }

    fn repair(&mut self) -> usize {
        let orphan_positions: Vec<u64> = self
            .index
            .bindings()
            .filter(|(_, id)| !self.entries.contains(id))
            .map(|(position, _)| position)
            .collect();
        if !orphan_positions.is_empty() {
            warn!(
                "Scene '{}': unbinding {} positions with no entry",
                self.layout.scene,
                orphan_positions.len()
            );
            let orphan_ids: Vec<String> = orphan_positions
                .iter()
                .filter_map(|position| self.index.id_at(*position))
                .map(str::to_string)
                .collect();
            self.index.remove_by_position(&orphan_positions);
            for id in &orphan_ids {
                self.forget_source(id);
                self.images.remove(id);
            }
        }

        let orphan_entries: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| self.index.position_of(&entry.id).is_none())
            .map(|entry| entry.id.clone())
            .collect();
        if !orphan_entries.is_empty() {
            warn!(
                "Scene '{}': dropping {} entries with no vector, their sources will be re-ingested",
                self.layout.scene,
                orphan_entries.len()
            );
        }
        for id in &orphan_entries {
            self.entries.remove(id);
            self.forget_source(id);
            self.images.remove(id);
        }

        orphan_positions.len() + orphan_entries.len()
    }

    /// Drop the processed hash behind `id` so incremental ingestion redoes it
    fn forget_source(&mut self, id: &str) {
        match EntryId::parse(id) {
            Some(EntryId::Text { file_hash, .. }) => {
                self.processed.forget_file(&file_hash);
            }
            Some(EntryId::Image { image_hash, .. }) => {
                self.processed.forget_image(&image_hash);
            }
            None => debug!("Entry {} has no content key", id),
        }
    }

    /// Tie this collection to one embedding model and dimension
    ///
    /// An empty collection adopts whatever model it is bound to.
    pub fn bind_embedder(&mut self, model_id: &str, dimension: usize) -> Result<()> {
        if dimension != self.index.dimension() {
            return Err(RagError::dimension(self.index.dimension(), dimension));
        }
        match &self.embedding_model {
            Some(current) if current == model_id => Ok(()),
            Some(current) if !self.entries.is_empty() => Err(RagError::Config(format!(
                "scene '{}' was built with embedding model '{}', not '{}'",
                self.layout.scene, current, model_id
            ))),
            _ => {
                debug!("Scene '{}' bound to embedding model {}", self.layout.scene, model_id);
                self.embedding_model = Some(model_id.to_string());
                Ok(())
            }
        }
    }

    /// Insert entries with their vectors
    ///
    /// All vectors are validated before anything changes. An id that is
    /// already present is rebound to its new vector and its entry replaced.
    pub fn upsert_entries(&mut self, batch: Vec<(Entry, Vec<f32>)>) -> Result<Vec<u64>> {
        let (entries, vectors): (Vec<Entry>, Vec<Vec<f32>>) = batch.into_iter().unzip();
        let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();

        let positions = self.index.add(&vectors, &ids)?;
        for entry in entries {
            self.entries.put(entry);
        }
        Ok(positions)
    }

    /// Remove every entry whose id starts with `prefix`, with its index
    /// binding, image mapping and processed hash, then checkpoint
    ///
    /// Returns how many entries were removed.
    pub fn delete_by_id_prefix(&mut self, prefix: &str) -> Result<usize> {
        let mut ids = self.entries.delete_by_id_prefix(prefix);
        let unbound_extra: Vec<String> = self
            .index
            .bindings()
            .filter(|(_, id)| id.starts_with(prefix))
            .map(|(_, id)| id.to_string())
            .filter(|id| !ids.contains(id))
            .collect();
        let removed = ids.len();

        ids.extend(unbound_extra);
        self.index.remove_ids(&ids);
        self.images.remove_prefix(prefix);
        for id in &ids {
            self.forget_source(id);
        }

        info!(
            "Deleted {} entries with prefix '{}' from scene '{}'",
            removed, prefix, self.layout.scene
        );
        self.persist()?;
        Ok(removed)
    }

    /// Write index, metadata, image mapping and processed set
    ///
    /// The processed set is written last so it never records work whose
    /// entries are not on disk. On failure the in-memory state is kept and
    /// the caller may retry.
    pub fn persist(&self) -> Result<()> {
        self.write_checkpoint().map_err(|e| {
            error!("Failed to persist scene '{}': {}", self.layout.scene, e);
            e
        })?;
        debug!(
            "Persisted scene '{}' ({} entries, next_idx {})",
            self.layout.scene,
            self.entries.len(),
            self.index.next_idx()
        );
        Ok(())
    }

    fn write_checkpoint(&self) -> Result<()> {
        self.index.persist(&self.layout.index_file())?;
        let header = MetadataHeader {
            id_to_idx: self.index.id_to_position(),
            next_idx: self.index.next_idx(),
            dimension: self.index.dimension(),
            collection_name: self.layout.collection_name.clone(),
            embedding_model: self.embedding_model.clone(),
        };
        self.entries.persist(&self.layout.metadata_file(), &header)?;
        self.images.persist(&self.layout.image_mapping_file())?;
        self.processed.persist(&self.layout.processed_file())
    }

    /// Nearest live entries to `query`, ascending distance
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Neighbor, &Entry)>> {
        let neighbors = self.index.search(query, k)?;
        let mut hits = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            match self.resolve(neighbor.position) {
                Some(entry) => hits.push((neighbor, entry)),
                None => warn!(
                    "Position {} in scene '{}' has no entry",
                    neighbor.position, self.layout.scene
                ),
            }
        }
        Ok(hits)
    }

    /// Artifact recorded for an image entry; the mapping table wins over
    /// the path stored on the entry itself
    pub fn artifact_path(&self, entry: &Entry) -> Option<PathBuf> {
        match &entry.kind {
            EntryKind::Image { artifact_path, .. } => self
                .images
                .get(&entry.id)
                .and_then(|record| record.artifact_path())
                .or_else(|| artifact_path.clone()),
            EntryKind::Text { .. } => None,
        }
    }

    pub fn resolve(&self, position: u64) -> Option<&Entry> {
        let id = self.index.id_at(position)?;
        self.entries.get(id).ok()
    }

    pub fn layout(&self) -> &SceneLayout {
        &self.layout
    }

    pub fn scene(&self) -> &str {
        &self.layout.scene
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    /// Live entries
    pub fn count(&self) -> usize {
        self.index.count()
    }

    pub fn is_empty(&self) -> bool {
        self.index.count() == 0
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    pub fn image_mapping(&self) -> &ImageMapping {
        &self.images
    }

    pub fn image_mapping_mut(&mut self) -> &mut ImageMapping {
        &mut self.images
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    pub fn processed_mut(&mut self) -> &mut ProcessedSet {
        &mut self.processed
    }

    pub fn stats(&self) -> CollectionStats {
        let image_entries = self.entries.iter().filter(|e| e.is_image()).count();
        CollectionStats {
            scene: self.layout.scene.clone(),
            collection_name: self.layout.collection_name.clone(),
            dimension: self.index.dimension(),
            embedding_model: self.embedding_model.clone(),
            total_entries: self.entries.len(),
            total_vectors: self.index.total_vectors(),
            text_entries: self.entries.len() - image_entries,
            image_entries,
            image_mappings: self.images.len(),
            processed_files: self.processed.file_count(),
            processed_images: self.processed.image_count(),
            next_index: self.index.next_idx(),
        }
    }

    /// Inspect the scene directory on disk
    pub fn status(&self) -> Result<IndexStatus> {
        let index_dir = self.layout.scene_dir.clone();
        let mut files = Vec::new();
        if index_dir.is_dir() {
            for dir_entry in std::fs::read_dir(&index_dir)? {
                let dir_entry = dir_entry?;
                let metadata = dir_entry.metadata()?;
                if metadata.is_file() {
                    files.push(IndexFileInfo {
                        name: dir_entry.file_name().to_string_lossy().into_owned(),
                        size_bytes: metadata.len(),
                    });
                }
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(IndexStatus {
            scene: self.layout.scene.clone(),
            index_exists: self.layout.index_file().is_file()
                && self.layout.metadata_file().is_file(),
            index_dir,
            entry_count: self.entries.len(),
            files,
        })
    }

    /// Copy the scene directory to `<backup_root>/<collection>_backup_<timestamp>`
    pub fn backup(&self, backup_root: &Path) -> Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let base = format!("{}_backup_{}", self.layout.collection_name, stamp);
        let mut target = backup_root.join(&base);
        let mut suffix = 1;
        while target.exists() {
            target = backup_root.join(format!("{}_{}", base, suffix));
            suffix += 1;
        }

        copy_dir(&self.layout.scene_dir, &target)?;
        info!("Backed up scene '{}' to {}", self.layout.scene, target.display());
        Ok(target)
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for item in WalkDir::new(from).min_depth(1) {
        let item = item.map_err(|e| RagError::Io(e.into()))?;
        let relative = item
            .path()
            .strip_prefix(from)
            .map_err(|e| RagError::Config(format!("backup path: {}", e)))?;
        let dest = to.join(relative);
        if item.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if item.file_type().is_file() {
            std::fs::copy(item.path(), &dest)?;
        }
    }
    Ok(())
}
