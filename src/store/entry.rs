// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Entries and the authoritative id -> entry store
//!
//! Entry ids carry their kind as a string prefix on disk
//! (`text_<scene>_<hash>_chunk_<n>`, `image_<scene>_<hash>`). The prefix is
//! parsed once when an entry is loaded; in memory, code matches on
//! [`EntryKind`] instead of re-reading the id.

use crate::errors::{RagError, Result};
use crate::utils::{read_json, unix_timestamp, write_json_atomic};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const TEXT_TYPE: &str = "text_chunk";
pub const IMAGE_TYPE: &str = "image_description";

/// Structured form of an entry id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryId {
    Text {
        scene: String,
        file_hash: String,
        chunk_index: usize,
    },
    Image {
        scene: String,
        image_hash: String,
    },
}

impl EntryId {
    pub fn text(scene: &str, file_hash: &str, chunk_index: usize) -> Self {
        EntryId::Text {
            scene: scene.to_string(),
            file_hash: file_hash.to_string(),
            chunk_index,
        }
    }

    pub fn image(scene: &str, image_hash: &str) -> Self {
        EntryId::Image {
            scene: scene.to_string(),
            image_hash: image_hash.to_string(),
        }
    }

    /// `"image_<scene>_"`, the prefix shared by every image entry of a scene
    pub fn image_prefix(scene: &str) -> String {
        format!("image_{}_", scene)
    }

    /// Parse a persisted id; `None` for ids that follow neither scheme
    ///
    /// Hashes are hex and never contain `_`, so the scene is whatever lies
    /// between the kind prefix and the last separator.
    pub fn parse(id: &str) -> Option<Self> {
        if let Some(rest) = id.strip_prefix("text_") {
            let (head, chunk) = rest.rsplit_once("_chunk_")?;
            let chunk_index = chunk.parse::<usize>().ok()?;
            let (scene, file_hash) = head.rsplit_once('_')?;
            if scene.is_empty() || file_hash.is_empty() {
                return None;
            }
            return Some(Self::text(scene, file_hash, chunk_index));
        }
        if let Some(rest) = id.strip_prefix("image_") {
            let (scene, image_hash) = rest.rsplit_once('_')?;
            if scene.is_empty() || image_hash.is_empty() {
                return None;
            }
            return Some(Self::image(scene, image_hash));
        }
        None
    }

    pub fn scene(&self) -> &str {
        match self {
            EntryId::Text { scene, .. } | EntryId::Image { scene, .. } => scene,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, EntryId::Image { .. })
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Text {
                scene,
                file_hash,
                chunk_index,
            } => write!(f, "text_{}_{}_chunk_{}", scene, file_hash, chunk_index),
            EntryId::Image { scene, image_hash } => write!(f, "image_{}_{}", scene, image_hash),
        }
    }
}

/// What an entry points back to
#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Text {
        source_file: Option<String>,
    },
    Image {
        description: String,
        artifact_path: Option<PathBuf>,
    },
}

/// One retrievable unit
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: String,
    /// Exactly the text that was embedded
    pub content: String,
    pub kind: EntryKind,
    /// Caller metadata (scene, timestamps, anything extra)
    pub metadata: Map<String, Value>,
    pub added_at: f64,
}

impl Entry {
    pub fn text(id: impl Into<String>, content: impl Into<String>, source_file: Option<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind: EntryKind::Text { source_file },
            metadata: Map::new(),
            added_at: unix_timestamp(),
        }
    }

    /// Image entries embed the synthetic string `"<id>: <description>"`
    pub fn image(
        id: impl Into<String>,
        description: impl Into<String>,
        artifact_path: Option<PathBuf>,
    ) -> Self {
        let id = id.into();
        let description = description.into();
        Self {
            content: format!("{}: {}", id, description),
            id,
            kind: EntryKind::Image {
                description,
                artifact_path,
            },
            metadata: Map::new(),
            added_at: unix_timestamp(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, EntryKind::Image { .. })
    }

    pub fn type_tag(&self) -> &'static str {
        match self.kind {
            EntryKind::Text { .. } => TEXT_TYPE,
            EntryKind::Image { .. } => IMAGE_TYPE,
        }
    }

    fn to_stored(&self) -> StoredEntry {
        let mut extra = self.metadata.clone();
        extra.insert("type".to_string(), Value::from(self.type_tag()));
        match &self.kind {
            EntryKind::Text { source_file } => {
                if let Some(source) = source_file {
                    extra.insert("source_file".to_string(), Value::from(source.as_str()));
                }
            }
            EntryKind::Image {
                description,
                artifact_path,
            } => {
                extra.insert("description".to_string(), Value::from(description.as_str()));
                if let Some(path) = artifact_path {
                    extra.insert(
                        "image_path".to_string(),
                        Value::from(path.to_string_lossy().into_owned()),
                    );
                }
            }
        }
        StoredEntry {
            content: self.content.clone(),
            id: self.id.clone(),
            added_at: self.added_at,
            extra,
        }
    }

    fn from_stored(key: &str, stored: StoredEntry) -> Self {
        let StoredEntry {
            content,
            id,
            added_at,
            mut extra,
        } = stored;
        // The map key is authoritative; the inner id is a convenience copy
        if !id.is_empty() && id != key {
            debug!("Entry {} carries mismatched inner id {}", key, id);
        }
        let id = key.to_string();

        let is_image = match EntryId::parse(&id) {
            Some(parsed) => parsed.is_image(),
            None => extra.get("type").and_then(Value::as_str) == Some(IMAGE_TYPE),
        };
        extra.remove("type");

        let kind = if is_image {
            let description = match extra.remove("description") {
                Some(Value::String(d)) => d,
                _ => content
                    .strip_prefix(&format!("{}: ", id))
                    .unwrap_or(&content)
                    .to_string(),
            };
            let artifact_path = match extra.remove("image_path") {
                Some(Value::String(p)) if !p.is_empty() => Some(PathBuf::from(p)),
                _ => None,
            };
            EntryKind::Image {
                description,
                artifact_path,
            }
        } else {
            let source_file = match extra.remove("source_file") {
                Some(Value::String(s)) => Some(s),
                _ => None,
            };
            EntryKind::Text { source_file }
        };

        Self {
            id,
            content,
            kind,
            metadata: extra,
            added_at,
        }
    }
}

/// JSON shape of one entry under `metadata` in the metadata file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub content: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub added_at: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Index bookkeeping saved next to the entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataHeader {
    #[serde(default)]
    pub id_to_idx: BTreeMap<String, u64>,
    #[serde(default)]
    pub next_idx: u64,
    #[serde(default)]
    pub dimension: usize,
    #[serde(default)]
    pub collection_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// The metadata file: `{metadata: {id: {content, ...}}, id_to_idx, next_idx, ...}`
#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    metadata: BTreeMap<String, StoredEntry>,
    #[serde(flatten)]
    header: MetadataHeader,
    #[serde(default)]
    saved_at: f64,
}

/// Authoritative id -> entry mapping
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    entries: BTreeMap<String, Entry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry with the same id
    pub fn put(&mut self, entry: Entry) -> Option<Entry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    pub fn get(&self, id: &str) -> Result<&Entry> {
        self.entries
            .get(id)
            .ok_or_else(|| RagError::NotFound(format!("entry {}", id)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Entry> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove every entry whose id starts with `prefix`, returning the removed ids
    ///
    /// Only the store is touched; `SceneCollection::delete_by_id_prefix`
    /// keeps the index bindings in step.
    pub fn delete_by_id_prefix(&mut self, prefix: &str) -> Vec<String> {
        let ids = self.ids_with_prefix(prefix);
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }

    pub fn persist(&self, path: &Path, header: &MetadataHeader) -> Result<()> {
        let file = MetadataFile {
            metadata: self
                .entries
                .iter()
                .map(|(id, entry)| (id.clone(), entry.to_stored()))
                .collect(),
            header: header.clone(),
            saved_at: unix_timestamp(),
        };
        write_json_atomic(path, &file)
    }

    /// Read the metadata file without recovery; `Ok(None)` if absent
    pub fn try_load(path: &Path) -> Result<Option<(Self, MetadataHeader)>> {
        let Some(file) = read_json::<MetadataFile>(path)? else {
            return Ok(None);
        };
        let entries = file
            .metadata
            .into_iter()
            .map(|(id, stored)| {
                let entry = Entry::from_stored(&id, stored);
                (id, entry)
            })
            .collect();
        Ok(Some((Self { entries }, file.header)))
    }

    /// Read the metadata file, degrading to an empty store if it is unreadable
    pub fn load(path: &Path) -> (Self, Option<MetadataHeader>) {
        match Self::try_load(path) {
            Ok(Some((store, header))) => (store, Some(header)),
            Ok(None) => (Self::new(), None),
            Err(e) => {
                warn!("Metadata {} unreadable, starting empty: {}", path.display(), e);
                (Self::new(), None)
            }
        }
    }
}
