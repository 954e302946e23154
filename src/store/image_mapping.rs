// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image id -> stored artifact mapping

use crate::errors::Result;
use crate::utils::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One stored image and where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMappingEntry {
    /// Empty when the artifact was never written
    #[serde(default)]
    pub image_path: String,
    #[serde(default)]
    pub image_filename: String,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub enhanced_description: String,
    #[serde(default)]
    pub image_hash: String,
}

impl ImageMappingEntry {
    pub fn artifact_path(&self) -> Option<PathBuf> {
        if self.image_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.image_path))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageMapping {
    entries: BTreeMap<String, ImageMappingEntry>,
}

impl ImageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, image_id: &str) -> Option<&ImageMappingEntry> {
        self.entries.get(image_id)
    }

    pub fn insert(&mut self, image_id: impl Into<String>, entry: ImageMappingEntry) {
        self.entries.insert(image_id.into(), entry);
    }

    pub fn remove(&mut self, image_id: &str) -> Option<ImageMappingEntry> {
        self.entries.remove(image_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ImageMappingEntry)> {
        self.entries.iter()
    }

    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| !id.starts_with(prefix));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn try_load(path: &Path) -> Result<Option<Self>> {
        read_json(path)
    }

    /// Missing or unreadable mapping files load as empty
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(mapping) => mapping.unwrap_or_default(),
            Err(e) => {
                warn!("Image mapping {} unreadable, starting empty: {}", path.display(), e);
                Self::new()
            }
        }
    }
}
