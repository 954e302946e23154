// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Content hashes already ingested into a scene

use crate::errors::Result;
use crate::utils::{read_json, unix_timestamp, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// Hashes of files and images that incremental ingestion skips
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedSet {
    files: BTreeSet<String>,
    images: BTreeSet<String>,
}

#[derive(Serialize, Deserialize)]
struct ProcessedFile {
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    last_updated: f64,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_file(&self, hash: &str) -> bool {
        self.files.contains(hash)
    }

    pub fn contains_image(&self, hash: &str) -> bool {
        self.images.contains(hash)
    }

    pub fn mark_file(&mut self, hash: impl Into<String>) -> bool {
        self.files.insert(hash.into())
    }

    pub fn mark_image(&mut self, hash: impl Into<String>) -> bool {
        self.images.insert(hash.into())
    }

    pub fn forget_file(&mut self, hash: &str) -> bool {
        self.files.remove(hash)
    }

    pub fn forget_image(&mut self, hash: &str) -> bool {
        self.images.remove(hash)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn clear_images(&mut self) {
        self.images.clear();
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.images.clear();
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let file = ProcessedFile {
            files: self.files.iter().cloned().collect(),
            images: self.images.iter().cloned().collect(),
            last_updated: unix_timestamp(),
        };
        write_json_atomic(path, &file)
    }

    pub fn try_load(path: &Path) -> Result<Option<Self>> {
        Ok(read_json::<ProcessedFile>(path)?.map(|file| Self {
            files: file.files.into_iter().collect(),
            images: file.images.into_iter().collect(),
        }))
    }

    /// Missing or unreadable files load as empty, so everything is reprocessed
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(set) => set.unwrap_or_default(),
            Err(e) => {
                warn!("Processed set {} unreadable, starting empty: {}", path.display(), e);
                Self::new()
            }
        }
    }
}
