// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Flat vector index with exact squared-L2 search
//!
//! ## Storage model
//!
//! - Vectors live in one append-only row-major buffer; row `n` is position `n`
//! - Positions come from `next_idx`, which only ever grows
//! - Deletion unbinds a position from its id; the vector row stays in the
//!   buffer, so `total_vectors()` can exceed `count()`
//! - Re-adding an id binds it to the new position and unbinds the old one
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scenerag::vector::FlatIndex;
//!
//! let mut index = FlatIndex::new(8)?;
//! index.add(&[vec![0.0; 8]], &["text_campus_abc_chunk_0".to_string()])?;
//! let hits = index.search(&[0.0; 8], 5)?;
//! assert_eq!(hits[0].distance, 0.0);
//! ```

use crate::errors::{RagError, Result};
use crate::utils::write_bytes_atomic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

/// A nearest-neighbour hit: index position and squared L2 distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: u64,
    pub distance: f32,
}

/// Borrowed view written to disk; layout matches `IndexFile`
#[derive(Serialize)]
struct IndexFileRef<'a> {
    dimension: usize,
    next_idx: u64,
    vectors: &'a [f32],
    positions: &'a BTreeMap<u64, String>,
}

/// On-disk representation, encoded with bincode
#[derive(Deserialize)]
struct IndexFile {
    dimension: usize,
    next_idx: u64,
    vectors: Vec<f32>,
    positions: BTreeMap<u64, String>,
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    next_idx: u64,
    vectors: Vec<f32>,
    /// Live position -> id
    positions: BTreeMap<u64, String>,
    /// Live id -> position
    ids: HashMap<String, u64>,
}

impl FlatIndex {
    /// Create an empty index
    ///
    /// # Errors
    /// `Config` if `dimension` is 0
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Config(
                "index dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            next_idx: 0,
            vectors: Vec::new(),
            positions: BTreeMap::new(),
            ids: HashMap::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of live (bound) positions
    pub fn count(&self) -> usize {
        self.positions.len()
    }

    /// Number of vector rows physically stored, including unbound ones
    pub fn total_vectors(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    pub fn next_idx(&self) -> u64 {
        self.next_idx
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position_of(&self, id: &str) -> Option<u64> {
        self.ids.get(id).copied()
    }

    pub fn id_at(&self, position: u64) -> Option<&str> {
        self.positions.get(&position).map(String::as_str)
    }

    /// Live id -> position bindings, ordered by position
    pub fn bindings(&self) -> impl Iterator<Item = (u64, &str)> {
        self.positions.iter().map(|(pos, id)| (*pos, id.as_str()))
    }

    pub fn id_to_position(&self) -> BTreeMap<String, u64> {
        self.positions
            .iter()
            .map(|(pos, id)| (id.clone(), *pos))
            .collect()
    }

    pub fn vector_at(&self, position: u64) -> Option<&[f32]> {
        let row = usize::try_from(position).ok()?;
        let start = row.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Check a batch before mutating anything
    pub fn validate_batch(&self, vectors: &[Vec<f32>], ids: &[String]) -> Result<()> {
        if vectors.len() != ids.len() {
            return Err(RagError::Config(format!(
                "batch has {} vectors but {} ids",
                vectors.len(),
                ids.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::dimension(self.dimension, bad.len()));
        }
        Ok(())
    }

    /// Append a batch of vectors, binding each to the matching id
    ///
    /// The whole batch is validated first; on error nothing is appended.
    /// Returns the positions assigned, in input order.
    pub fn add(&mut self, vectors: &[Vec<f32>], ids: &[String]) -> Result<Vec<u64>> {
        self.validate_batch(vectors, ids)?;

        self.vectors.reserve(vectors.len() * self.dimension);
        let mut assigned = Vec::with_capacity(vectors.len());
        for (vector, id) in vectors.iter().zip(ids) {
            let position = self.next_idx;
            self.vectors.extend_from_slice(vector);
            self.next_idx += 1;

            if let Some(old) = self.ids.insert(id.clone(), position) {
                debug!("Rebinding {} from position {} to {}", id, old, position);
                self.positions.remove(&old);
            }
            self.positions.insert(position, id.clone());
            assigned.push(position);
        }

        Ok(assigned)
    }

    /// Up to `k` live neighbours, ascending distance, ties by position
    ///
    /// # Errors
    /// `DimensionMismatch` if the query length differs from the index dimension
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(RagError::dimension(self.dimension, query.len()));
        }
        if k == 0 || self.positions.is_empty() {
            return Ok(Vec::new());
        }

        // BTreeMap iteration is position-ascending, and the sort is stable
        let mut hits: Vec<Neighbor> = self
            .positions
            .keys()
            .filter_map(|&position| {
                self.vector_at(position).map(|row| Neighbor {
                    position,
                    distance: squared_l2(query, row),
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    /// Unbind positions; unknown positions are ignored
    ///
    /// Returns how many bindings were actually removed.
    pub fn remove_by_position(&mut self, positions: &[u64]) -> usize {
        let mut removed = 0;
        for position in positions {
            if let Some(id) = self.positions.remove(position) {
                self.ids.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    /// Unbind ids; unknown ids are ignored
    pub fn remove_ids<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let positions: Vec<u64> = ids
            .iter()
            .filter_map(|id| self.ids.get(id.as_ref()).copied())
            .collect();
        self.remove_by_position(&positions)
    }

    /// Drop every vector and binding, keeping the dimension
    pub fn reset(&mut self) {
        self.next_idx = 0;
        self.vectors.clear();
        self.positions.clear();
        self.ids.clear();
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let file = IndexFileRef {
            dimension: self.dimension,
            next_idx: self.next_idx,
            vectors: &self.vectors,
            positions: &self.positions,
        };
        Ok(bincode::serialize(&file)?)
    }

    /// Decode and validate a serialized index
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file: IndexFile =
            bincode::deserialize(bytes).map_err(|e| RagError::corrupt("", e))?;

        if file.dimension == 0 {
            return Err(RagError::corrupt("", "index dimension is 0"));
        }
        if file.vectors.len() % file.dimension != 0 {
            return Err(RagError::corrupt(
                "",
                format!(
                    "vector buffer length {} is not a multiple of dimension {}",
                    file.vectors.len(),
                    file.dimension
                ),
            ));
        }
        let total = (file.vectors.len() / file.dimension) as u64;
        if file.next_idx != total {
            return Err(RagError::corrupt(
                "",
                format!("next_idx {} does not match {} stored vectors", file.next_idx, total),
            ));
        }
        if let Some((&pos, _)) = file.positions.range(total..).next() {
            return Err(RagError::corrupt(
                "",
                format!("position {} is past the end of the index", pos),
            ));
        }

        let mut ids = HashMap::with_capacity(file.positions.len());
        for (pos, id) in &file.positions {
            if ids.insert(id.clone(), *pos).is_some() {
                return Err(RagError::corrupt("", format!("id {} bound twice", id)));
            }
        }

        Ok(Self {
            dimension: file.dimension,
            next_idx: file.next_idx,
            vectors: file.vectors,
            positions: file.positions,
            ids,
        })
    }

    /// Write the index (vectors, bindings, `next_idx`) atomically
    pub fn persist(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_bytes_atomic(path, &bytes)
    }

    /// Read an index without any recovery
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `CorruptState` if it cannot be decoded
    pub fn try_load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes).map_err(|e| match e {
            RagError::CorruptState { reason, .. } => RagError::corrupt(path, reason),
            other => other,
        })
    }

    /// Load an index, replacing a missing or corrupt file with an empty index
    ///
    /// # Errors
    /// - `Config` if `dimension` is 0
    /// - `DimensionMismatch` if a readable file was built for another dimension
    pub fn load(path: &Path, dimension: usize) -> Result<Self> {
        let fresh = Self::new(dimension)?;
        if !path.exists() {
            debug!("No index at {}, starting empty", path.display());
            return Ok(fresh);
        }

        match Self::try_load(path) {
            Ok(index) if index.dimension != dimension => {
                Err(RagError::dimension(dimension, index.dimension))
            }
            Ok(index) => Ok(index),
            Err(e) => {
                warn!("Index {} unreadable, starting empty: {}", path.display(), e);
                Ok(fresh)
            }
        }
    }
}

/// Squared Euclidean distance
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
