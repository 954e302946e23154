// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod splitter;

pub use splitter::{estimate_tokens, TextSplitter, SEPARATORS};

use crate::utils::normalized_text_hash;
use std::collections::HashSet;

/// Tracks normalized chunk hashes seen so far
///
/// Chunks that differ only in case or whitespace are duplicates.
#[derive(Debug, Default)]
pub struct ChunkDeduper {
    seen: HashSet<String>,
}

impl ChunkDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` the first time a normalized chunk is offered
    pub fn admit(&mut self, chunk: &str) -> bool {
        self.seen.insert(normalized_text_hash(chunk))
    }

    pub fn contains(&self, chunk: &str) -> bool {
        self.seen.contains(&normalized_text_hash(chunk))
    }

    /// Take over everything `other` has seen
    pub fn absorb(&mut self, other: ChunkDeduper) {
        self.seen.extend(other.seen);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Drop repeated chunks, keeping the first occurrence and the original order
pub fn dedup_chunks(chunks: Vec<String>) -> Vec<String> {
    let mut deduper = ChunkDeduper::new();
    chunks
        .into_iter()
        .filter(|chunk| deduper.admit(chunk))
        .collect()
}
