// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Content hashes used as stable dedup keys
//!
//! Entry ids embed these hashes, so changing the algorithm invalidates
//! every persisted collection.

use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes, lowercase hex
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash of text after case folding and whitespace collapsing
///
/// Two chunks that differ only in case or spacing hash identically.
pub fn normalized_text_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    content_hash(normalized.as_bytes())
}
