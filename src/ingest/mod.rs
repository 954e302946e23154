// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ingestion: documents and image descriptions into a scene collection
//!
//! One unit of work is one document or one image. A unit is embedded
//! outside the collection lock, then inserted, marked processed and
//! checkpointed under the write lock. A failing unit is logged and skipped;
//! it never aborts the batch.

pub mod documents;
pub mod pipeline;

pub use documents::{
    collect_documents, read_document, DocumentSource, TextDocument, MAX_DOCUMENT_BYTES,
    SUPPORTED_EXTENSIONS,
};
pub use pipeline::IngestionPipeline;

use std::fmt;
use std::path::PathBuf;

/// Whether already-processed content is skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Re-embed everything given
    Full,
    /// Skip content whose hash is in the processed set
    Incremental,
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestMode::Full => write!(f, "full"),
            IngestMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// An image artifact plus its generated description
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// SHA-256 of the raw image bytes
    pub image_hash: String,
    /// Stored artifact, if one was written
    pub artifact_path: Option<PathBuf>,
    /// Document the image was extracted from
    pub source_file: String,
    pub description: String,
}

/// Per-batch unit counts, logged at the end of every ingestion call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entries: usize,
}

/// Unit counts of a scene rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildOutcome {
    pub documents: usize,
    pub images: usize,
}
