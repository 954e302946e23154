// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Source document discovery and decoding

use crate::errors::{RagError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

pub const MAX_DOCUMENT_BYTES: u64 = 100 * 1024 * 1024;
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A candidate file found under a source directory
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSource {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Decoded text of one source document
#[derive(Debug, Clone, PartialEq)]
pub struct TextDocument {
    pub source: String,
    pub text: String,
}

impl TextDocument {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

fn is_ignored_name(name: &str) -> bool {
    name.starts_with("~$") || name.starts_with('.') || name == "Thumbs.db"
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_string_lossy().starts_with('.')
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Every supported document under `dir`, sorted by path
///
/// Office lock files (`~$*`), hidden files and directories, and
/// `Thumbs.db` are skipped.
pub fn collect_documents(dir: &Path) -> Result<Vec<DocumentSource>> {
    if !dir.is_dir() {
        return Err(RagError::NotFound(format!(
            "source directory {}",
            dir.display()
        )));
    }

    let mut documents = Vec::new();
    for item in WalkDir::new(dir).into_iter().filter_entry(|e| !is_hidden_dir(e)) {
        let item = item.map_err(|e| RagError::Io(e.into()))?;
        if !item.file_type().is_file() {
            continue;
        }
        let name = item.file_name().to_string_lossy();
        if is_ignored_name(&name) {
            debug!("Skipping {}", item.path().display());
            continue;
        }
        if !has_supported_extension(item.path()) {
            debug!("Unsupported file type: {}", item.path().display());
            continue;
        }
        let size_bytes = item
            .metadata()
            .map_err(|e| RagError::Io(e.into()))?
            .len();
        documents.push(DocumentSource {
            path: item.into_path(),
            size_bytes,
        });
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}

/// Read and decode one document
///
/// # Errors
/// `Ingestion` for empty, oversized or non-UTF-8 files, `Io` if the file
/// cannot be read
pub fn read_document(path: &Path) -> Result<TextDocument> {
    let source = path.display().to_string();
    let size = std::fs::metadata(path)?.len();
    if size == 0 {
        return Err(RagError::ingestion(source, "file is empty"));
    }
    if size > MAX_DOCUMENT_BYTES {
        return Err(RagError::ingestion(
            source,
            format!("file is {} bytes, limit is {}", size, MAX_DOCUMENT_BYTES),
        ));
    }

    let bytes = std::fs::read(path)?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
    let text = std::str::from_utf8(body)
        .map_err(|e| RagError::ingestion(&source, format!("not valid UTF-8: {}", e)))?
        .to_string();

    Ok(TextDocument { source, text })
}
