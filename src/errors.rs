// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the retrieval core
//!
//! - Configuration errors (bad dimension, bad paths, model mismatch)
//! - Shape errors (vector length differs from the collection dimension)
//! - Persistence errors (unreadable checkpoint files, disk failures)
//! - Collaborator errors (embedding calls, exhausted retries)

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the index, the stores, ingestion and retrieval
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid configuration, fatal at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vector length does not match the collection dimension
    #[error("Dimension mismatch: expected {expected}D, got {actual}D")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Entry or mapping not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A persisted file could not be decoded
    #[error("Corrupt state in {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    /// Disk read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The embedding collaborator failed
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Bounded retry gave up
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },

    /// One ingestion unit (file or image) could not be processed
    #[error("Failed to ingest {source_name}: {reason}")]
    Ingestion { source_name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    pub fn dimension(expected: usize, actual: usize) -> Self {
        RagError::DimensionMismatch { expected, actual }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        RagError::CorruptState {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn ingestion(source_name: impl Into<String>, reason: impl ToString) -> Self {
        RagError::Ingestion {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a caller can reasonably retry or skip the failed operation
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RagError::DimensionMismatch { .. }
                | RagError::Io(_)
                | RagError::Embedding(_)
                | RagError::RetriesExhausted { .. }
                | RagError::Ingestion { .. }
                | RagError::NotFound(_)
        )
    }

    /// Get user-friendly error message for API responses
    ///
    /// Empty retrieval results are not errors; anything reaching this
    /// method is a service failure and is worded as one.
    pub fn user_message(&self) -> String {
        match self {
            RagError::Config(msg) => format!("Knowledge base is misconfigured: {}", msg),
            RagError::DimensionMismatch { expected, actual } => format!(
                "Query embedding is incompatible with this knowledge base ({}D vs {}D)",
                actual, expected
            ),
            RagError::NotFound(what) => format!("Not found: {}", what),
            RagError::CorruptState { .. } => {
                "Knowledge base files are damaged and were reset".to_string()
            }
            RagError::Io(_) => "Knowledge base storage is unavailable, try again".to_string(),
            RagError::Serialization(_) => "Knowledge base data could not be encoded".to_string(),
            RagError::Embedding(_) | RagError::RetriesExhausted { .. } => {
                "Embedding service is unavailable, try again later".to_string()
            }
            RagError::Ingestion { source_name, .. } => {
                format!("Could not process {}", source_name)
            }
        }
    }
}

// Callers that know the file path attach it via `RagError::corrupt` instead
impl From<bincode::Error> for RagError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(io) => RagError::Io(io),
            other => RagError::CorruptState {
                path: PathBuf::new(),
                reason: other.to_string(),
            },
        }
    }
}
