// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod chunking;
pub mod cli;
pub mod collection;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod ingest;
pub mod retrieval;
pub mod store;
pub mod utils;
pub mod vector;

pub use collection::{CollectionStats, IndexStatus, SceneCollection, SharedCollection};
pub use config::{ChunkingConfig, RagConfig, RetryPolicy, SceneLayout};
pub use embeddings::{Embedder, HashEmbedder, HttpEmbedder, ImageDescriber, RetryingEmbedder};
pub use errors::{RagError, Result};
pub use ingest::{ImageRecord, IngestMode, IngestionPipeline, TextDocument};
pub use retrieval::{ItemKind, RetrievalService, RetrievedItem};
pub use store::{Entry, EntryId, EntryKind, EntryStore, ImageMapping, ProcessedSet};
pub use vector::{FlatIndex, Neighbor};
