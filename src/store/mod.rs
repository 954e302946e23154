// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod entry;
pub mod image_mapping;
pub mod processed;

pub use entry::{Entry, EntryId, EntryKind, EntryStore, MetadataHeader, StoredEntry};
pub use image_mapping::{ImageMapping, ImageMappingEntry};
pub use processed::ProcessedSet;
