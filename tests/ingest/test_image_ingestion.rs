// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Image description ingestion and the mapping table

use super::support::{hash_pipeline, open_scene};
use async_trait::async_trait;
use scenerag::embeddings::ImageDescriber;
use scenerag::errors::Result;
use scenerag::ingest::{ImageRecord, IngestMode, TextDocument};
use scenerag::store::{EntryId, EntryKind, ImageMapping};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn record(hash: &str, description: &str) -> ImageRecord {
    ImageRecord {
        image_hash: hash.to_string(),
        artifact_path: Some(PathBuf::from(format!("/data/images/{}.png", hash))),
        source_file: "counselling-guide.docx".to_string(),
        description: description.to_string(),
    }
}

struct StaticDescriber {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageDescriber for StaticDescriber {
    async fn describe(&self, _image: &[u8], context: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("flow chart for {}", context))
    }
}

#[tokio::test]
async fn test_full_mode_replaces_image_entries() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "psychology");
    let pipeline = hash_pipeline(collection.clone());

    pipeline
        .ingest_text(
            vec![TextDocument::new("guide.md", "Breathing helps with exam stress.")],
            IngestMode::Full,
        )
        .await
        .unwrap();
    let first = vec![record("aa", "breathing chart"), record("bb", "sleep chart")];
    assert_eq!(pipeline.ingest_images(first, IngestMode::Full).await.unwrap(), 2);

    let second = vec![record("cc", "appointment flow")];
    assert_eq!(pipeline.ingest_images(second, IngestMode::Full).await.unwrap(), 1);

    let guard = collection.read().await;
    // Text survives an image rebuild
    assert_eq!(guard.count(), 2);
    assert_eq!(guard.entries().ids_with_prefix("image_psychology_").len(), 1);
    assert_eq!(guard.image_mapping().len(), 1);
    assert!(guard.image_mapping().get("image_psychology_aa").is_none());
    assert!(!guard.processed().contains_image("aa"));
    assert!(guard.processed().contains_image("cc"));
}

#[tokio::test]
async fn test_incremental_merges_and_skips_processed() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "psychology");
    let pipeline = hash_pipeline(collection.clone());

    pipeline
        .ingest_images(vec![record("aa", "breathing chart")], IngestMode::Incremental)
        .await
        .unwrap();
    let added = pipeline
        .ingest_images(
            vec![record("aa", "breathing chart"), record("bb", "sleep chart")],
            IngestMode::Incremental,
        )
        .await
        .unwrap();

    assert_eq!(added, 1);
    let guard = collection.read().await;
    assert_eq!(guard.count(), 2);
    assert_eq!(guard.image_mapping().len(), 2);
}

#[tokio::test]
async fn test_image_entry_and_mapping_contents() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "psychology");
    let pipeline = hash_pipeline(collection.clone());
    pipeline
        .ingest_images(vec![record("aa", "breathing chart")], IngestMode::Full)
        .await
        .unwrap();

    let guard = collection.read().await;
    let id = EntryId::image("psychology", "aa").to_string();
    let entry = guard.entries().get(&id).unwrap();
    assert_eq!(entry.content, "image_psychology_aa: breathing chart");
    assert_eq!(
        entry.kind,
        EntryKind::Image {
            description: "breathing chart".to_string(),
            artifact_path: Some(PathBuf::from("/data/images/aa.png")),
        }
    );
    assert_eq!(entry.metadata["source_file"], "counselling-guide.docx");

    let on_disk = ImageMapping::load(&guard.layout().image_mapping_file());
    let mapped = on_disk.get(&id).unwrap();
    assert_eq!(mapped.image_path, "/data/images/aa.png");
    assert_eq!(mapped.image_filename, "aa.png");
    assert_eq!(mapped.enhanced_description, "breathing chart");
    assert_eq!(mapped.image_hash, "aa");
}

#[tokio::test]
async fn test_blank_description_skipped() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "psychology");
    let pipeline = hash_pipeline(collection.clone());

    let added = pipeline
        .ingest_images(vec![record("aa", "   ")], IngestMode::Incremental)
        .await
        .unwrap();
    assert_eq!(added, 0);
    assert!(collection.read().await.is_empty());
    assert!(!collection.read().await.processed().contains_image("aa"));
}

#[tokio::test]
async fn test_prepare_image_writes_artifact_once() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "psychology");
    let pipeline = hash_pipeline(collection.clone());
    let describer = StaticDescriber {
        calls: AtomicUsize::new(0),
    };
    let bytes = b"\x89PNG fake image payload";

    let prepared = pipeline
        .prepare_image(bytes, ".PNG", "guide.docx", "stress", &describer, IngestMode::Incremental)
        .await
        .unwrap()
        .unwrap();
    let path = prepared.artifact_path.clone().unwrap();
    assert!(path.exists());
    assert_eq!(path.extension().unwrap(), "png");
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
    assert_eq!(prepared.description, "flow chart for stress");

    pipeline
        .ingest_images(vec![prepared], IngestMode::Incremental)
        .await
        .unwrap();
    let again = pipeline
        .prepare_image(bytes, "png", "guide.docx", "stress", &describer, IngestMode::Incremental)
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(describer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_purged_images_can_be_ingested_again() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    let pipeline = hash_pipeline(collection.clone());
    pipeline
        .ingest_images(vec![record("aa", "campus map")], IngestMode::Incremental)
        .await
        .unwrap();

    let removed = collection
        .write()
        .await
        .delete_by_id_prefix(&EntryId::image_prefix("campus"))
        .unwrap();
    assert_eq!(removed, 1);
    assert!(!collection.read().await.processed().contains_image("aa"));

    let added = pipeline
        .ingest_images(vec![record("aa", "campus map")], IngestMode::Incremental)
        .await
        .unwrap();
    assert_eq!(added, 1);
    assert_eq!(collection.read().await.count(), 1);
}
