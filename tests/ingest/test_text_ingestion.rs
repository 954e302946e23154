// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Text ingestion: idempotency, rebuild stability, partial failure

use super::support::{hash_pipeline, open_scene, pipeline_with, PoisonedEmbedder};
use scenerag::collection::SceneCollection;
use scenerag::config::{ChunkingConfig, SceneLayout};
use scenerag::embeddings::HashEmbedder;
use scenerag::ingest::{IngestMode, IngestionPipeline, TextDocument};
use scenerag::store::{EntryKind, EntryId};
use scenerag::utils::content_hash;
use std::sync::Arc;
use tempfile::TempDir;

fn handbook() -> Vec<TextDocument> {
    vec![
        TextDocument::new(
            "email.md",
            "Campus email setup\n\nLog in to the IT portal with your student id. \
             Choose a password and confirm it.\n\nMail is available on phones too.",
        ),
        TextDocument::new(
            "library.md",
            "The library opens at 8am. Borrowing limits depend on your year.",
        ),
        TextDocument::new("wellbeing.txt", "心理咨询中心提供免费的咨询服务。请提前预约。"),
    ]
}

#[tokio::test]
async fn test_incremental_twice_same_count() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    let pipeline = hash_pipeline(collection.clone());

    let first = pipeline.ingest_text(handbook(), IngestMode::Incremental).await.unwrap();
    let count = collection.read().await.count();
    let vectors = collection.read().await.index().total_vectors();

    let second = pipeline.ingest_text(handbook(), IngestMode::Incremental).await.unwrap();
    assert_eq!(first, 3);
    assert_eq!(second, 0);
    assert_eq!(collection.read().await.count(), count);
    // Nothing was re-embedded
    assert_eq!(collection.read().await.index().total_vectors(), vectors);
}

#[tokio::test]
async fn test_full_mode_reingest_keeps_count() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    let pipeline = hash_pipeline(collection.clone());

    pipeline.ingest_text(handbook(), IngestMode::Full).await.unwrap();
    let count = collection.read().await.count();
    assert_eq!(pipeline.ingest_text(handbook(), IngestMode::Full).await.unwrap(), 3);
    assert_eq!(collection.read().await.count(), count);
}

#[tokio::test]
async fn test_rebuild_reproduces_entry_ids() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    let pipeline = hash_pipeline(collection.clone());

    pipeline.rebuild_scene(handbook(), Vec::new()).await.unwrap();
    let first_ids = collection.read().await.entries().ids();

    let mut reversed = handbook();
    reversed.reverse();
    pipeline.rebuild_scene(reversed, Vec::new()).await.unwrap();
    let second_ids = collection.read().await.entries().ids();

    assert_eq!(first_ids, second_ids);
    assert_eq!(collection.read().await.index().next_idx() as usize, first_ids.len());
}

#[tokio::test]
async fn test_rebuild_with_shared_paragraph_ignores_order() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    let chunking = ChunkingConfig {
        chunk_size: 10,
        chunk_overlap: 0,
    };
    let pipeline = IngestionPipeline::new(
        collection.clone(),
        Arc::new(HashEmbedder::new(super::support::DIM).unwrap()),
        &chunking,
    )
    .unwrap();
    let docs = || {
        vec![
            TextDocument::new(
                "a.md",
                "Shared paragraph about library hours.\n\nAlpha notes only.",
            ),
            TextDocument::new(
                "b.md",
                "Beta notes only.\n\nShared paragraph about library hours.",
            ),
        ]
    };

    pipeline.rebuild_scene(docs(), Vec::new()).await.unwrap();
    let first_ids = collection.read().await.entries().ids();
    assert_eq!(first_ids.len(), 3);

    let mut reversed = docs();
    reversed.reverse();
    pipeline.rebuild_scene(reversed, Vec::new()).await.unwrap();
    assert_eq!(collection.read().await.entries().ids(), first_ids);
    assert_eq!(collection.read().await.count(), 3);
}

#[tokio::test]
async fn test_entry_ids_and_metadata() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    let pipeline = hash_pipeline(collection.clone());
    let docs = handbook();
    let hash = content_hash(docs[1].text.as_bytes());

    pipeline.ingest_text(docs, IngestMode::Full).await.unwrap();

    let guard = collection.read().await;
    let id = EntryId::text("campus", &hash, 0).to_string();
    let entry = guard.entries().get(&id).unwrap();
    assert_eq!(
        entry.content,
        "The library opens at 8am. Borrowing limits depend on your year."
    );
    assert_eq!(
        entry.kind,
        EntryKind::Text {
            source_file: Some("library.md".to_string())
        }
    );
    assert_eq!(entry.metadata["scene"], "campus");
    assert!(guard.processed().contains_file(&hash));
}

#[tokio::test]
async fn test_one_failing_document_of_ten() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    let embedder = Arc::new(PoisonedEmbedder::new("CORRUPT"));
    let pipeline = pipeline_with(collection.clone(), embedder.clone());

    let docs: Vec<TextDocument> = (1..=10)
        .map(|i| {
            let text = if i == 5 {
                "CORRUPT bytes that the model refuses".to_string()
            } else {
                format!("Notice number {} about campus services.", i)
            };
            TextDocument::new(format!("notice-{:02}.txt", i), text)
        })
        .collect();

    let count = pipeline.ingest_text(docs, IngestMode::Incremental).await.unwrap();
    assert_eq!(count, 9);
    assert_eq!(embedder.calls(), 10);

    let guard = collection.read().await;
    assert_eq!(guard.count(), 9);
    // The failed document is not marked, so the next run retries it
    assert_eq!(guard.processed().file_count(), 9);
}

#[tokio::test]
async fn test_progress_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    hash_pipeline(collection.clone())
        .ingest_text(handbook(), IngestMode::Incremental)
        .await
        .unwrap();
    let count = collection.read().await.count();
    drop(collection);

    let layout = SceneLayout::new(dir.path(), "campus", "campus_docs").unwrap();
    let reopened = SceneCollection::open(layout, super::support::DIM, None)
        .unwrap()
        .into_shared();
    let added = hash_pipeline(reopened.clone())
        .ingest_text(handbook(), IngestMode::Incremental)
        .await
        .unwrap();
    assert_eq!(added, 0);
    assert_eq!(reopened.read().await.count(), count);
}

#[tokio::test]
async fn test_corrupt_metadata_allows_reingest() {
    let dir = TempDir::new().unwrap();
    let collection = open_scene(&dir, "campus");
    let docs = || handbook().into_iter().take(2).collect::<Vec<_>>();
    assert_eq!(
        hash_pipeline(collection.clone())
            .ingest_text(docs(), IngestMode::Incremental)
            .await
            .unwrap(),
        2
    );
    let metadata = collection.read().await.layout().metadata_file();
    drop(collection);
    std::fs::write(&metadata, "{ corrupt").unwrap();

    let reopened = open_scene(&dir, "campus");
    assert_eq!(reopened.read().await.processed().file_count(), 0);
    let added = hash_pipeline(reopened.clone())
        .ingest_text(docs(), IngestMode::Incremental)
        .await
        .unwrap();
    assert_eq!(added, 2);
    assert_eq!(reopened.read().await.count(), 2);
}
