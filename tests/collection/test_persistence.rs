// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Checkpoint round-trips and self-healing on corrupt files

use rand::Rng;
use scenerag::collection::SceneCollection;
use scenerag::config::SceneLayout;
use scenerag::store::{Entry, EntryId, ImageMapping};
use scenerag::vector::FlatIndex;
use tempfile::TempDir;

const DIM: usize = 12;

fn layout(dir: &TempDir) -> SceneLayout {
    SceneLayout::new(dir.path(), "psychology", "psychology_docs").unwrap()
}

fn random_batch(count: usize) -> Vec<(Entry, Vec<f32>)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let id = EntryId::text("psychology", "c0ffee", i).to_string();
            let vector = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
            (Entry::text(id, format!("chunk {}", i), Some("notes.md".to_string())), vector)
        })
        .collect()
}

#[test]
fn test_index_round_trip_preserves_search() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat.index");
    let mut rng = rand::thread_rng();

    let mut index = FlatIndex::new(DIM).unwrap();
    let vectors: Vec<Vec<f32>> = (0..40)
        .map(|_| (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    let ids: Vec<String> = (0..40).map(|i| format!("id-{}", i)).collect();
    index.add(&vectors, &ids).unwrap();
    index.remove_ids(&["id-7", "id-8"]);
    index.persist(&path).unwrap();

    let loaded = FlatIndex::load(&path, DIM).unwrap();
    assert_eq!(loaded.count(), index.count());
    assert_eq!(loaded.next_idx(), index.next_idx());
    assert_eq!(loaded.id_to_position(), index.id_to_position());

    let query: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let before = index.search(&query, 10).unwrap();
    let after = loaded.search(&query, 10).unwrap();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.position, b.position);
        assert!((a.distance - b.distance).abs() < 1e-6);
    }
}

#[test]
fn test_collection_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut collection = SceneCollection::open(layout(&dir), DIM, Some("bge-m3")).unwrap();
    let batch = random_batch(6);
    let query = batch[2].1.clone();
    collection.upsert_entries(batch).unwrap();
    collection.processed_mut().mark_file("c0ffee");
    collection.persist().unwrap();

    let reopened = SceneCollection::open(layout(&dir), DIM, Some("bge-m3")).unwrap();
    assert_eq!(reopened.count(), 6);
    assert_eq!(reopened.entries().ids(), collection.entries().ids());
    assert_eq!(
        reopened.index().id_to_position(),
        collection.index().id_to_position()
    );
    assert!(reopened.processed().contains_file("c0ffee"));

    let hits = reopened.search(&query, 1).unwrap();
    assert_eq!(hits[0].1.content, "chunk 2");
    assert!(hits[0].0.distance <= f32::EPSILON);
}

#[test]
fn test_metadata_file_layout() {
    let dir = TempDir::new().unwrap();
    let mut collection = SceneCollection::open(layout(&dir), DIM, None).unwrap();
    collection.upsert_entries(random_batch(2)).unwrap();
    collection.persist().unwrap();

    let raw: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(collection.layout().metadata_file()).unwrap(),
    )
    .unwrap();
    let id = "text_psychology_c0ffee_chunk_1";
    assert_eq!(raw["metadata"][id]["content"], "chunk 1");
    assert_eq!(raw["metadata"][id]["type"], "text_chunk");
    assert_eq!(raw["metadata"][id]["source_file"], "notes.md");
    assert_eq!(raw["id_to_idx"][id], 1);
    assert_eq!(raw["next_idx"], 2);
    assert_eq!(raw["dimension"], DIM);
    assert_eq!(raw["collection_name"], "psychology_docs");
}

#[test]
fn test_corrupt_files_degrade_to_empty_collection() {
    let dir = TempDir::new().unwrap();
    let mut collection = SceneCollection::open(layout(&dir), DIM, None).unwrap();
    collection.upsert_entries(random_batch(3)).unwrap();
    collection.persist().unwrap();

    let layout = collection.layout().clone();
    std::fs::write(layout.index_file(), b"\x00\x01garbage").unwrap();
    std::fs::write(layout.metadata_file(), b"{ truncated").unwrap();
    std::fs::write(layout.image_mapping_file(), b"]]").unwrap();
    std::fs::write(layout.processed_file(), b"nope").unwrap();

    let reopened = SceneCollection::open(layout, DIM, None).unwrap();
    assert_eq!(reopened.count(), 0);
    assert!(reopened.entries().is_empty());
    assert!(reopened.image_mapping().is_empty());
    assert_eq!(reopened.processed().file_count(), 0);
}

#[test]
fn test_image_mapping_loads_without_index() {
    let dir = TempDir::new().unwrap();
    let mut collection = SceneCollection::open(layout(&dir), DIM, None).unwrap();
    collection.image_mapping_mut().insert(
        "image_psychology_ab",
        scenerag::store::ImageMappingEntry {
            image_path: "/imgs/ab.png".to_string(),
            image_filename: "ab.png".to_string(),
            source_file: "guide.docx".to_string(),
            enhanced_description: "breathing exercise chart".to_string(),
            image_hash: "ab".to_string(),
        },
    );
    collection.persist().unwrap();

    let mapping = ImageMapping::load(&collection.layout().image_mapping_file());
    assert_eq!(
        mapping.get("image_psychology_ab").unwrap().enhanced_description,
        "breathing exercise chart"
    );
}
