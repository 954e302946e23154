// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Flat index: dimension invariant, search ordering, logical deletion

use rand::Rng;
use scenerag::errors::RagError;
use scenerag::vector::FlatIndex;

fn random_vector(rng: &mut impl Rng, dimension: usize) -> Vec<f32> {
    (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn populated(count: usize, dimension: usize) -> (FlatIndex, Vec<Vec<f32>>) {
    let mut rng = rand::thread_rng();
    let mut index = FlatIndex::new(dimension).unwrap();
    let vectors: Vec<Vec<f32>> = (0..count).map(|_| random_vector(&mut rng, dimension)).collect();
    let ids: Vec<String> = (0..count).map(|i| format!("doc{}", i)).collect();
    index.add(&vectors, &ids).unwrap();
    (index, vectors)
}

#[test]
fn test_wrong_length_never_changes_count() {
    let (mut index, _) = populated(20, 16);
    let mut rng = rand::thread_rng();

    for bad_len in [0, 1, 15, 17, 32] {
        let batch = vec![random_vector(&mut rng, 16), random_vector(&mut rng, bad_len)];
        let ids = vec!["new-a".to_string(), "new-b".to_string()];
        let result = index.add(&batch, &ids);

        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch { expected: 16, actual }) if actual == bad_len
        ));
        assert_eq!(index.count(), 20);
        assert_eq!(index.total_vectors(), 20);
        assert!(index.position_of("new-a").is_none());
    }
}

#[test]
fn test_stored_vector_is_its_own_nearest_neighbour() {
    let (index, vectors) = populated(50, 32);

    for (i, vector) in vectors.iter().enumerate() {
        let hits = index.search(vector, 3).unwrap();
        assert_eq!(index.id_at(hits[0].position), Some(format!("doc{}", i).as_str()));
        assert!(hits[0].distance <= f32::EPSILON);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}

#[test]
fn test_search_returns_at_most_live_count() {
    let (mut index, vectors) = populated(5, 8);
    assert_eq!(index.search(&vectors[0], 100).unwrap().len(), 5);

    index.remove_by_position(&[1, 3, 99]);
    let hits = index.search(&vectors[0], 100).unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.position != 1 && h.position != 3));
}

#[test]
fn test_positions_not_reused_after_delete() {
    let (mut index, _) = populated(3, 4);
    index.remove_ids(&["doc2"]);
    assert_eq!(index.count(), 2);

    let positions = index
        .add(&[vec![0.0; 4]], &["doc3".to_string()])
        .unwrap();
    assert_eq!(positions, vec![3]);
    assert_eq!(index.next_idx(), 4);
    assert_eq!(index.total_vectors(), 4);
}

#[test]
fn test_equal_distances_ordered_by_position() {
    let mut index = FlatIndex::new(2).unwrap();
    let ids: Vec<String> = ["first", "second", "third"].iter().map(|s| s.to_string()).collect();
    index
        .add(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]], &ids)
        .unwrap();

    let hits = index.search(&[0.0, 0.0], 3).unwrap();
    let order: Vec<&str> = hits.iter().filter_map(|h| index.id_at(h.position)).collect();
    assert_eq!(order, vec!["first", "second", "third"]);
}
