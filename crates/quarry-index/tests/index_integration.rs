#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the quarry-index crate.
//!
//! Covers the save/initialize round trip, repeated saves, continued
//! insertion after reload, and trait-object usage.

use quarry_index::{FileVectorIndex, HnswParams, SearchHit, VectorIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const DIM: usize = 24;

fn vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn open(path: std::path::PathBuf, params: HnswParams) -> FileVectorIndex {
    FileVectorIndex::new(path, DIM, params).unwrap()
}

async fn populated(path: std::path::PathBuf, data: &[Vec<f32>]) -> FileVectorIndex {
    let mut index = open(path, HnswParams::default());
    index.initialize(data.len()).await.unwrap();
    for (i, v) in data.iter().enumerate() {
        index.add_vector(i as i64, v).unwrap();
    }
    index
}

fn ids(hits: &[SearchHit]) -> Vec<i64> {
    hits.iter().map(|h| h.id).collect()
}

// ---------------------------------------------------------------------------
// 1. Save then re-initialize restores count and search behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_and_reload_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("vectors.idx");
    let data = vectors(200, 1);
    let query = vectors(1, 99).remove(0);

    // A candidate list as large as the index makes both searches exact, so
    // the rebuilt graph must return the same neighbours.
    let exhaustive = HnswParams {
        ef_search: data.len(),
        ..HnswParams::default()
    };
    let mut index = open(path.clone(), exhaustive);
    index.initialize(data.len()).await.unwrap();
    for (i, v) in data.iter().enumerate() {
        index.add_vector(i as i64, v).unwrap();
    }
    let before = index.search(&query, 10).unwrap();
    index.save().await.unwrap();

    let mut reloaded = open(path, exhaustive);
    reloaded.initialize(1).await.unwrap();

    assert_eq!(reloaded.count(), index.count());
    let after = reloaded.search(&query, 10).unwrap();
    assert_eq!(ids(&before), ids(&after));
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a.distance - b.distance).abs() < 1e-6);
    }
}

// ---------------------------------------------------------------------------
// 2. Re-initializing the same instance reloads the saved state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reinitialize_same_instance_discards_unsaved_vectors() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("vectors.idx");
    let data = vectors(10, 2);

    let mut index = populated(path, &data).await;
    index.save().await.unwrap();
    index.add_vector(1000, &data[0]).unwrap();
    assert_eq!(index.count(), 11);

    index.initialize(10).await.unwrap();
    assert_eq!(index.count(), 10);
}

// ---------------------------------------------------------------------------
// 3. Each save fully overwrites the previous one
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_saves_overwrite() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("vectors.idx");
    let data = vectors(30, 3);

    let mut index = populated(path.clone(), &data[..10]).await;
    index.save().await.unwrap();
    for (i, v) in data.iter().enumerate().skip(10) {
        index.add_vector(i as i64, v).unwrap();
    }
    index.save().await.unwrap();
    index.save().await.unwrap();

    let mut reloaded = open(path, HnswParams::default());
    reloaded.initialize(1).await.unwrap();
    assert_eq!(reloaded.count(), 30);

    let hit = reloaded.search(&data[25], 1).unwrap();
    assert_eq!(hit[0].id, 25);
}

// ---------------------------------------------------------------------------
// 4. A reloaded index keeps accepting vectors past its saved capacity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_after_reload() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("vectors.idx");
    let data = vectors(40, 4);

    let index = populated(path.clone(), &data[..20]).await;
    index.save().await.unwrap();

    let mut reloaded = open(path, HnswParams::default());
    reloaded.initialize(20).await.unwrap();
    for (i, v) in data.iter().enumerate().skip(20) {
        reloaded.add_vector(i as i64, v).unwrap();
    }
    assert_eq!(reloaded.count(), 40);

    for probe in [0usize, 19, 20, 39] {
        let hit = reloaded.search(&data[probe], 1).unwrap();
        assert_eq!(hit[0].id, probe as i64);
        assert!(hit[0].distance < 1e-5);
    }
}

// ---------------------------------------------------------------------------
// 5. Usable behind a trait object
// ---------------------------------------------------------------------------

#[tokio::test]
async fn boxed_trait_object() {
    let tmp = TempDir::new().unwrap();
    let mut index: Box<dyn VectorIndex> = Box::new(
        FileVectorIndex::new(tmp.path().join("vectors.idx"), 3, HnswParams::default()).unwrap(),
    );

    index.initialize(4).await.unwrap();
    index.add_vector(1, &[1.0, 0.0, 0.0]).unwrap();
    index.add_vector(2, &[0.0, 1.0, 0.0]).unwrap();
    index.add_vector(3, &[0.7, 0.7, 0.0]).unwrap();

    let hits = index.search(&[1.0, 0.1, 0.0], 2).unwrap();
    assert_eq!(ids(&hits), vec![1, 3]);
    index.save().await.unwrap();
}
