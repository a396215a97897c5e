//! Concurrent id assignment and insertion through the facade.

use nendb::{Database, NendbConfig};
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn concurrent_lockfree_inserts_yield_dense_unique_ids() {
    let threads = 8usize;
    let per_thread = 10_000usize;

    let dir = tempfile::tempdir().unwrap();
    let mut config = NendbConfig::defaults();
    config.pools.nodes = (threads * per_thread) as u32;
    config.pools.edges = 1;
    config.pools.embeddings = 1;
    // The point here is id assignment under contention, not durability.
    config.enable_wal = false;

    let db = Database::open_with_config(dir.path(), config).unwrap();

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                let mut ids = Vec::with_capacity(per_thread);
                for _ in 0..per_thread {
                    ids.push(db.insert_node_lockfree(1).unwrap());
                }
                ids
            })
        })
        .collect();

    let mut all = HashSet::with_capacity(threads * per_thread);
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(all.insert(id), "id {id} returned twice");
        }
    }

    let expected: HashSet<u64> = (1..=(threads * per_thread) as u64).collect();
    assert_eq!(all, expected, "ids must be exactly 1..=N");
    assert_eq!(db.get_stats().unwrap().nodes, (threads * per_thread) as u64);
}

#[test]
fn readers_run_against_a_writing_thread() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NendbConfig::defaults();
    config.pools.nodes = 20_000;
    config.enable_wal = false;

    let db = Database::open_with_config(dir.path(), config).unwrap();

    let writer = {
        let db = Arc::clone(&db);
        std::thread::spawn(move || {
            for _ in 0..10_000 {
                db.insert_node_lockfree(3).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                let mut last = 0u64;
                for _ in 0..2_000 {
                    let stats = db.get_stats().unwrap();
                    // Counts only move forward under pure inserts.
                    assert!(stats.nodes >= last);
                    last = stats.nodes;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(db.get_stats().unwrap().nodes, 10_000);

    let metrics = db.get_stats().unwrap().lock_metrics;
    assert!(metrics.write_acquisitions >= 10_000);
}

#[test]
fn id_generator_resumes_past_replayed_ids() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = Database::open_with_config(dir.path(), NendbConfig::for_testing()).unwrap();
        for _ in 0..5 {
            db.insert_node_lockfree(1).unwrap();
        }
        db.close().unwrap();
    }

    let db = Database::open_with_config(dir.path(), NendbConfig::for_testing()).unwrap();
    let next = db.insert_node_lockfree(1).unwrap();
    assert_eq!(next, 6, "fresh ids must not collide with replayed ones");
}
