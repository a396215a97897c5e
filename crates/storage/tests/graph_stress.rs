//! Randomized interleaving of graph mutations against a reference model.

use nendb_storage::GraphStore;
use nendb_core::{EdgeProps, EdgeRecord, Error, NodeProps, NodeRecord, PoolCapacities};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

#[test]
fn random_mutations_match_reference_model() {
    let mut rng = StdRng::seed_from_u64(0x6E656E64);
    let caps = PoolCapacities {
        nodes: 64,
        edges: 128,
        embeddings: 16,
    };
    let mut g = GraphStore::new(caps, 4).unwrap();
    let mut live: BTreeSet<u64> = BTreeSet::new();

    for _ in 0..5000 {
        let id = rng.gen_range(1..=96u64);
        match rng.gen_range(0..3) {
            0 => {
                let rec = NodeRecord::new(id, (id % 5) as u8, NodeProps::empty()).unwrap();
                match g.add_node(rec) {
                    Ok(_) => {
                        assert!(live.insert(id), "store accepted a duplicate id {id}");
                    }
                    Err(Error::DuplicateNode(_)) => assert!(live.contains(&id)),
                    Err(Error::PoolExhausted { .. }) => assert_eq!(live.len(), 64),
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            1 => match g.delete_node(id) {
                Ok(_) => assert!(live.remove(&id)),
                Err(Error::NodeNotFound(_)) => assert!(!live.contains(&id)),
                Err(e) => panic!("unexpected error: {e}"),
            },
            _ => {
                let to = rng.gen_range(1..=96u64);
                let rec = EdgeRecord::new(id, to, 1, EdgeProps::empty()).unwrap();
                match g.add_edge(rec) {
                    Ok(_) => {
                        assert!(live.contains(&id) && live.contains(&to));
                    }
                    Err(Error::NodeNotFound(missing)) => {
                        assert!(!live.contains(&missing));
                    }
                    Err(Error::DuplicateEdge(_)) | Err(Error::PoolExhausted { .. }) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }
        assert_eq!(g.node_count() as usize, live.len());
    }

    // Every live edge still references two live nodes (cascade held).
    for id in 1..=96u64 {
        for e in g.edges_of(id, true) {
            assert!(live.contains(&e.from));
            assert!(live.contains(&e.to));
        }
    }
}
