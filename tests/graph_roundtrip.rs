//! Basic CRUD round-trips through the embedded facade.

use nendb::{Database, Error, NendbConfig};

fn open_test_db(dir: &std::path::Path) -> std::sync::Arc<Database> {
    Database::open_with_config(dir, NendbConfig::for_testing()).unwrap()
}

#[test]
fn basic_crud_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());

    db.add_node(1, 10, b"").unwrap();
    db.add_node(2, 20, b"").unwrap();
    db.add_edge(1, 2, 50, b"").unwrap();

    let stats = db.get_stats().unwrap();
    assert_eq!(stats.nodes, 2);
    assert_eq!(stats.edges, 1);

    let out = db.find_outgoing_edges(1).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to, 2);
    assert_eq!(out[0].label, 50);

    let incoming = db.find_incoming_edges(2).unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].from, 1);

    db.close().unwrap();
}

#[test]
fn duplicate_node_rejected_original_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());

    db.add_node(42, 1, b"").unwrap();
    let err = db.add_node(42, 2, b"").unwrap_err();
    assert!(matches!(err, Error::DuplicateNode(42)));
    assert_eq!(db.find_node(42).unwrap().unwrap().kind, 1);

    let stats = db.get_stats().unwrap();
    assert_eq!(stats.nodes, 1);
    assert!(stats
        .error_counts
        .iter()
        .any(|&(name, n)| name == "duplicate_node" && n == 1));
}

#[test]
fn delete_then_reinsert_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());

    db.add_node(7, 3, b"").unwrap();
    db.delete_node(7).unwrap();
    assert!(db.find_node(7).unwrap().is_none());
    db.add_node(7, 3, b"").unwrap();
    assert_eq!(db.find_node(7).unwrap().unwrap().kind, 3);
}

#[test]
fn filter_by_kind_tracks_deletions() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());

    for id in 1..=10u64 {
        db.add_node(id, if id % 2 == 0 { 4 } else { 9 }, b"").unwrap();
    }
    db.delete_node(4).unwrap();
    db.delete_node(9).unwrap();

    let mut even = db.find_nodes_by_kind(4).unwrap();
    even.sort_unstable();
    assert_eq!(even, vec![2, 6, 8, 10]);

    let mut odd = db.find_nodes_by_kind(9).unwrap();
    odd.sort_unstable();
    assert_eq!(odd, vec![1, 3, 5, 7]);
}

#[test]
fn self_loop_rejected_at_facade() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());
    db.add_node(1, 0, b"").unwrap();
    assert!(matches!(
        db.add_edge(1, 1, 5, b""),
        Err(Error::InvalidId(1))
    ));
}

#[test]
fn edge_to_missing_node_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());
    db.add_node(1, 0, b"").unwrap();
    assert!(matches!(
        db.add_edge(1, 99, 5, b""),
        Err(Error::NodeNotFound(99))
    ));
}

#[test]
fn deleting_node_cascades_to_edges() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());

    db.add_node(1, 0, b"").unwrap();
    db.add_node(2, 0, b"").unwrap();
    db.add_node(3, 0, b"").unwrap();
    db.add_edge(1, 2, 5, b"").unwrap();
    db.add_edge(2, 3, 5, b"").unwrap();

    db.delete_node(2).unwrap();
    let stats = db.get_stats().unwrap();
    assert_eq!(stats.nodes, 2);
    assert_eq!(stats.edges, 0, "both incident edges must be gone");
}

#[test]
fn closed_database_refuses_operations() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());
    db.add_node(1, 0, b"").unwrap();
    db.close().unwrap();

    assert!(matches!(db.add_node(2, 0, b""), Err(Error::Closed)));
    assert!(matches!(db.find_node(1), Err(Error::Closed)));
    // close is idempotent.
    db.close().unwrap();
}

#[test]
fn update_node_replaces_kind_and_props() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());

    db.add_node(1, 10, b"old").unwrap();
    db.update_node(1, 11, b"new").unwrap();
    let record = db.find_node(1).unwrap().unwrap();
    assert_eq!(record.kind, 11);
    assert_eq!(record.props.as_slice(), b"new");

    assert!(matches!(
        db.update_node(99, 1, b""),
        Err(Error::NodeNotFound(99))
    ));
}

#[test]
fn transaction_commit_and_abort() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_test_db(dir.path());

    let mut txn = db.begin_transaction(Default::default()).unwrap();
    db.txn_add_node(&mut txn, 1, 1, b"").unwrap();
    db.txn_add_node(&mut txn, 2, 1, b"").unwrap();
    db.txn_add_edge(&mut txn, 1, 2, 9, b"").unwrap();
    assert_eq!(db.txn_find_node(&txn, 1).unwrap().unwrap().kind, 1);
    db.commit(&mut txn).unwrap();
    assert_eq!(db.get_stats().unwrap().nodes, 2);

    let mut txn = db.begin_transaction(Default::default()).unwrap();
    db.txn_add_node(&mut txn, 3, 1, b"").unwrap();
    db.abort(&mut txn).unwrap();
    assert!(db.find_node(3).unwrap().is_none());
    assert_eq!(db.get_stats().unwrap().nodes, 2);

    // A resolved transaction takes no more operations.
    assert!(db.txn_add_node(&mut txn, 4, 1, b"").is_err());
}
