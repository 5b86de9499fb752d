//! End-to-end tests driving the history tree through the public facade.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracegraph::prelude::*;

fn config(block_size: usize, max_children: usize) -> TreeConfig {
    TreeConfig {
        block_size,
        max_children,
        provider_version: 1,
        tree_start: 0,
    }
}

#[test]
fn wakeup_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ht");
    let tree = GraphTree::new(&path, config(4096, 10), Arc::new(NodeCache::default())).unwrap();

    // Worker 1 runs, wakes worker 2 up, keeps running.
    tree.insert(EdgeInterval::horizontal_edge(
        Vertex::new(0, 1),
        Vertex::new(100, 1),
        1,
        None,
    ))
    .unwrap();
    tree.insert(EdgeInterval::horizontal_edge(
        Vertex::new(100, 1),
        Vertex::new(250, 1),
        1,
        None,
    ))
    .unwrap();
    tree.insert(EdgeInterval::vertical_edge(
        Vertex::new(100, 1),
        Vertex::new(110, 2),
        2,
        Some("wakeup".to_string()),
    ))
    .unwrap();
    tree.close_tree(300).unwrap();

    // The vertical edge arrives at worker 2's vertex at t=110.
    let arriving = tree
        .query_edge_to(Vertex::new(110, 2), false)
        .unwrap()
        .expect("vertical edge should be found");
    assert_eq!(arriving.kind(), EdgeKind::Vertical);
    assert_eq!(arriving.from_vertex(), Vertex::new(100, 1));
    assert_eq!(arriving.to_vertex(), Vertex::new(110, 2));

    // The first horizontal edge leaves worker 1's vertex at t=0.
    let leaving = tree
        .query_edge_from(Vertex::new(0, 1), true)
        .unwrap()
        .expect("horizontal edge should be found");
    assert_eq!(leaving.kind(), EdgeKind::Horizontal);
    assert_eq!(leaving.to_vertex(), Vertex::new(100, 1));

    // Both directions resolve into domain edges.
    let factory = RawStateFactory;
    let edge = arriving.edge(&factory).unwrap();
    assert_eq!(*edge.state(), 2);
    assert_eq!(edge.qualifier(), Some("wakeup"));
    assert_eq!(edge.duration(), 10);
}

#[test]
fn query_from_matches_exact_vertex_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ht");
    let tree = GraphTree::new(&path, config(4096, 10), Arc::new(NodeCache::default())).unwrap();

    tree.insert(EdgeInterval::horizontal_edge(
        Vertex::new(10, 3),
        Vertex::new(20, 3),
        1,
        None,
    ))
    .unwrap();

    assert!(tree
        .query_edge_from(Vertex::new(10, 3), true)
        .unwrap()
        .is_some());
    assert!(tree
        .query_edge_from(Vertex::new(11, 3), true)
        .unwrap()
        .is_none());
    assert!(tree
        .query_edge_from(Vertex::new(10, 4), true)
        .unwrap()
        .is_none());
}

#[test]
fn tree_end_is_monotonic_and_node_count_grows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ht");
    let tree = GraphTree::new(&path, config(256, 3), Arc::new(NodeCache::default())).unwrap();

    let mut last_end = tree.tree_end();
    let mut last_count = tree.node_count();
    for i in 0..500i64 {
        tree.insert(EdgeInterval::null_edge(
            Vertex::new(i, 0),
            Vertex::new(i + 5, 0),
        ))
        .unwrap();
        assert!(tree.tree_end() >= last_end);
        assert!(tree.node_count() >= last_count);
        last_end = tree.tree_end();
        last_count = tree.node_count();
    }
    assert!(tree.node_count() > 1);
}

#[test]
fn split_strictly_increases_node_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ht");
    let tree = GraphTree::new(&path, config(256, 3), Arc::new(NodeCache::default())).unwrap();

    // A 21-byte null record fits ten times into a 256-byte leaf block, so
    // the eleventh insert is the first split.
    for i in 0..10i64 {
        tree.insert(EdgeInterval::null_edge(
            Vertex::new(i * 10, 0),
            Vertex::new(i * 10 + 10, 0),
        ))
        .unwrap();
        assert_eq!(tree.node_count(), 1);
    }

    let before = tree.node_count();
    tree.insert(EdgeInterval::null_edge(
        Vertex::new(100, 0),
        Vertex::new(110, 0),
    ))
    .unwrap();
    assert!(tree.node_count() > before);
    assert!(tree.depth() > 1);
}

#[test]
fn randomized_inserts_never_hit_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ht");
    let tree = GraphTree::new(&path, config(512, 4), Arc::new(NodeCache::default())).unwrap();

    // Roughly chronological starts with jitter, like a real producer.
    let mut rng = StdRng::seed_from_u64(0x9e37);
    let mut clock = 0i64;
    for _ in 0..2_000 {
        clock += rng.gen_range(0..20);
        let start = (clock - rng.gen_range(0..200)).max(0);
        let end = clock + rng.gen_range(1..50);
        let worker = rng.gen_range(0..16);
        let interval = match rng.gen_range(0..4) {
            0 => EdgeInterval::null_edge(Vertex::new(start, worker), Vertex::new(end, worker)),
            1 => EdgeInterval::horizontal_edge(
                Vertex::new(start, worker),
                Vertex::new(end, worker),
                rng.gen_range(0..8),
                None,
            ),
            2 => EdgeInterval::vertical_edge(
                Vertex::new(start, worker),
                Vertex::new(end, rng.gen_range(0..16)),
                rng.gen_range(0..8),
                None,
            ),
            _ => EdgeInterval::filler_edge(Vertex::new(end, worker), start),
        };
        tree.insert(interval).unwrap();
    }
    tree.close_tree(tree.tree_end()).unwrap();
}

#[test]
fn reopened_tree_reproduces_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ht");
    let cache = Arc::new(NodeCache::default());

    let mut expected = Vec::new();
    let (node_count, file_size) = {
        let tree = GraphTree::new(&path, config(256, 3), Arc::clone(&cache)).unwrap();
        for i in 0..300i64 {
            let worker = (i % 7) as i32;
            tree.insert(EdgeInterval::horizontal_edge(
                Vertex::new(i * 10, worker),
                Vertex::new(i * 10 + 10, worker),
                (i % 3) as i32,
                None,
            ))
            .unwrap();
            expected.push(Vertex::new(i * 10, worker));
        }
        tree.close_tree(3000).unwrap();
        tree.close_file().unwrap();
        (tree.node_count(), tree.file_size())
    };

    let reopened = GraphTree::open(&path, 1, cache).unwrap();
    assert_eq!(reopened.tree_start(), 0);
    assert_eq!(reopened.tree_end(), 3000);
    assert_eq!(reopened.node_count(), node_count);
    assert_eq!(reopened.file_size(), file_size);
    for v in expected {
        let found = reopened.query_edge_from(v, true).unwrap();
        assert_eq!(found.map(|i| i.from_vertex()), Some(v));
    }
}

#[test]
fn reopen_with_wrong_provider_version_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ht");
    let cache = Arc::new(NodeCache::default());
    {
        let tree = GraphTree::new(&path, config(4096, 10), Arc::clone(&cache)).unwrap();
        tree.close_tree(0).unwrap();
        tree.close_file().unwrap();
    }
    assert!(matches!(
        GraphTree::open(&path, 7, cache),
        Err(TreeError::ProviderVersionMismatch {
            found: 1,
            expected: 7
        })
    ));
}

#[test]
fn delete_removes_backing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ht");
    let tree = GraphTree::new(&path, config(4096, 10), Arc::new(NodeCache::default())).unwrap();
    tree.insert(EdgeInterval::null_edge(Vertex::new(0, 1), Vertex::new(5, 1)))
        .unwrap();
    assert!(path.exists());
    tree.delete_file().unwrap();
    assert!(!path.exists());
}
