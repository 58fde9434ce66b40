//! Vector and graph surfaces

use crate::doc;
use monarchdb::{Database, Direction, TraverseOptions};

#[test]
fn test_vector_top_k_scenario() {
    let db = Database::in_memory();
    db.vadd("vecs", "v1", vec![1.0, 0.0, 0.0], None).unwrap();
    db.vadd("vecs", "v2", vec![0.0, 1.0, 0.0], None).unwrap();
    db.vadd("vecs", "v3", vec![0.9, 0.1, 0.0], None).unwrap();

    let hits = db.vsearch("vecs", &[1.0, 0.0, 0.0], 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "v1");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits[1].id, "v3");
    assert!(hits[0].score >= hits[1].score);
}

#[test]
fn test_vector_result_size_is_min_of_k_and_count() {
    let db = Database::in_memory();
    for i in 0..4 {
        db.vadd("vecs", &format!("v{i}"), vec![i as f32 + 1.0, 1.0], None).unwrap();
    }
    assert_eq!(db.vsearch("vecs", &[1.0, 1.0], 2).unwrap().len(), 2);
    assert_eq!(db.vsearch("vecs", &[1.0, 1.0], 99).unwrap().len(), 4);
}

#[test]
fn test_vector_dimension_mismatch() {
    let db = Database::in_memory();
    db.vadd("vecs", "v1", vec![1.0, 2.0], None).unwrap();
    assert!(db.vadd("vecs", "v2", vec![1.0, 2.0, 3.0], None).is_err());
}

#[test]
fn test_graph_delete_node_cascades() {
    let db = Database::in_memory();
    for id in ["a", "b", "c"] {
        db.graph_add_node("g", id, "node", doc("{}")).unwrap();
    }
    db.graph_add_edge("g", "ab", "a", "b", "next", doc("{}")).unwrap();
    db.graph_add_edge("g", "bc", "b", "c", "next", doc("{}")).unwrap();
    db.graph_add_edge("g", "ca", "c", "a", "next", doc("{}")).unwrap();

    db.graph_delete_node("g", "b").unwrap();

    // No edge still references the deleted node
    let remaining = db.graph_traverse("g", "c", &TraverseOptions::default()).unwrap();
    assert!(remaining.nodes.contains(&"a".to_string()));
    assert!(!remaining.nodes.contains(&"b".to_string()));
    let neighbors = db.graph_neighbors("g", "a", Direction::Both, None).unwrap();
    assert!(neighbors.iter().all(|(node, _)| node != "b"));
}

#[test]
fn test_graph_traverse_depth_and_type_filters() {
    let db = Database::in_memory();
    for id in ["a", "b", "c", "d"] {
        db.graph_add_node("g", id, "node", doc("{}")).unwrap();
    }
    db.graph_add_edge("g", "ab", "a", "b", "likes", doc("{}")).unwrap();
    db.graph_add_edge("g", "bc", "b", "c", "likes", doc("{}")).unwrap();
    db.graph_add_edge("g", "ad", "a", "d", "follows", doc("{}")).unwrap();

    let shallow = db
        .graph_traverse(
            "g",
            "a",
            &TraverseOptions {
                max_depth: Some(1),
                ..TraverseOptions::default()
            },
        )
        .unwrap();
    assert_eq!(shallow.nodes.len(), 3);

    let likes_only = db
        .graph_traverse(
            "g",
            "a",
            &TraverseOptions {
                edge_types: Some(vec!["likes".to_string()]),
                ..TraverseOptions::default()
            },
        )
        .unwrap();
    assert_eq!(likes_only.nodes, vec!["a", "b", "c"]);
}

#[test]
fn test_graph_shortest_path_weighted_and_unweighted() {
    let db = Database::in_memory();
    for id in ["a", "b", "c"] {
        db.graph_add_node("g", id, "node", doc("{}")).unwrap();
    }
    db.graph_add_edge("g", "ab", "a", "b", "road", doc(r#"{"km": 1}"#)).unwrap();
    db.graph_add_edge("g", "bc", "b", "c", "road", doc(r#"{"km": 1}"#)).unwrap();
    db.graph_add_edge("g", "ac", "a", "c", "road", doc(r#"{"km": 9}"#)).unwrap();

    let (hops_path, hops) = db.graph_shortest_path("g", "a", "c", None).unwrap().unwrap();
    assert_eq!(hops_path, vec!["a", "c"]);
    assert_eq!(hops, 1.0);

    let (weighted_path, cost) = db
        .graph_shortest_path("g", "a", "c", Some("km"))
        .unwrap()
        .unwrap();
    assert_eq!(weighted_path, vec!["a", "b", "c"]);
    assert_eq!(cost, 2.0);
}

#[test]
fn test_graph_centrality() {
    let db = Database::in_memory();
    for id in ["hub", "x", "y", "z"] {
        db.graph_add_node("g", id, "node", doc("{}")).unwrap();
    }
    for (i, spoke) in ["x", "y", "z"].iter().enumerate() {
        db.graph_add_edge("g", &format!("e{i}"), spoke, "hub", "t", doc("{}")).unwrap();
    }
    let scores = db.graph_centrality("g", 30, 0.85).unwrap();
    assert!(scores["hub"] > scores["x"]);
    let total: f64 = scores.values().sum();
    assert!((total - 1.0).abs() < 1e-6);
}

#[test]
fn test_vector_metadata_survives() {
    let db = Database::in_memory();
    db.vadd(
        "vecs",
        "v1",
        vec![1.0, 0.0],
        Some(doc(r#"{"label": "origin"}"#)),
    )
    .unwrap();
    let hits = db.vsearch("vecs", &[1.0, 0.0], 1).unwrap();
    assert_eq!(hits[0].id, "v1");
}
