//! Durability: WAL replay, checkpoints, point-in-time recovery,
//! save/load round trips

use crate::doc;
use monarchdb::{
    Database, DatabaseConfig, DurabilityLevel, FindOptions, IndexOptions, MemoryAdapter, Value,
};
use tempfile::tempdir;

fn durable_config(dir: &std::path::Path) -> DatabaseConfig {
    DatabaseConfig::default()
        .with_data_dir(dir)
        .with_durability(DurabilityLevel::High)
}

#[test]
fn test_crash_recovery_scenario() {
    let dir = tempdir().unwrap();
    let config = durable_config(dir.path());
    {
        let db = Database::open(config.clone()).unwrap();
        db.create_index(
            "docs",
            vec!["serial".into()],
            IndexOptions {
                unique: true,
                ..IndexOptions::default()
            },
        )
        .unwrap();
        for i in 0..100 {
            db.insert("docs", doc(&format!(r#"{{"_id": "d{i:03}", "serial": {i}}}"#)))
                .unwrap();
        }
        db.checkpoint().unwrap();
        for i in 100..150 {
            db.insert("docs", doc(&format!(r#"{{"_id": "d{i:03}", "serial": {i}}}"#)))
                .unwrap();
        }
        // Simulated crash: dropped without close()
    }

    let db = Database::open(config).unwrap();
    assert_eq!(db.count("docs", &doc("{}")), 150);
    // Unique-index invariants hold after recovery
    assert!(db.health_check().healthy);
    let err = db
        .insert("docs", doc(r#"{"_id": "dup", "serial": 42}"#))
        .unwrap_err();
    assert_eq!(err.kind(), monarchdb::ErrorKind::Conflict);
}

#[test]
fn test_replay_reproduces_find_results() {
    let dir = tempdir().unwrap();
    let config = durable_config(dir.path());
    let query = doc(r#"{"kind": "keep"}"#);
    let original;
    {
        let db = Database::open(config.clone()).unwrap();
        for i in 0..30 {
            let kind = if i % 3 == 0 { "keep" } else { "skip" };
            db.insert(
                "mixed",
                doc(&format!(r#"{{"_id": "m{i:02}", "kind": "{kind}", "n": {i}}}"#)),
            )
            .unwrap();
        }
        db.update("mixed", &doc(r#"{"_id": "m03"}"#), &doc(r#"{"$set": {"n": 99}}"#)).unwrap();
        db.remove("mixed", &doc(r#"{"_id": "m06"}"#)).unwrap();
        original = db.find("mixed", &query, &FindOptions::default()).unwrap();
        db.close().unwrap();
    }
    let db = Database::open(config).unwrap();
    let replayed = db.find("mixed", &query, &FindOptions::default()).unwrap();
    assert_eq!(original, replayed);
}

#[test]
fn test_container_state_recovers() {
    let dir = tempdir().unwrap();
    let config = durable_config(dir.path());
    {
        let db = Database::open(config.clone()).unwrap();
        db.rpush("list", vec![Value::Int(1), Value::Int(2)]).unwrap();
        db.lpop("list").unwrap();
        db.zadd("board", vec![("ada".into(), 10.0), ("alan".into(), 8.0)]).unwrap();
        db.zincrby("board", 5.0, "alan").unwrap();
        db.xadd("events", "*", doc(r#"{"what": "boot"}"#)).unwrap();
        db.graph_add_node("net", "a", "host", doc("{}")).unwrap();
        db.graph_add_node("net", "b", "host", doc("{}")).unwrap();
        db.graph_add_edge("net", "ab", "a", "b", "link", doc("{}")).unwrap();
        db.close().unwrap();
    }
    let db = Database::open(config).unwrap();
    assert_eq!(db.lrange("list", 0, -1).unwrap(), vec![Value::Int(2)]);
    assert_eq!(db.zscore("board", "alan").unwrap(), Some(13.0));
    assert_eq!(db.zrange("board", 0, -1).unwrap()[0].0, "ada");
    assert_eq!(db.xlen("events").unwrap(), 1);
    let path = db.graph_shortest_path("net", "a", "b", None).unwrap().unwrap();
    assert_eq!(path.0, vec!["a", "b"]);
}

#[test]
fn test_checkpoint_retention() {
    let dir = tempdir().unwrap();
    let config = durable_config(dir.path()).with_max_checkpoints(3);
    let db = Database::open(config).unwrap();
    for i in 0..6 {
        db.insert("c", doc(&format!(r#"{{"_id": "r{i}"}}"#))).unwrap();
        db.checkpoint().unwrap();
    }
    assert_eq!(db.stats().checkpoints, 3);
}

#[test]
fn test_point_in_time_recovery() {
    let dir = tempdir().unwrap();
    let config = durable_config(dir.path());
    let db = Database::open(config).unwrap();
    for i in 0..5 {
        db.insert("log", doc(&format!(r#"{{"_id": "early{i}"}}"#))).unwrap();
    }
    db.flush().unwrap();
    let cut = now_plus(5);
    std::thread::sleep(std::time::Duration::from_millis(15));
    for i in 0..5 {
        db.insert("log", doc(&format!(r#"{{"_id": "late{i}"}}"#))).unwrap();
    }
    db.flush().unwrap();
    assert_eq!(db.count("log", &doc("{}")), 10);

    db.recover_to(cut).unwrap();
    assert_eq!(db.count("log", &doc("{}")), 5);
    assert!(db.find_one("log", &doc(r#"{"_id": "late0"}"#)).unwrap().is_none());
}

fn now_plus(ms: i64) -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
        + ms
}

#[test]
fn test_save_load_identity() {
    let adapter = MemoryAdapter::new();
    let db = Database::in_memory();
    for i in 0..25 {
        db.insert("docs", doc(&format!(r#"{{"_id": "d{i:02}", "n": {i}}}"#))).unwrap();
    }
    db.create_index("docs", vec!["n".into()], IndexOptions::default()).unwrap();
    db.zadd("z", vec![("m".into(), 1.0)]).unwrap();
    let before = db.find("docs", &doc("{}"), &FindOptions::default()).unwrap();
    db.save(&adapter).unwrap();

    let restored = Database::in_memory();
    restored.load(&adapter).unwrap();
    let after = restored.find("docs", &doc("{}"), &FindOptions::default()).unwrap();
    assert_eq!(before, after);
    assert_eq!(restored.list_indexes("docs").len(), 1);
    assert_eq!(restored.zscore("z", "m").unwrap(), Some(1.0));
    assert!(restored.health_check().healthy);
}

#[test]
fn test_corrupt_wal_line_is_skipped() {
    let dir = tempdir().unwrap();
    let config = durable_config(dir.path());
    {
        let db = Database::open(config.clone()).unwrap();
        db.insert("c", doc(r#"{"_id": "a"}"#)).unwrap();
        db.insert("c", doc(r#"{"_id": "b"}"#)).unwrap();
        db.close().unwrap();
    }
    // Tear the log: append garbage
    use std::io::Write;
    let mut wal = std::fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join("wal.log"))
        .unwrap();
    writeln!(wal, "{{ torn line").unwrap();
    drop(wal);

    let db = Database::open(config).unwrap();
    assert_eq!(db.count("c", &doc("{}")), 2);
}
