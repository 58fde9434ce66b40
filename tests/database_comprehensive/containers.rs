//! Container surface: lists, sets, hashes, sorted sets, streams, geo,
//! time series

use crate::doc;
use monarchdb::{Database, ErrorKind, GeoRadiusOptions, Value};
use std::collections::{BTreeMap, HashSet};

#[test]
fn test_sorted_set_ranking_scenario() {
    let db = Database::in_memory();
    db.zadd(
        "z",
        vec![("a".into(), 1.0), ("b".into(), 2.0), ("c".into(), 3.0)],
    )
    .unwrap();

    let all = db.zrange("z", 0, -1).unwrap();
    assert_eq!(
        all,
        vec![
            ("a".to_string(), 1.0),
            ("b".to_string(), 2.0),
            ("c".to_string(), 3.0)
        ]
    );

    assert_eq!(db.zincrby("z", 5.0, "a").unwrap(), 6.0);

    let top = db.zrange("z", -1, -1).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].0, "a");
}

#[test]
fn test_list_negative_index_boundary() {
    let db = Database::in_memory();
    db.rpush(
        "l",
        (1..=5).map(Value::Int).collect(),
    )
    .unwrap();
    // The boundary case from the interface contract: the last two
    // elements, in order
    assert_eq!(
        db.lrange("l", -2, -1).unwrap(),
        vec![Value::Int(4), Value::Int(5)]
    );
}

#[test]
fn test_list_ops_and_trim_delete() {
    let db = Database::in_memory();
    db.rpush("l", (0..10).map(Value::Int).collect()).unwrap();
    db.ltrim("l", 2, 4).unwrap();
    assert_eq!(
        db.lrange("l", 0, -1).unwrap(),
        vec![Value::Int(2), Value::Int(3), Value::Int(4)]
    );
    // Inverted range empties and deletes the key
    db.ltrim("l", 5, 2).unwrap();
    assert!(!db.exists("l"));
}

#[test]
fn test_mixed_kinds_on_one_key_fail() {
    let db = Database::in_memory();
    db.rpush("k", vec![Value::Int(1)]).unwrap();
    let err = db.sadd("k", vec![Value::Int(1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = db.zadd("k", vec![("m".into(), 1.0)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_stream_ids_unique_under_load() {
    let db = Database::in_memory();
    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let id = db.xadd("s", "*", doc("{}")).unwrap();
        assert!(seen.insert(id), "duplicate stream id {id}");
    }
    assert_eq!(db.xlen("s").unwrap(), 10_000);
    // Entries enumerate in non-decreasing id order
    let entries = db.xrange("s", "-", "+").unwrap();
    assert!(entries.windows(2).all(|w| w[0].0 <= w[1].0));
}

#[test]
fn test_stream_trim() {
    let db = Database::in_memory();
    for ms in 1..=5 {
        db.xadd("s", &format!("{ms}-0"), doc(r#"{"n": 1}"#)).unwrap();
    }
    assert_eq!(db.xtrim_maxlen("s", 3).unwrap(), 2);
    assert_eq!(db.xlen("s").unwrap(), 3);
    let entries = db.xrange("s", "-", "+").unwrap();
    assert_eq!(entries[0].0.ms, 3);
}

#[test]
fn test_hash_and_set_round_trip() {
    let db = Database::in_memory();
    db.hset("h", doc(r#"{"name": "ada", "age": 36}"#)).unwrap();
    assert_eq!(db.hget("h", "name").unwrap(), Some(Value::Str("ada".into())));
    assert_eq!(db.hgetall("h").unwrap().len(), 2);

    db.sadd("s", vec![Value::Int(1), Value::Int(2), Value::Int(1)]).unwrap();
    assert_eq!(db.smembers("s").unwrap().len(), 2);
    assert!(db.sismember("s", &Value::Int(2)).unwrap());
    db.srem("s", vec![Value::Int(1), Value::Int(2)]).unwrap();
    // Emptied sets vanish from the key space
    assert!(!db.exists("s"));
}

#[test]
fn test_geo_radius() {
    let db = Database::in_memory();
    db.geoadd(
        "cities",
        vec![
            ("paris".into(), 2.3522, 48.8566),
            ("london".into(), -0.1276, 51.5072),
            ("tokyo".into(), 139.6917, 35.6895),
        ],
    )
    .unwrap();

    let near = db
        .georadius(
            "cities",
            2.0,
            48.0,
            500.0,
            GeoRadiusOptions {
                with_distances: true,
                ..GeoRadiusOptions::default()
            },
        )
        .unwrap();
    let members: Vec<&str> = near.iter().map(|h| h.member.as_str()).collect();
    assert_eq!(members, vec!["paris", "london"]);
    assert!(near[0].distance_km.unwrap() < near[1].distance_km.unwrap());

    let d = db.geodist("cities", "paris", "london").unwrap().unwrap();
    assert!((d - 344.0).abs() < 5.0);
}

#[test]
fn test_time_series_range_and_avg() {
    let db = Database::in_memory();
    for (t, v) in [(100, 1.0), (300, 3.0), (200, 2.0)] {
        db.tsadd("temps", t, v, BTreeMap::new()).unwrap();
    }
    let window = db.tsrange("temps", 100, 200).unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window[0].timestamp, 100);
    assert_eq!(window[1].timestamp, 200);
    assert_eq!(db.tsavg("temps", None, None).unwrap(), Some(2.0));
    assert_eq!(db.tsavg("temps", Some(150), None).unwrap(), Some(2.5));
}
