//! Document surface: indexes, queries, aggregation

use crate::doc;
use monarchdb::{Database, ErrorKind, FindOptions, IndexOptions, Value};

#[test]
fn test_unique_index_violation_scenario() {
    let db = Database::in_memory();
    db.add_collection("users").unwrap();
    db.create_index(
        "users",
        vec!["email".into()],
        IndexOptions {
            unique: true,
            ..IndexOptions::default()
        },
    )
    .unwrap();

    db.insert("users", doc(r#"{"_id": "a", "email": "x@y"}"#)).unwrap();
    let err = db
        .insert("users", doc(r#"{"_id": "b", "email": "x@y"}"#))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(db.count("users", &doc("{}")), 1);
    assert!(db.health_check().healthy);
}

#[test]
fn test_empty_predicate_returns_all() {
    let db = Database::in_memory();
    for i in 0..10 {
        db.insert("docs", doc(&format!(r#"{{"_id": "d{i}", "n": {i}}}"#))).unwrap();
    }
    let all = db.find("docs", &doc("{}"), &FindOptions::default()).unwrap();
    assert_eq!(all.len(), 10);
}

#[test]
fn test_find_with_sort_limit_skip_and_projection() {
    let db = Database::in_memory();
    for (id, n) in [("a", 3), ("b", 1), ("c", 2), ("d", 5), ("e", 4)] {
        db.insert("docs", doc(&format!(r#"{{"_id": "{id}", "n": {n}, "x": "y"}}"#)))
            .unwrap();
    }
    let options = FindOptions {
        sort: Some(Value::from_json(serde_json::json!({"n": 1}))),
        skip: 1,
        limit: Some(2),
        projection: Some(doc(r#"{"n": 1}"#)),
    };
    let result = db.find("docs", &doc("{}"), &options).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result[0].get("n"), Some(&Value::Int(2)));
    assert_eq!(result[1].get("n"), Some(&Value::Int(3)));
    assert!(result[0].contains("_id"));
    assert!(!result[0].contains("x"));
}

#[test]
fn test_query_operators_through_facade() {
    let db = Database::in_memory();
    db.insert("people", doc(r#"{"_id": "a", "age": 31, "tags": ["x", "y"]}"#)).unwrap();
    db.insert("people", doc(r#"{"_id": "b", "age": 45}"#)).unwrap();

    let over40 = db
        .find("people", &doc(r#"{"age": {"$gte": 40}}"#), &FindOptions::default())
        .unwrap();
    assert_eq!(over40.len(), 1);
    assert_eq!(over40[0].id(), Some("b"));

    let tagged = db
        .find("people", &doc(r#"{"tags": {"$size": 2}}"#), &FindOptions::default())
        .unwrap();
    assert_eq!(tagged.len(), 1);

    let odd = db
        .find("people", &doc(r#"{"age": {"$mod": [2, 1]}}"#), &FindOptions::default())
        .unwrap();
    assert_eq!(odd.len(), 2);
}

#[test]
fn test_indexed_query_agrees_with_scan() {
    let db = Database::in_memory();
    for i in 0..200 {
        db.insert(
            "events",
            doc(&format!(
                r#"{{"_id": "e{i:03}", "kind": "k{}", "n": {i}}}"#,
                i % 5
            )),
        )
        .unwrap();
    }
    let query = doc(r#"{"kind": "k2"}"#);
    let before = db.find("events", &query, &FindOptions::default()).unwrap();
    db.create_index("events", vec!["kind".into()], IndexOptions::default()).unwrap();
    let after = db.find("events", &query, &FindOptions::default()).unwrap();
    assert_eq!(before, after);
    assert_eq!(after.len(), 40);
}

#[test]
fn test_aggregation_group_avg_sort_scenario() {
    let db = Database::in_memory();
    db.insert("emp", doc(r#"{"_id": "1", "dept": "E", "salary": 50}"#)).unwrap();
    db.insert("emp", doc(r#"{"_id": "2", "dept": "E", "salary": 70}"#)).unwrap();
    db.insert("emp", doc(r#"{"_id": "3", "dept": "S", "salary": 40}"#)).unwrap();

    let pipeline: Vec<Value> = vec![
        Value::from_json(serde_json::json!({"$match": {}})),
        Value::from_json(serde_json::json!({"$group": {"_id": "$dept", "avg": {"$avg": "$salary"}}})),
        Value::from_json(serde_json::json!({"$sort": {"avg": -1}})),
    ];
    let result = db.aggregate("emp", &pipeline).unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result[0].get("_id"), Some(&Value::Str("E".into())));
    assert_eq!(result[0].get("avg").unwrap().as_f64(), Some(60.0));
    assert_eq!(result[1].get("_id"), Some(&Value::Str("S".into())));
    assert_eq!(result[1].get("avg").unwrap().as_f64(), Some(40.0));
}

#[test]
fn test_update_operators_and_replacement() {
    let db = Database::in_memory();
    db.insert("users", doc(r#"{"_id": "u", "n": 1, "tags": []}"#)).unwrap();

    db.update(
        "users",
        &doc(r#"{"_id": "u"}"#),
        &doc(r#"{"$inc": {"n": 4}, "$push": {"tags": "t"}}"#),
    )
    .unwrap();
    let updated = db.find_one("users", &doc(r#"{"_id": "u"}"#)).unwrap().unwrap();
    assert_eq!(updated.get("n"), Some(&Value::Int(5)));

    db.update("users", &doc(r#"{"_id": "u"}"#), &doc(r#"{"fresh": true}"#)).unwrap();
    let replaced = db.find_one("users", &doc(r#"{"_id": "u"}"#)).unwrap().unwrap();
    assert_eq!(replaced.id(), Some("u"));
    assert!(replaced.get("n").is_none());
    assert_eq!(replaced.get("fresh"), Some(&Value::Bool(true)));
}

#[test]
fn test_text_search_ranks_by_relevance() {
    let db = Database::in_memory();
    db.create_index(
        "articles",
        vec!["body".into()],
        IndexOptions {
            text: true,
            ..IndexOptions::default()
        },
    )
    .unwrap();
    db.insert(
        "articles",
        doc(r#"{"_id": "a", "body": "database engines store database records"}"#),
    )
    .unwrap();
    db.insert("articles", doc(r#"{"_id": "b", "body": "database tuning notes"}"#)).unwrap();
    db.insert("articles", doc(r#"{"_id": "c", "body": "cooking with cast iron"}"#)).unwrap();

    let hits = db.search_text("articles", "database", 10).unwrap();
    assert_eq!(hits.len(), 2);
    // "a" mentions the term twice in a comparable length, so it ranks first
    assert_eq!(hits[0].0.id(), Some("a"));
    assert!(hits[0].1 >= hits[1].1);
}

#[test]
fn test_insert_then_remove_restores_serialized_state() {
    let db = Database::in_memory();
    db.insert("docs", doc(r#"{"_id": "keep", "n": 1}"#)).unwrap();
    let before: Vec<String> = db
        .find("docs", &doc("{}"), &FindOptions::default())
        .unwrap()
        .iter()
        .map(|d| d.to_canonical_json())
        .collect();

    db.insert("docs", doc(r#"{"_id": "temp", "n": 2}"#)).unwrap();
    db.remove("docs", &doc(r#"{"_id": "temp"}"#)).unwrap();

    let after: Vec<String> = db
        .find("docs", &doc("{}"), &FindOptions::default())
        .unwrap()
        .iter()
        .map(|d| d.to_canonical_json())
        .collect();
    assert_eq!(before, after);
}
