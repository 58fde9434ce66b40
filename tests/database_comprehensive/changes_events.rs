//! Change-stream delivery and ordering

use crate::doc;
use monarchdb::{ChangeType, Database, SubscriptionFilter, Value};
use std::sync::Arc;

#[test]
fn test_insert_update_remove_event_ordering_scenario() {
    let db = Database::in_memory();
    let sub = db.subscribe(SubscriptionFilter::all().collection("users"));

    db.insert("users", doc(r#"{"_id": "a"}"#)).unwrap();
    db.update("users", &doc(r#"{"_id": "a"}"#), &doc(r#"{"$set": {"x": 1}}"#)).unwrap();
    db.remove("users", &doc(r#"{"_id": "a"}"#)).unwrap();

    let events = sub.drain();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].change_type, ChangeType::Insert);
    assert_eq!(events[1].change_type, ChangeType::Update);
    assert_eq!(events[2].change_type, ChangeType::Remove);

    // The update carries the original record as its pre-image
    let old = events[1].old_document.as_ref().unwrap();
    assert_eq!(old.id(), Some("a"));
    assert!(old.get("x").is_none());
    assert_eq!(
        events[1].document.as_ref().unwrap().get("x"),
        Some(&Value::Int(1))
    );

    // Timestamps never go backwards
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_filtered_subscription_sees_only_its_collection() {
    let db = Database::in_memory();
    let users_only = db.subscribe(SubscriptionFilter::all().collection("users"));
    db.insert("orders", doc(r#"{"_id": "o"}"#)).unwrap();
    db.insert("users", doc(r#"{"_id": "u"}"#)).unwrap();
    let events = users_only.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].collection, "users");
}

#[test]
fn test_type_filtered_subscription() {
    let db = Database::in_memory();
    let removals =
        db.subscribe(SubscriptionFilter::all().change_types(vec![ChangeType::Remove]));
    db.insert("c", doc(r#"{"_id": "a"}"#)).unwrap();
    db.remove("c", &doc(r#"{"_id": "a"}"#)).unwrap();
    let events = removals.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].change_type, ChangeType::Remove);
}

#[test]
fn test_predicate_subscription() {
    let db = Database::in_memory();
    let important = db.subscribe(SubscriptionFilter::all().predicate(Arc::new(|event| {
        event
            .document
            .as_ref()
            .and_then(|d| d.get("priority"))
            .and_then(Value::as_i64)
            .map_or(false, |p| p >= 5)
    })));
    db.insert("tasks", doc(r#"{"_id": "low", "priority": 1}"#)).unwrap();
    db.insert("tasks", doc(r#"{"_id": "high", "priority": 9}"#)).unwrap();
    let events = important.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].document.as_ref().unwrap().id(), Some("high"));
}

#[test]
fn test_events_follow_apply_order_across_collections() {
    let db = Database::in_memory();
    let sub = db.subscribe(SubscriptionFilter::all());
    for i in 0..20 {
        let name = if i % 2 == 0 { "even" } else { "odd" };
        db.insert(name, doc(&format!(r#"{{"_id": "r{i}", "seq": {i}}}"#))).unwrap();
    }
    let events = sub.drain();
    assert_eq!(events.len(), 20);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(
            event.document.as_ref().unwrap().get("seq"),
            Some(&Value::Int(i as i64))
        );
    }
}
