//! Change-stream bus
//!
//! Subscribers register a filter and receive events over a bounded
//! queue. Delivery is same-process and best-effort: `publish` never
//! blocks the mutator. A subscriber whose queue is full is dropped and a
//! diagnostic event is delivered to the survivors; a subscriber whose
//! receiver was dropped is pruned silently.

use monarch_core::{now_millis, Document};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default per-subscriber queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// A record was inserted
    Insert,
    /// A record was replaced or modified
    Update,
    /// A record was removed
    Remove,
    /// A bus diagnostic (e.g. a subscriber was dropped on overflow)
    Diagnostic,
}

impl ChangeType {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Insert => "insert",
            ChangeType::Update => "update",
            ChangeType::Remove => "remove",
            ChangeType::Diagnostic => "diagnostic",
        }
    }
}

/// One change notification
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// What happened
    pub change_type: ChangeType,
    /// Collection (or pseudo-collection) the change belongs to
    pub collection: String,
    /// New state of the record, absent for removals
    pub document: Option<Document>,
    /// Previous state of the record, absent for inserts
    pub old_document: Option<Document>,
    /// Milliseconds since epoch at publish time
    pub timestamp: i64,
}

impl ChangeEvent {
    /// Build an event stamped with the current time
    pub fn new(
        change_type: ChangeType,
        collection: impl Into<String>,
        document: Option<Document>,
        old_document: Option<Document>,
    ) -> Self {
        Self {
            change_type,
            collection: collection.into(),
            document,
            old_document,
            timestamp: now_millis(),
        }
    }
}

/// Predicate applied to events before delivery
pub type EventPredicate = Arc<dyn Fn(&ChangeEvent) -> bool + Send + Sync>;

/// What a subscriber wants to see
#[derive(Clone, Default)]
pub struct SubscriptionFilter {
    /// Only this collection; `None` means all
    pub collection: Option<String>,
    /// Only these change types; `None` means all
    pub change_types: Option<Vec<ChangeType>>,
    /// Arbitrary predicate over the event
    pub predicate: Option<EventPredicate>,
}

impl SubscriptionFilter {
    /// Accept everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one collection
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Restrict to the given change types
    pub fn change_types(mut self, types: Vec<ChangeType>) -> Self {
        self.change_types = Some(types);
        self
    }

    /// Attach a predicate
    pub fn predicate(mut self, pred: EventPredicate) -> Self {
        self.predicate = Some(pred);
        self
    }

    fn accepts(&self, event: &ChangeEvent) -> bool {
        if let Some(collection) = &self.collection {
            if collection != &event.collection {
                return false;
            }
        }
        if let Some(types) = &self.change_types {
            if !types.contains(&event.change_type) {
                return false;
            }
        }
        if let Some(pred) = &self.predicate {
            if !pred(event) {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for SubscriptionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionFilter")
            .field("collection", &self.collection)
            .field("change_types", &self.change_types)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    /// Subscriber id, unique per bus
    pub id: u64,
    receiver: Receiver<ChangeEvent>,
}

impl Subscription {
    /// Non-blocking receive
    pub fn try_recv(&self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Blocking receive with a deadline
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Drain everything currently queued
    pub fn drain(&self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

struct SubscriberEntry {
    id: u64,
    filter: SubscriptionFilter,
    sender: SyncSender<ChangeEvent>,
}

/// Publish-subscribe bus for change events
pub struct ChangeBus {
    subscribers: Mutex<Vec<SubscriberEntry>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ChangeBus {
    /// Create a bus with the given per-subscriber queue capacity
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a subscriber
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let (sender, receiver) = sync_channel(self.queue_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(SubscriberEntry {
            id,
            filter,
            sender,
        });
        Subscription { id, receiver }
    }

    /// Remove a subscriber by id
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    /// Drop every subscriber scoped to `collection`
    pub fn drop_collection_subscribers(&self, collection: &str) {
        self.subscribers
            .lock()
            .retain(|s| s.filter.collection.as_deref() != Some(collection));
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `event` to every matching subscriber
    ///
    /// Events arrive in publish order. Queue overflow drops the slow
    /// subscriber; the mutator is never blocked.
    pub fn publish(&self, event: &ChangeEvent) {
        let mut overflowed = Vec::new();
        {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|entry| {
                if !entry.filter.accepts(event) {
                    return true;
                }
                match entry.sender.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            subscriber = entry.id,
                            collection = event.collection.as_str(),
                            "change-stream queue overflow, dropping subscriber"
                        );
                        overflowed.push(entry.id);
                        false
                    }
                    Err(TrySendError::Disconnected(_)) => false,
                }
            });
        }
        for id in overflowed {
            let mut diagnostic = Document::new();
            diagnostic.set("reason", "subscriber_overflow");
            diagnostic.set("subscriber", id as i64);
            self.publish(&ChangeEvent::new(
                ChangeType::Diagnostic,
                event.collection.clone(),
                Some(diagnostic),
                None,
            ));
        }
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscribers", &self.subscriber_count())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_event(collection: &str) -> ChangeEvent {
        ChangeEvent::new(ChangeType::Insert, collection, Some(Document::new()), None)
    }

    #[test]
    fn test_subscriber_receives_matching_events() {
        let bus = ChangeBus::default();
        let sub = bus.subscribe(SubscriptionFilter::all());
        bus.publish(&insert_event("users"));
        let event = sub.try_recv().unwrap();
        assert_eq!(event.change_type, ChangeType::Insert);
        assert_eq!(event.collection, "users");
    }

    #[test]
    fn test_collection_filter() {
        let bus = ChangeBus::default();
        let sub = bus.subscribe(SubscriptionFilter::all().collection("users"));
        bus.publish(&insert_event("orders"));
        bus.publish(&insert_event("users"));
        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].collection, "users");
    }

    #[test]
    fn test_change_type_filter() {
        let bus = ChangeBus::default();
        let sub =
            bus.subscribe(SubscriptionFilter::all().change_types(vec![ChangeType::Remove]));
        bus.publish(&insert_event("users"));
        bus.publish(&ChangeEvent::new(
            ChangeType::Remove,
            "users",
            None,
            Some(Document::new()),
        ));
        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].change_type, ChangeType::Remove);
    }

    #[test]
    fn test_predicate_filter() {
        let bus = ChangeBus::default();
        let sub = bus.subscribe(SubscriptionFilter::all().predicate(Arc::new(|e| {
            e.document
                .as_ref()
                .map_or(false, |d| d.contains("important"))
        })));
        bus.publish(&insert_event("users"));
        let mut important = Document::new();
        important.set("important", true);
        bus.publish(&ChangeEvent::new(
            ChangeType::Insert,
            "users",
            Some(important),
            None,
        ));
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn test_events_arrive_in_publish_order() {
        let bus = ChangeBus::default();
        let sub = bus.subscribe(SubscriptionFilter::all());
        for i in 0..10 {
            let mut d = Document::new();
            d.set("n", i as i64);
            bus.publish(&ChangeEvent::new(ChangeType::Insert, "c", Some(d), None));
        }
        let events = sub.drain();
        assert_eq!(events.len(), 10);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(
                event.document.as_ref().unwrap().get("n"),
                Some(&monarch_core::Value::Int(i as i64))
            );
        }
    }

    #[test]
    fn test_overflow_drops_subscriber() {
        let bus = ChangeBus::new(2);
        let slow = bus.subscribe(SubscriptionFilter::all());
        let healthy = bus.subscribe(SubscriptionFilter::all());
        // Fill the slow subscriber's queue without draining
        bus.publish(&insert_event("c"));
        bus.publish(&insert_event("c"));
        // Overflow: slow is dropped, healthy survives but also overflows...
        // so drain healthy first to keep it alive.
        healthy.drain();
        bus.publish(&insert_event("c"));
        assert_eq!(bus.subscriber_count(), 1);
        // The survivor got a diagnostic about the drop
        let events = healthy.drain();
        assert!(events
            .iter()
            .any(|e| e.change_type == ChangeType::Diagnostic));
        // The dropped subscriber still sees its queued events, nothing more
        assert_eq!(slow.drain().len(), 2);
    }

    #[test]
    fn test_disconnected_receiver_is_pruned() {
        let bus = ChangeBus::default();
        let sub = bus.subscribe(SubscriptionFilter::all());
        drop(sub);
        bus.publish(&insert_event("c"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = ChangeBus::default();
        let sub = bus.subscribe(SubscriptionFilter::all());
        bus.unsubscribe(sub.id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_collection_subscribers() {
        let bus = ChangeBus::default();
        let _users = bus.subscribe(SubscriptionFilter::all().collection("users"));
        let _all = bus.subscribe(SubscriptionFilter::all());
        bus.drop_collection_subscribers("users");
        assert_eq!(bus.subscriber_count(), 1);
    }
}
