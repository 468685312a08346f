//! Packet-to-event relay.
//!
//! Sits between a [`Session`] and display surfaces: classifies each decoded
//! message, enriches gifts from the catalog, archives revenue events and
//! hands every event to the registered domain handler.

use crate::catalog::GiftCatalog;
use crate::classifier::classify;
use crate::event::{DomainEvent, ViewerCount, ViewerCountSource};
use crate::sink::EventSink;
use livedm_client::{HandlerError, HandlerSlot, Session, Subscription};
use livedm_protocol::{DecodedPacket, Operation};
use std::sync::Arc;

struct RelayInner {
    room_id: u64,
    catalog: GiftCatalog,
    sink: Option<Arc<dyn EventSink>>,
    handler: HandlerSlot<DomainEvent>,
}

/// Turns decoded packets into domain events.
#[derive(Clone)]
pub struct EventRelay {
    inner: Arc<RelayInner>,
}

impl EventRelay {
    pub fn new(room_id: u64) -> Self {
        Self::with_parts(room_id, GiftCatalog::new(), None)
    }

    pub fn with_parts(
        room_id: u64,
        catalog: GiftCatalog,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                room_id,
                catalog,
                sink,
                handler: HandlerSlot::new(),
            }),
        }
    }

    pub fn room_id(&self) -> u64 {
        self.inner.room_id
    }

    /// Registers the single domain event handler, replacing any previous one.
    pub fn on_event<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DomainEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.handler.register(handler)
    }

    /// Installs the relay as the session's packet handler.
    ///
    /// The relay stops receiving packets when the returned token drops.
    pub fn attach(&self, session: &Session) -> Subscription {
        let inner = self.inner.clone();
        session.on_message(move |packet| {
            inner.process(packet);
            Ok(())
        })
    }

    /// Processes one packet and returns the number of events it produced.
    pub fn process(&self, packet: &DecodedPacket) -> usize {
        self.inner.process(packet)
    }
}

impl RelayInner {
    fn process(&self, packet: &DecodedPacket) -> usize {
        if packet.op() == Some(Operation::HeartbeatReply) {
            let Some(count) = packet.heartbeat_count() else {
                return 0;
            };
            self.emit(DomainEvent::ViewerCount(ViewerCount {
                count,
                source: ViewerCountSource::Heartbeat,
            }));
            return 1;
        }

        let mut emitted = 0;
        for message in &packet.messages {
            if let Some(event) = classify(message) {
                self.emit(event);
                emitted += 1;
            }
        }
        emitted
    }

    fn emit(&self, mut event: DomainEvent) {
        self.catalog.enrich(&mut event);

        if event.is_persistable() {
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.append(self.room_id, &event) {
                    tracing::warn!("Failed to archive {} event: {}", event.kind(), e);
                }
            }
        }

        self.handler.dispatch(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GiftInfo;
    use crate::error::CoreError;
    use crate::sink::MemorySink;
    use parking_lot::Mutex;
    use serde_json::json;

    fn packet(operation: Operation, messages: Vec<serde_json::Value>) -> DecodedPacket {
        DecodedPacket {
            operation: operation.code(),
            protocol_version: 0,
            sequence: 0,
            messages,
        }
    }

    fn collect(relay: &EventRelay) -> (Subscription, Arc<Mutex<Vec<DomainEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let sub = relay.on_event(move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });
        (sub, events)
    }

    fn gift_message(gift_id: u64) -> serde_json::Value {
        json!({
            "cmd": "SEND_GIFT",
            "data": {"uid": 42, "uname": "alice", "giftId": gift_id, "num": 2, "coin_type": "gold"}
        })
    }

    #[test]
    fn test_heartbeat_reply_becomes_viewer_count() {
        let relay = EventRelay::new(1);
        let (_sub, events) = collect(&relay);

        let emitted = relay.process(&packet(Operation::HeartbeatReply, vec![json!({"count": 42})]));
        assert_eq!(emitted, 1);
        assert_eq!(
            events.lock().as_slice(),
            &[DomainEvent::ViewerCount(ViewerCount {
                count: 42,
                source: ViewerCountSource::Heartbeat
            })]
        );
    }

    #[test]
    fn test_messages_classified_in_order() {
        let relay = EventRelay::new(1);
        let (_sub, events) = collect(&relay);

        let emitted = relay.process(&packet(
            Operation::MessageReply,
            vec![
                json!({"cmd": "ONLINE_RANK_COUNT", "data": {"count": 1}}),
                json!({"cmd": "NOTICE_MSG"}),
                json!({"cmd": "WATCHED_CHANGE", "data": {"num": 2}}),
            ],
        ));
        assert_eq!(emitted, 2);

        let counts: Vec<_> = events
            .lock()
            .iter()
            .map(|e| match e {
                DomainEvent::ViewerCount(v) => v.count,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[test]
    fn test_gifts_enriched_and_archived() {
        let mut catalog = GiftCatalog::new();
        catalog.insert(
            31036,
            GiftInfo {
                name: "Flower".into(),
                price: 100,
                icon: Some("https://example.invalid/flower.png".into()),
            },
        );
        let sink = Arc::new(MemorySink::new());
        let archive: Arc<dyn EventSink> = sink.clone();
        let relay = EventRelay::with_parts(7, catalog, Some(archive));
        let (_sub, events) = collect(&relay);

        relay.process(&packet(
            Operation::MessageReply,
            vec![
                gift_message(31036),
                json!({"cmd": "WATCHED_CHANGE", "data": {"num": 2}}),
            ],
        ));

        let archived = sink.entries();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].room_id, 7);
        let DomainEvent::Gift(gift) = &archived[0].event else {
            panic!("expected gift");
        };
        assert_eq!(gift.gift_name, "Flower");
        assert_eq!(gift.value(), 200);

        assert_eq!(events.lock().len(), 2);
        assert_eq!(events.lock()[0], archived[0].event);
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn append(&self, _room_id: u64, _event: &DomainEvent) -> Result<(), CoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
    }

    #[test]
    fn test_sink_failure_still_dispatches() {
        let relay = EventRelay::with_parts(7, GiftCatalog::new(), Some(Arc::new(FailingSink)));
        let (_sub, events) = collect(&relay);

        relay.process(&packet(Operation::MessageReply, vec![gift_message(1)]));
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribed_handler_not_called() {
        let relay = EventRelay::new(1);
        let (sub, events) = collect(&relay);
        sub.unsubscribe();

        let emitted = relay.process(&packet(
            Operation::MessageReply,
            vec![json!({"cmd": "ONLINE_RANK_COUNT", "data": {"count": 1}})],
        ));
        assert_eq!(emitted, 1);
        assert!(events.lock().is_empty());
    }
}
