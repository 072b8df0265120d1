//! In-process broadcast hub.
//!
//! Backs each topic with a `tokio::sync::broadcast` channel. Subscribers
//! that fall behind lose the oldest events, matching the best-effort,
//! no-replay delivery contract of the external hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use ephemere_shared::RoomEvent;

const TOPIC_CAPACITY: usize = 256;

/// Cheap to clone; all clones share the same topic table.
#[derive(Clone, Default)]
pub struct LocalBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<RoomEvent>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a room's event stream. Events published before the
    /// subscription are not replayed.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<RoomEvent> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publish to the event's room topic. An event with no current
    /// subscribers is dropped, which is fine: there is no replay log.
    pub fn publish(&self, event: &RoomEvent) {
        let topic = format!(
            "{}{}",
            ephemere_shared::constants::TOPIC_PREFIX,
            event.room_hash
        );
        let sender = {
            let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
            topics.get(&topic).cloned()
        };
        if let Some(sender) = sender {
            // Err means zero receivers; nothing to do.
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a topic once its room is gone. Existing receivers observe a
    /// closed channel after draining.
    pub fn drop_topic(&self, topic: &str) {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.remove(topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemere_shared::EventBody;

    fn knock_event(room_hash: &str) -> RoomEvent {
        RoomEvent::new(room_hash.to_string(), None, 1, EventBody::Knock { message: None })
    }

    #[tokio::test]
    async fn subscribe_then_publish_delivers() {
        let bus = LocalBus::new();
        let mut rx = bus.subscribe("room:aaaa");

        bus.publish(&knock_event("aaaa"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.room_hash, "aaaa");
        assert_eq!(event.kind(), "knock");
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let bus = LocalBus::new();
        // Create the topic, then publish with nobody listening.
        let early = bus.subscribe("room:aaaa");
        drop(early);
        bus.publish(&knock_event("aaaa"));

        let mut rx = bus.subscribe("room:aaaa");
        bus.publish(&knock_event("aaaa"));
        // Only the event published after subscription arrives.
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = LocalBus::new();
        let mut rx_a = bus.subscribe("room:aaaa");
        let _rx_b = bus.subscribe("room:bbbb");

        bus.publish(&knock_event("bbbb"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn drop_topic_closes_existing_receivers() {
        let bus = LocalBus::new();
        let mut rx = bus.subscribe("room:aaaa");

        bus.publish(&knock_event("aaaa"));
        bus.drop_topic("room:aaaa");

        // Buffered events drain first, then the channel reports closed.
        assert!(rx.recv().await.is_ok());
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn all_subscribers_see_the_event() {
        let bus = LocalBus::new();
        let mut rx1 = bus.subscribe("room:aaaa");
        let mut rx2 = bus.subscribe("room:aaaa");

        bus.publish(&knock_event("aaaa"));
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }
}
