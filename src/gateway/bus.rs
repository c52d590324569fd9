use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::gateway::events::ServerEvent;

/// Who a published event is meant for. Connections filter locally; the bus
/// itself delivers everything to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    Room(Uuid),
    GlobalChat,
    Connection(String),
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub event: ServerEvent,
}

/// One process-wide broadcast channel fanning state changes out to every
/// live connection.
pub struct EventBus {
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(256);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.sender.subscribe()
    }

    /// Send errors mean no subscriber is listening right now, which is a
    /// normal state for an idle server.
    pub fn publish(&self, audience: Audience, event: ServerEvent) {
        let _ = self.sender.send(Arc::new(Envelope { audience, event }));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_envelopes() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(
            Audience::All,
            ServerEvent::Error {
                message: "x".to_string(),
            },
        );

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.audience, Audience::All);
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.publish(
            Audience::GlobalChat,
            ServerEvent::Error {
                message: "x".to_string(),
            },
        );
    }
}
