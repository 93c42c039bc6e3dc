//! Broadcast Event Bus
//!
//! `EventSink` over a tokio broadcast channel. Observers subscribe for the
//! decision trail; sends to a bus without subscribers are dropped quietly.

use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::repositories::event_sink::{EngineEvent, EventSink};

pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(256)
    }
}

impl EventSink for EventBus {
    fn broadcast(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            trace!("Dropped engine event: no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.broadcast(EngineEvent::ExecutionSkipped {
            user: "alice".to_string(),
            symbol: "BTCUSDT".to_string(),
            reason: "Auto-trade disabled".to_string(),
        });

        match rx.recv().await.unwrap() {
            EngineEvent::ExecutionSkipped { reason, .. } => {
                assert_eq!(reason, "Auto-trade disabled");
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        // No receiver; must not panic or error.
        bus.broadcast(EngineEvent::RiskAlert {
            user: "alice".to_string(),
            symbol: "BTCUSDT".to_string(),
            reason: "Daily loss limit exceeded".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
