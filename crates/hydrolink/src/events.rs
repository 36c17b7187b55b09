//! The client event bus.

use tokio::sync::broadcast;

use hydrolink_protocol::ClientEvent;

/// Capacity of the broadcast channel. Slow subscribers that fall more
/// than this far behind skip events (and are told so by the receiver).
const BUS_CAPACITY: usize = 256;

/// Fan-out of [`ClientEvent`]s to any number of subscribers.
///
/// Cheap to clone; all clones publish into the same channel. Publishing
/// never blocks and never fails: with no subscribers the event is simply
/// dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// A new subscription. Events published before this call are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    /// Publishes a debug event and mirrors it to the log.
    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.publish(ClientEvent::Debug { message });
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
    async fn test_bus_fans_out_to_all_subscribers() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(ClientEvent::NodeConnect {
            node: "alpha".into(),
        });

        let expected = ClientEvent::NodeConnect {
            node: "alpha".into(),
        };
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_bus_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(ClientEvent::Debug {
            message: "nobody listens".into(),
        });

        // A later subscriber does not see the earlier event.
        let mut late = bus.subscribe();
        bus.publish(ClientEvent::Debug {
            message: "now they do".into(),
        });
        match late.recv().await.unwrap() {
            ClientEvent::Debug { message } => {
                assert_eq!(message, "now they do")
            }
            other => panic!("expected debug, got {other:?}"),
        }
    }
}
