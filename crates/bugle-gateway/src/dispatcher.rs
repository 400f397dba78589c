use std::sync::Arc;

use tracing::{error, trace};
use uuid::Uuid;

use bugle_types::events::GatewayEvent;

use crate::registry::ConnectionRegistry;

/// Pushes events to every live connection subscribed to a channel.
///
/// Delivery is best-effort: a connection whose writer has gone away is
/// skipped silently, and the disconnect handler owns its eventual eviction
/// from the registry. The event is serialized exactly once; each connection
/// receives the same bytes.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn broadcast(&self, channel_id: Uuid, event: &GatewayEvent) {
        let frame: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Failed to serialize gateway event: {}", e);
                return;
            }
        };

        for (conn, tx) in self.registry.connections_for(channel_id) {
            if tx.send(frame.clone()).is_err() {
                trace!(%conn, "skipping closed connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use uuid::Uuid;

    use crate::registry::OutboundFrame;

    use super::*;

    fn live_conn(
        registry: &ConnectionRegistry,
        channel: Uuid,
    ) -> (Uuid, UnboundedReceiver<OutboundFrame>) {
        let conn = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(conn, Uuid::new_v4(), tx);
        registry.subscribe(conn, channel);
        (conn, rx)
    }

    fn user_left(channel_id: Uuid) -> GatewayEvent {
        GatewayEvent::UserLeft {
            channel_id,
            user_id: Uuid::new_v4(),
            user_name: "alice".into(),
            online_users: vec![],
        }
    }

    #[test]
    fn delivers_only_to_the_event_channel() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry.clone());
        let ch_a = Uuid::new_v4();
        let ch_b = Uuid::new_v4();
        let (_, mut rx_a) = live_conn(&registry, ch_a);
        let (_, mut rx_b) = live_conn(&registry, ch_b);

        dispatcher.broadcast(ch_a, &user_left(ch_a));

        let frame = rx_a.try_recv().unwrap();
        assert!(frame.contains("user_left"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn all_subscribers_get_the_same_bytes() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry.clone());
        let channel = Uuid::new_v4();
        let (_, mut rx1) = live_conn(&registry, channel);
        let (_, mut rx2) = live_conn(&registry, channel);

        dispatcher.broadcast(channel, &user_left(channel));

        let f1 = rx1.try_recv().unwrap();
        let f2 = rx2.try_recv().unwrap();
        assert_eq!(f1, f2);
        // One serialization shared across connections.
        assert!(Arc::ptr_eq(&f1, &f2));
    }

    #[test]
    fn dead_connection_is_skipped_without_error() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry.clone());
        let channel = Uuid::new_v4();
        let (_, rx_dead) = live_conn(&registry, channel);
        let (_, mut rx_live) = live_conn(&registry, channel);
        drop(rx_dead);

        dispatcher.broadcast(channel, &user_left(channel));
        assert!(rx_live.try_recv().unwrap().contains("user_left"));
    }

    #[test]
    fn broadcast_to_empty_channel_is_a_no_op() {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = BroadcastDispatcher::new(registry);
        let channel = Uuid::new_v4();
        dispatcher.broadcast(channel, &user_left(channel));
    }
}
