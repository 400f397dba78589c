use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Process-unique identifier assigned to a connection at accept time.
/// Registry maps are keyed by this id; the live transport sender is the
/// map value, never the key.
pub type ConnId = Uuid;

/// Serialized frame handed to a connection's writer task. Broadcasts share
/// one allocation across all receiving connections.
pub type OutboundFrame = std::sync::Arc<str>;

struct Peer {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

#[derive(Default)]
struct RegistryInner {
    /// channel -> connections subscribed to it
    channels: HashMap<Uuid, HashSet<ConnId>>,
    /// connection -> channels it subscribed to
    subscriptions: HashMap<ConnId, HashSet<Uuid>>,
    /// connection -> owning user + transport sender
    peers: HashMap<ConnId, Peer>,
}

/// In-memory bookkeeping of live connections. Constructed once per server
/// instance and shared by reference; rebuilt from zero on restart, which is
/// fine because messages are durably stored before broadcast.
///
/// All operations are synchronous map work under a short-lived lock, never
/// held across an await.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted connection and its owning user.
    pub fn register(&self, conn: ConnId, user_id: Uuid, tx: mpsc::UnboundedSender<OutboundFrame>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.peers.insert(conn, Peer { user_id, tx });
        inner.subscriptions.entry(conn).or_default();
    }

    /// Add a connection to a channel's set. Idempotent; returns false for a
    /// connection that was never registered.
    pub fn subscribe(&self, conn: ConnId, channel_id: Uuid) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.peers.contains_key(&conn) {
            return false;
        }
        inner.channels.entry(channel_id).or_default().insert(conn);
        inner.subscriptions.entry(conn).or_default().insert(channel_id);
        true
    }

    /// Remove a connection from every channel it subscribed to and forget
    /// its owner. Returns the channels it was removed from so the caller can
    /// announce the departure. Channel sets that drain are evicted entirely,
    /// keeping memory bounded by live subscriptions.
    pub fn unsubscribe_all(&self, conn: ConnId) -> Vec<Uuid> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let left: Vec<Uuid> = inner
            .subscriptions
            .remove(&conn)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for channel_id in &left {
            if let Some(set) = inner.channels.get_mut(channel_id) {
                set.remove(&conn);
                if set.is_empty() {
                    inner.channels.remove(channel_id);
                }
            }
        }
        inner.peers.remove(&conn);
        left
    }

    /// Live senders for a channel. An unknown channel is an empty result,
    /// not an error.
    pub fn connections_for(&self, channel_id: Uuid) -> Vec<(ConnId, mpsc::UnboundedSender<OutboundFrame>)> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let Some(conns) = inner.channels.get(&channel_id) else {
            return Vec::new();
        };
        conns
            .iter()
            .filter_map(|conn| inner.peers.get(conn).map(|p| (*conn, p.tx.clone())))
            .collect()
    }

    /// Owning users of a channel's live connections, one entry per
    /// connection (dedup is the presence layer's job).
    pub fn owners_for(&self, channel_id: Uuid) -> Vec<Uuid> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let Some(conns) = inner.channels.get(&channel_id) else {
            return Vec::new();
        };
        conns
            .iter()
            .filter_map(|conn| inner.peers.get(conn).map(|p| p.user_id))
            .collect()
    }

    /// Number of channels currently holding at least one connection.
    pub fn channel_count(&self) -> usize {
        self.inner.read().expect("registry lock poisoned").channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(registry: &ConnectionRegistry, user: Uuid) -> (ConnId, mpsc::UnboundedReceiver<OutboundFrame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(id, user, tx);
        (id, rx)
    }

    #[test]
    fn subscribe_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let (c, _rx) = conn(&registry, user);

        assert!(registry.subscribe(c, channel));
        assert!(registry.subscribe(c, channel));
        assert_eq!(registry.connections_for(channel).len(), 1);
    }

    #[test]
    fn unregistered_connection_cannot_subscribe() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.subscribe(Uuid::new_v4(), Uuid::new_v4()));
    }

    #[test]
    fn unsubscribe_all_reports_channels_and_evicts_empty_sets() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let ch_a = Uuid::new_v4();
        let ch_b = Uuid::new_v4();
        let (c, _rx) = conn(&registry, user);
        registry.subscribe(c, ch_a);
        registry.subscribe(c, ch_b);
        assert_eq!(registry.channel_count(), 2);

        let mut left = registry.unsubscribe_all(c);
        left.sort();
        let mut expected = vec![ch_a, ch_b];
        expected.sort();
        assert_eq!(left, expected);

        // Empty channel sets are gone, not lingering at zero.
        assert_eq!(registry.channel_count(), 0);
        assert!(registry.connections_for(ch_a).is_empty());
    }

    #[test]
    fn eviction_spares_channels_with_other_connections() {
        let registry = ConnectionRegistry::new();
        let channel = Uuid::new_v4();
        let (c1, _rx1) = conn(&registry, Uuid::new_v4());
        let (c2, _rx2) = conn(&registry, Uuid::new_v4());
        registry.subscribe(c1, channel);
        registry.subscribe(c2, channel);

        registry.unsubscribe_all(c1);
        assert_eq!(registry.connections_for(channel).len(), 1);
        assert_eq!(registry.channel_count(), 1);
    }

    #[test]
    fn unsubscribe_all_is_safe_on_unknown_connection() {
        let registry = ConnectionRegistry::new();
        assert!(registry.unsubscribe_all(Uuid::new_v4()).is_empty());
    }
}
