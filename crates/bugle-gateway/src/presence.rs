use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::registry::ConnectionRegistry;

/// Derives who is online in a channel from live registry state. This is a
/// query, not cached state, so it is always consistent with the registry at
/// call time.
#[derive(Clone)]
pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceTracker {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deduplicated, sorted user ids holding at least one live connection
    /// subscribed to the channel. Sorted so presence payloads are stable.
    pub fn online_users(&self, channel_id: Uuid) -> Vec<Uuid> {
        let users: BTreeSet<Uuid> = self.registry.owners_for(channel_id).into_iter().collect();
        users.into_iter().collect()
    }
}
