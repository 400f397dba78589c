//! Shared fixtures for service tests: an in-memory database seeded with a
//! few users and channels, plus a live registry so broadcasts can be
//! observed through fake connections.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use uuid::Uuid;

use bugle_db::Database;
use bugle_gateway::registry::OutboundFrame;
use bugle_gateway::{BroadcastDispatcher, ConnectionRegistry};
use bugle_types::models::{ChannelKind, Role};

use crate::config::ChatConfig;
use crate::messages::MessageService;
use crate::pins::PinService;
use crate::reactions::ReactionAggregator;

pub struct Fixture {
    pub db: Arc<Database>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: BroadcastDispatcher,
    pub admin: Uuid,
    pub alice: Uuid,
    pub bob: Uuid,
    /// Registered user with no membership anywhere.
    pub carol: Uuid,
    /// General channel with members admin, alice, bob.
    pub channel: Uuid,
    /// Second channel with member alice only.
    pub other_channel: Uuid,
}

pub fn fixture() -> Fixture {
    let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
    let registry = Arc::new(ConnectionRegistry::new());
    let dispatcher = BroadcastDispatcher::new(registry.clone());

    let admin = Uuid::new_v4();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let carol = Uuid::new_v4();
    db.create_user(&admin.to_string(), "diana", Role::Admin.as_str()).expect("seed admin");
    db.create_user(&alice.to_string(), "alice", Role::Member.as_str()).expect("seed alice");
    db.create_user(&bob.to_string(), "bob", Role::Member.as_str()).expect("seed bob");
    db.create_user(&carol.to_string(), "carol", Role::Member.as_str()).expect("seed carol");

    let channel = Uuid::new_v4();
    db.create_channel(&channel.to_string(), "triage", ChannelKind::General.as_str())
        .expect("seed channel");
    for user in [admin, alice, bob] {
        db.add_member(&channel.to_string(), &user.to_string()).expect("seed membership");
    }

    let other_channel = Uuid::new_v4();
    db.create_channel(&other_channel.to_string(), "release", ChannelKind::General.as_str())
        .expect("seed other channel");
    db.add_member(&other_channel.to_string(), &alice.to_string())
        .expect("seed other membership");

    Fixture {
        db,
        registry,
        dispatcher,
        admin,
        alice,
        bob,
        carol,
        channel,
        other_channel,
    }
}

impl Fixture {
    pub fn messages(&self) -> MessageService {
        MessageService::new(self.db.clone(), self.dispatcher.clone(), ChatConfig::default())
    }

    pub fn reactions(&self) -> ReactionAggregator {
        ReactionAggregator::new(self.db.clone(), self.dispatcher.clone())
    }

    pub fn pins(&self) -> PinService {
        PinService::new(self.db.clone(), self.dispatcher.clone())
    }

    /// Attach a fake live connection subscribed to `channel` and hand back
    /// its receiving end.
    pub fn listen(&self, channel: Uuid) -> UnboundedReceiver<OutboundFrame> {
        let conn = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.register(conn, Uuid::new_v4(), tx);
        self.registry.subscribe(conn, channel);
        rx
    }

    /// Insert a message row directly, bypassing the service pipeline.
    pub fn post(&self, author: Uuid, body: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.db
            .insert_message(
                &id.to_string(),
                &self.channel.to_string(),
                &author.to_string(),
                body,
                None,
            )
            .expect("insert message");
        id
    }
}
