pub mod dispatcher;
pub mod presence;
pub mod registry;

pub use dispatcher::BroadcastDispatcher;
pub use presence::PresenceTracker;
pub use registry::{ConnId, ConnectionRegistry};
