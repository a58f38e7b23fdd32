//! Per-topic publish/subscribe on top of the connection registry.

pub mod engine;
pub mod message;
pub mod topic;

pub use engine::ChannelBroker;
pub use message::{Event, EventKind};
pub use topic::{SessionId, Topic, TopicIndex, TopicKey, TopicKind};
