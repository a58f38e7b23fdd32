//! The `registry` module tracks live sessions and pushes events to them.
//!
//! It owns every [`Session`] and the topic index mapping topics to
//! sessions. Each session gets a writer task that drains its outbox into
//! its [`TransportSink`]; a failing or slow sink only ever tears down its
//! own session.

pub mod connections;
pub mod outbox;
pub mod session;

pub use connections::ConnectionRegistry;
pub use outbox::{Enqueued, Outbound, Outbox};
pub use session::{ChannelSink, Session, TransportSink};
