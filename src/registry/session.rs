//! Session representation
//!
//! A `Session` is one live participant connection: who it belongs to, the
//! topics it listens to, its outbox and the transport sink its writer task
//! drains into. Sessions are owned by the [`ConnectionRegistry`]; nothing
//! else creates or destroys them.
//!
//! [`ConnectionRegistry`]: super::ConnectionRegistry

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;

use super::outbox::Outbox;
use crate::broker::{SessionId, TopicKey};
use crate::model::{ParticipantId, Role};
use crate::utils::{DispatchError, Result};

/// Push side of a real-time transport connection.
///
/// Implemented by whatever carries bytes to the participant (WebSocket,
/// server-sent events, a test channel). An error means the transport is
/// gone; the registry then closes the session.
#[async_trait]
pub trait TransportSink: Send + Sync {
    async fn push(&self, session_id: &str, payload: &str) -> Result<()>;
}

/// Sink forwarding payloads into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(sender: UnboundedSender<String>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl TransportSink for ChannelSink {
    async fn push(&self, session_id: &str, payload: &str) -> Result<()> {
        self.sender
            .send(payload.to_string())
            .map_err(|_| DispatchError::Transport(format!("channel for {session_id} closed")))
    }
}

#[derive(Debug, Default)]
pub(crate) struct Subscriptions {
    pub(crate) topics: HashSet<TopicKey>,
    pub(crate) closed: bool,
}

pub struct Session {
    pub id: SessionId,
    pub participant_id: ParticipantId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub(crate) subscriptions: Mutex<Subscriptions>,
    pub(crate) outbox: Outbox,
    pub(crate) sink: Arc<dyn TransportSink>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        participant_id: ParticipantId,
        role: Role,
        sink: Arc<dyn TransportSink>,
        outbox_capacity: usize,
    ) -> Self {
        Self {
            id,
            participant_id,
            role,
            created_at: Utc::now(),
            subscriptions: Mutex::new(Subscriptions::default()),
            outbox: Outbox::new(outbox_capacity),
            sink,
        }
    }

    pub(crate) fn subscriptions(&self) -> MutexGuard<'_, Subscriptions> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribed_topics(&self) -> Vec<TopicKey> {
        self.subscriptions().topics.iter().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.subscriptions().closed
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("participant_id", &self.participant_id)
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .field("queued", &self.outbox.len())
            .finish()
    }
}
