//! Connection registry
//!
//! Concurrency notes:
//! - Sessions live in a sharded `DashMap`, topics in a separate
//!   [`TopicIndex`]; there is no registry-wide lock.
//! - A session's subscription set and its closed flag share one small
//!   mutex, so `subscribe` racing `close` can never leave a closed session
//!   in the topic index.
//! - `close` marks the outbox closed before returning; nothing published
//!   afterwards reaches the sink. A push already handed to the sink is
//!   attempted once.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::outbox::{Enqueued, Outbound};
use super::session::{Session, TransportSink};
use crate::broker::{Event, SessionId, TopicIndex, TopicKey};
use crate::config::RealtimeSettings;
use crate::model::{ParticipantId, Role};
use crate::utils::{DispatchError, Result};

#[derive(Debug)]
struct RegistryInner {
    sessions: DashMap<SessionId, Arc<Session>>,
    topics: TopicIndex,
    outbox_capacity: usize,
    push_timeout: Duration,
}

/// Handle to the set of live sessions. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(outbox_capacity: usize, push_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                topics: TopicIndex::new(),
                outbox_capacity,
                push_timeout,
            }),
        }
    }

    pub fn from_settings(settings: &RealtimeSettings) -> Self {
        Self::new(
            settings.outbox_capacity,
            Duration::from_millis(settings.push_timeout_ms),
        )
    }

    /// Register a new session for `participant_id` pushing into `sink`.
    ///
    /// Spawns the session's writer task, so this must be called from
    /// within a tokio runtime.
    pub fn open(
        &self,
        participant_id: impl Into<ParticipantId>,
        role: Role,
        sink: Arc<dyn TransportSink>,
    ) -> SessionId {
        let id = format!("session-{}", Uuid::new_v4());
        let session = Arc::new(Session::new(
            id.clone(),
            participant_id.into(),
            role,
            sink,
            self.inner.outbox_capacity,
        ));
        self.inner.sessions.insert(id.clone(), session.clone());

        tokio::spawn(run_writer(
            Arc::downgrade(&self.inner),
            session.clone(),
            self.inner.push_timeout,
        ));

        info!(session_id = %id, participant_id = %session.participant_id, role = %role, "session opened");
        id
    }

    pub fn subscribe(&self, session_id: &str, topic: &TopicKey) -> Result<()> {
        let session = self.session(session_id)?;
        let mut subs = session.subscriptions();
        if subs.closed {
            return Err(DispatchError::UnknownSession(session_id.to_string()));
        }
        self.inner.topics.subscribe(topic, session.id.clone());
        subs.topics.insert(topic.clone());
        debug!(session_id, %topic, "subscribed");
        Ok(())
    }

    pub fn unsubscribe(&self, session_id: &str, topic: &TopicKey) -> Result<()> {
        let session = self.session(session_id)?;
        let mut subs = session.subscriptions();
        if subs.topics.remove(topic) {
            self.inner.topics.unsubscribe(topic, &session.id);
            debug!(session_id, %topic, "unsubscribed");
        }
        Ok(())
    }

    /// Tear down a session: stop its writer, drop its subscriptions and its
    /// sink. Returns `false` if the session was already gone.
    pub fn close(&self, session_id: &str) -> bool {
        let Some((_, session)) = self.inner.sessions.remove(session_id) else {
            return false;
        };
        session.outbox.close();

        let topics = {
            let mut subs = session.subscriptions();
            subs.closed = true;
            std::mem::take(&mut subs.topics)
        };
        for topic in &topics {
            self.inner.topics.unsubscribe(topic, &session.id);
        }

        info!(session_id, topics = topics.len(), "session closed");
        true
    }

    /// Close every session. Used at shutdown.
    pub fn close_all(&self) -> usize {
        let ids: Vec<SessionId> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.iter().filter(|id| self.close(id)).count()
    }

    /// Queue `event` for every current subscriber of `topic`. Returns the
    /// number of sessions it was queued for.
    pub fn push(&self, topic: &TopicKey, event: &Event) -> usize {
        let subscribers = self.inner.topics.subscribers(topic);
        if subscribers.is_empty() {
            return 0;
        }
        let Some(item) = outbound(event) else {
            return 0;
        };

        subscribers
            .iter()
            .filter(|id| self.enqueue(id, item.clone()))
            .count()
    }

    /// Queue `event` for a single session.
    pub fn send_to(&self, session_id: &str, event: &Event) -> Result<()> {
        let item = outbound(event).ok_or_else(|| {
            DispatchError::Transport(format!("could not encode event for {session_id}"))
        })?;
        if self.enqueue(session_id, item) {
            Ok(())
        } else {
            Err(DispatchError::UnknownSession(session_id.to_string()))
        }
    }

    fn enqueue(&self, session_id: &str, item: Outbound) -> bool {
        let Some(session) = self
            .inner
            .sessions
            .get(session_id)
            .map(|s| s.value().clone())
        else {
            return false;
        };
        match session.outbox.push(item) {
            Enqueued::Queued => true,
            Enqueued::DroppedOldest => {
                warn!(session_id, "outbox full, dropped oldest droppable event");
                true
            }
            Enqueued::DroppedIncoming => {
                warn!(session_id, "outbox full, dropped incoming droppable event");
                false
            }
            Enqueued::Closed => false,
        }
    }

    /// Look up a live session.
    pub fn session(&self, session_id: &str) -> Result<Arc<Session>> {
        self.inner
            .sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| DispatchError::UnknownSession(session_id.to_string()))
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn subscriber_count(&self, topic: &TopicKey) -> usize {
        self.inner.topics.subscriber_count(topic)
    }

    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Send `ping` to every open session on a fixed interval, forever.
    ///
    /// Meant to be spawned as a background task for the lifetime of the
    /// server.
    pub async fn start_keepalive_loop(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let ping = Event::ping();
            let sent = self
                .session_ids()
                .iter()
                .filter(|id| self.send_to(id, &ping).is_ok())
                .count();
            debug!(sessions = sent, "keep-alive sent");
        }
    }
}

fn outbound(event: &Event) -> Option<Outbound> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Outbound {
            payload: Arc::from(json),
            droppable: event.kind.is_droppable(),
        }),
        Err(e) => {
            error!("Failed to serialize event: {e}");
            None
        }
    }
}

async fn run_writer(registry: Weak<RegistryInner>, session: Arc<Session>, push_timeout: Duration) {
    while let Some(item) = session.outbox.next().await {
        let failure = match tokio::time::timeout(
            push_timeout,
            session.sink.push(&session.id, &item.payload),
        )
        .await
        {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("push timed out after {push_timeout:?}"),
        };

        warn!(session_id = %session.id, "sink failed, closing session: {failure}");
        if let Some(inner) = registry.upgrade() {
            ConnectionRegistry { inner }.close(&session.id);
        }
        break;
    }
    debug!(session_id = %session.id, "writer stopped");
}
