//! Topic management
//!
//! A `Topic` holds the set of session ids subscribed to one [`TopicKey`].
//! Topics live in a [`TopicIndex`], a sharded concurrent map: subscribing
//! creates the topic on demand and the last unsubscribe removes it, so
//! deliveries that nobody watches cost nothing.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub type SessionId = String;

/// Kind of event a topic carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Status,
    Location,
    Chat,
    Notification,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Status => "status",
            TopicKind::Location => "location",
            TopicKind::Chat => "chat",
            TopicKind::Notification => "notification",
        }
    }

    /// Notification topics are scoped by user id, everything else by
    /// delivery id.
    pub fn is_user_scoped(&self) -> bool {
        matches!(self, TopicKind::Notification)
    }
}

/// `{kind, scopeId}`: one kind of event for one delivery or user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicKey {
    pub kind: TopicKind,
    pub scope_id: String,
}

impl TopicKey {
    pub fn new(kind: TopicKind, scope_id: impl Into<String>) -> Self {
        Self {
            kind,
            scope_id: scope_id.into(),
        }
    }

    pub fn status(delivery_id: &str) -> Self {
        Self::new(TopicKind::Status, delivery_id)
    }

    pub fn location(delivery_id: &str) -> Self {
        Self::new(TopicKind::Location, delivery_id)
    }

    pub fn chat(delivery_id: &str) -> Self {
        Self::new(TopicKind::Chat, delivery_id)
    }

    pub fn notification(user_id: &str) -> Self {
        Self::new(TopicKind::Notification, user_id)
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.scope_id)
    }
}

#[derive(Debug)]
pub struct Topic {
    pub key: TopicKey,
    pub subscribers: HashSet<SessionId>,
}

impl Topic {
    /// Create a new topic with no subscribers.
    pub fn new(key: TopicKey) -> Self {
        Self {
            key,
            subscribers: HashSet::new(),
        }
    }

    /// Add a subscriber to the topic. Duplicate adds are ignored.
    pub fn subscribe(&mut self, id: SessionId) {
        self.subscribers.insert(id);
    }

    /// Remove a subscriber from the topic.
    pub fn unsubscribe(&mut self, id: &SessionId) {
        self.subscribers.remove(id);
    }
}

/// Concurrent `TopicKey -> Topic` map.
///
/// Each operation only locks the shard holding its key, so fan-out for one
/// delivery never waits on subscription churn for another.
#[derive(Debug, Default)]
pub struct TopicIndex {
    topics: DashMap<TopicKey, Topic>,
}

impl TopicIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, key: &TopicKey, session: SessionId) {
        self.topics
            .entry(key.clone())
            .or_insert_with(|| Topic::new(key.clone()))
            .subscribe(session);
    }

    /// Remove `session` from `key`, dropping the topic once it is empty.
    pub fn unsubscribe(&self, key: &TopicKey, session: &SessionId) {
        if let Some(mut topic) = self.topics.get_mut(key) {
            topic.unsubscribe(session);
        }
        self.topics.remove_if(key, |_, topic| topic.subscribers.is_empty());
    }

    /// Snapshot of the current subscribers of `key`.
    pub fn subscribers(&self, key: &TopicKey) -> Vec<SessionId> {
        self.topics
            .get(key)
            .map(|topic| topic.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, key: &TopicKey) -> usize {
        self.topics
            .get(key)
            .map(|topic| topic.subscribers.len())
            .unwrap_or(0)
    }

    pub fn contains(&self, key: &TopicKey) -> bool {
        self.topics.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
