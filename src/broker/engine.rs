//! Channel broker
//!
//! The broker turns domain happenings (a status change, a position fix, a
//! chat line, a notification) into [`Event`]s and hands them to the
//! [`ConnectionRegistry`] for fan-out. `publish` returns once every current
//! subscriber's outbox holds the event; delivery itself happens on each
//! session's writer task.
//!
//! Ordering: events published to one topic from one task reach each
//! subscriber in publish order, since they are appended to the same FIFO
//! outbox in that order. Nothing is promised across topics or publishers.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use crate::broker::message::{Event, EventKind};
use crate::broker::topic::TopicKey;
use crate::location::LocationSample;
use crate::model::{Delivery, Role};
use crate::registry::ConnectionRegistry;

#[derive(Debug, Clone)]
pub struct ChannelBroker {
    registry: ConnectionRegistry,
}

impl ChannelBroker {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Fan `event` out to every session subscribed to `topic`.
    ///
    /// Publishing to a topic nobody listens to is a no-op. Returns the
    /// number of sessions the event was queued for.
    pub fn publish(&self, topic: &TopicKey, event: Event) -> usize {
        let queued = self.registry.push(topic, &event);
        if queued == 0 {
            debug!(%topic, "no subscribers, event not delivered");
        }
        queued
    }

    pub fn publish_status(&self, delivery: &Delivery) -> usize {
        let event = Event::new(
            EventKind::Status,
            json!({
                "deliveryId": delivery.id,
                "status": delivery.status,
                "driverId": delivery.driver_id,
                "assignedAt": delivery.assigned_at,
            }),
        );
        self.publish(&TopicKey::status(&delivery.id), event)
    }

    pub fn publish_location(
        &self,
        delivery_id: &str,
        sample: &LocationSample,
        eta_minutes: Option<u32>,
    ) -> usize {
        let event = Event::new(
            EventKind::Location,
            json!({
                "deliveryId": delivery_id,
                "driverId": sample.driver_id,
                "latitude": sample.latitude,
                "longitude": sample.longitude,
                "capturedAt": sample.captured_at,
                "etaMinutes": eta_minutes,
            }),
        );
        self.publish(&TopicKey::location(delivery_id), event)
    }

    pub fn publish_chat(
        &self,
        delivery_id: &str,
        sender_id: &str,
        sender_role: Role,
        message: &str,
        sent_at: DateTime<Utc>,
    ) -> usize {
        let event = Event::new(
            EventKind::Chat,
            json!({
                "deliveryId": delivery_id,
                "senderId": sender_id,
                "senderRole": sender_role,
                "message": message,
                "sentAt": sent_at,
            }),
        );
        self.publish(&TopicKey::chat(delivery_id), event)
    }

    pub fn notify(&self, user_id: &str, title: &str, body: serde_json::Value) -> usize {
        let event = Event::new(
            EventKind::Notification,
            json!({ "title": title, "body": body }),
        );
        self.publish(&TopicKey::notification(user_id), event)
    }
}
