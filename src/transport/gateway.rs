//! Realtime gateway
//!
//! The piece transports bind to. It opens and closes sessions in the
//! [`ConnectionRegistry`], checks every subscription against a fixed
//! role × topic-kind table and routes inbound participant messages to the
//! [`DispatchEngine`]. Failures of an inbound message are answered on the
//! same session with an `error` event; they never close the session.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::message::ClientMessage;
use crate::broker::{Event, EventKind, SessionId, TopicKey, TopicKind};
use crate::dispatch::DispatchEngine;
use crate::model::{Actor, NewDelivery, ParticipantId, Role};
use crate::pricing::PriceQuery;
use crate::registry::{ConnectionRegistry, Session, TransportSink};
use crate::utils::{DispatchError, Result};

/// What a role may observe on a kind of topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Denied,
    /// Only deliveries the participant is the client or driver of.
    OwnDelivery,
    /// Any existing delivery.
    AnyDelivery,
    /// Only the topic scoped to the participant's own id.
    OwnUser,
}

const ACCESS_TABLE: &[(Role, TopicKind, Access)] = &[
    (Role::Client, TopicKind::Status, Access::OwnDelivery),
    (Role::Client, TopicKind::Location, Access::OwnDelivery),
    (Role::Client, TopicKind::Chat, Access::OwnDelivery),
    (Role::Client, TopicKind::Notification, Access::OwnUser),
    (Role::Driver, TopicKind::Status, Access::OwnDelivery),
    (Role::Driver, TopicKind::Location, Access::OwnDelivery),
    (Role::Driver, TopicKind::Chat, Access::OwnDelivery),
    (Role::Driver, TopicKind::Notification, Access::OwnUser),
    (Role::Admin, TopicKind::Status, Access::AnyDelivery),
    (Role::Admin, TopicKind::Location, Access::AnyDelivery),
    (Role::Admin, TopicKind::Notification, Access::OwnUser),
];

/// Look up `role` × `kind`; pairs missing from the table are denied.
pub fn access(role: Role, kind: TopicKind) -> Access {
    ACCESS_TABLE
        .iter()
        .find(|(r, k, _)| *r == role && *k == kind)
        .map_or(Access::Denied, |(_, _, access)| *access)
}

#[derive(Debug, Clone)]
pub struct RealtimeGateway {
    registry: ConnectionRegistry,
    engine: Arc<DispatchEngine>,
}

impl RealtimeGateway {
    pub fn new(registry: ConnectionRegistry, engine: Arc<DispatchEngine>) -> Self {
        Self { registry, engine }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    /// Open a session for an authenticated participant and greet it with a
    /// `connection` event.
    pub fn open(
        &self,
        participant_id: impl Into<ParticipantId>,
        role: Role,
        sink: Arc<dyn TransportSink>,
    ) -> SessionId {
        let participant_id = participant_id.into();
        let session_id = self.registry.open(participant_id.clone(), role, sink);
        let hello = Event::new(
            EventKind::Connection,
            json!({
                "sessionId": session_id,
                "participantId": participant_id,
                "role": role,
            }),
        );
        if let Err(e) = self.registry.send_to(&session_id, &hello) {
            warn!(%session_id, "failed to greet session: {e}");
        }
        session_id
    }

    pub async fn subscribe(&self, session_id: &str, topic: &TopicKey) -> Result<()> {
        let session = self.registry.session(session_id)?;
        self.authorize(&session, topic).await?;
        self.registry.subscribe(session_id, topic)?;
        debug!(session_id, topic = %topic, "subscribed");
        Ok(())
    }

    pub fn unsubscribe(&self, session_id: &str, topic: &TopicKey) -> Result<()> {
        self.registry.unsubscribe(session_id, topic)
    }

    async fn authorize(&self, session: &Session, topic: &TopicKey) -> Result<()> {
        let denied = || {
            DispatchError::SubscriptionDenied(format!(
                "{} {} may not observe {topic}",
                session.role, session.participant_id
            ))
        };
        match access(session.role, topic.kind) {
            Access::Denied => Err(denied()),
            Access::OwnUser if topic.scope_id == session.participant_id => Ok(()),
            Access::OwnUser => Err(denied()),
            Access::AnyDelivery => self.engine.load(&topic.scope_id).await.map(|_| ()),
            Access::OwnDelivery => {
                let delivery = self.engine.load(&topic.scope_id).await?;
                let me = Some(session.participant_id.as_str());
                let involved = match session.role {
                    Role::Client => delivery.client_id == session.participant_id,
                    Role::Driver => delivery.driver_id.as_deref() == me,
                    _ => false,
                };
                if involved { Ok(()) } else { Err(denied()) }
            }
        }
    }

    /// Parse and handle one inbound text frame, reporting any failure back
    /// to the session.
    pub async fn handle_text(&self, session_id: &str, text: &str) {
        let result = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_message(session_id, message).await,
            Err(e) => Err(DispatchError::invalid_input(format!("malformed message: {e}"))),
        };
        if let Err(e) = result {
            self.report(session_id, &e);
        }
    }

    pub async fn handle_message(&self, session_id: &str, message: ClientMessage) -> Result<()> {
        let session = self.registry.session(session_id)?;
        let actor = Actor::new(session.participant_id.clone(), session.role);

        match message {
            ClientMessage::Auth { .. } => Err(DispatchError::invalid_input("already authenticated")),
            ClientMessage::Subscribe { topic } => self.subscribe(session_id, &topic).await,
            ClientMessage::Unsubscribe { topic } => self.unsubscribe(session_id, &topic),
            ClientMessage::Location {
                latitude,
                longitude,
                delivery_id,
            } => {
                if actor.role != Role::Driver {
                    return Err(DispatchError::invalid_input("only drivers report locations"));
                }
                self.engine
                    .update_location(&actor.id, latitude, longitude, delivery_id.as_deref())
                    .await
                    .map(|_| ())
            }
            ClientMessage::Chat {
                delivery_id,
                message,
            } => self.engine.relay_chat(&delivery_id, &actor, &message).await,
            ClientMessage::Transition {
                delivery_id,
                status,
            } => self
                .engine
                .transition_by_id(&delivery_id, status, &actor)
                .await
                .map(|_| ()),
            ClientMessage::Quote {
                vehicle_type,
                distance_km,
                waiting_minutes,
                delivery_type,
                promo_code,
            } => {
                let query = PriceQuery::parse(
                    &vehicle_type,
                    distance_km,
                    waiting_minutes,
                    &delivery_type,
                    promo_code,
                )?;
                let quote = self.engine.quote(&query).await?;
                self.reply(
                    session_id,
                    EventKind::Quote,
                    json!({
                        "query": query,
                        "calculation": quote.calculation,
                        "promoError": quote.promo_error.map(|e| e.to_string()),
                    }),
                )
            }
            ClientMessage::RequestDelivery {
                delivery_type,
                vehicle_type,
                pickup,
                dropoff,
                waiting_minutes,
                promo_code,
            } => {
                if actor.role != Role::Client {
                    return Err(DispatchError::invalid_input("only clients request deliveries"));
                }
                let request = NewDelivery {
                    client_id: actor.id.clone(),
                    delivery_type,
                    vehicle_type,
                    pickup,
                    dropoff,
                    waiting_minutes,
                    promo_code,
                };
                let (delivery, quote) = self.engine.request_delivery(request).await?;
                self.reply(
                    session_id,
                    EventKind::Delivery,
                    json!({
                        "delivery": delivery,
                        "calculation": quote.calculation,
                        "promoError": quote.promo_error.map(|e| e.to_string()),
                    }),
                )
            }
            // the state machine only lets admins assign
            ClientMessage::Assign {
                delivery_id,
                driver_id,
            } => {
                let delivery = self
                    .engine
                    .assign_by_id(&delivery_id, &driver_id, &actor)
                    .await?;
                self.reply(session_id, EventKind::Delivery, json!({ "delivery": delivery }))
            }
            ClientMessage::AutoAssign { delivery_id } => {
                if actor.role != Role::Admin {
                    return Err(DispatchError::invalid_input(
                        "only admins trigger auto-assignment",
                    ));
                }
                let delivery = self.engine.auto_assign(&delivery_id).await?;
                self.reply(session_id, EventKind::Delivery, json!({ "delivery": delivery }))
            }
            ClientMessage::Availability {
                status,
                vehicle_type,
            } => {
                if actor.role != Role::Driver {
                    return Err(DispatchError::invalid_input(
                        "only drivers report availability",
                    ));
                }
                let driver = self
                    .engine
                    .set_availability(&actor.id, status, vehicle_type)
                    .await?;
                self.reply(session_id, EventKind::Driver, json!({ "driver": driver }))
            }
            ClientMessage::Track { delivery_id } => {
                self.authorize(&session, &TopicKey::status(&delivery_id))
                    .await?;
                let delivery = self.engine.load(&delivery_id).await?;
                let eta = self.engine.eta(&delivery_id).await?;
                self.reply(
                    session_id,
                    EventKind::Delivery,
                    json!({ "delivery": delivery, "etaMinutes": eta }),
                )
            }
        }
    }

    fn reply(&self, session_id: &str, kind: EventKind, data: Value) -> Result<()> {
        self.registry.send_to(session_id, &Event::new(kind, data))
    }

    fn report(&self, session_id: &str, err: &DispatchError) {
        debug!(session_id, "request rejected: {err}");
        let event = Event::new(
            EventKind::Error,
            json!({ "message": err.to_string(), "kind": err.kind() }),
        );
        // the session may already be gone
        let _ = self.registry.send_to(session_id, &event);
    }

    pub fn close(&self, session_id: &str) -> bool {
        self.registry.close(session_id)
    }

    /// Close every open session.
    pub fn shutdown(&self) -> usize {
        let closed = self.registry.close_all();
        info!(sessions = closed, "realtime gateway shut down");
        closed
    }
}
