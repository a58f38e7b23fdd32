//! Dispatch engine
//!
//! Owns every mutation of a delivery. A status change goes through three
//! steps:
//!
//! 1. validate against the state machine (pure, no lock held),
//! 2. under the delivery's own lock: optimistic save, then publish on the
//!    delivery's status topic,
//! 3. outside the lock: roster bookkeeping and notifications.
//!
//! A lock entry lives only while someone holds or waits on it.
//!
//! Assignment first claims the driver in the store, which atomically moves
//! it from AVAILABLE/ONLINE to BUSY. A driver therefore never ends up on
//! two deliveries, whichever path (explicit or automatic) assigned it. If
//! the delivery commit then fails, the claim is released.
//!
//! Transitions of one delivery are therefore committed and published one
//! at a time and in commit order, while different deliveries never wait on
//! each other. Concurrent callers that read the same prior status race on
//! the optimistic save; the loser gets `Conflict` and nothing is published
//! for it.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::assignment;
use super::state_machine;
use crate::broker::ChannelBroker;
use crate::config::PricingSettings;
use crate::geo;
use crate::location::{LocationCache, LocationSample};
use crate::model::{
    Actor, Delivery, DeliveryId, DeliveryStatus, Driver, DriverStatus, GeoPoint, NewDelivery,
    VehicleType,
};
use crate::persistence::DeliveryStore;
use crate::pricing::{self, PriceQuery, Quote};
use crate::utils::{DispatchError, Result};

/// Longest chat line relayed to participants.
pub const MAX_CHAT_LEN: usize = 2000;

pub struct DispatchEngine {
    store: Arc<dyn DeliveryStore>,
    broker: ChannelBroker,
    locations: LocationCache,
    pricing: PricingSettings,
    locks: DashMap<DeliveryId, Arc<Mutex<()>>>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        broker: ChannelBroker,
        locations: LocationCache,
        pricing: PricingSettings,
    ) -> Self {
        Self {
            store,
            broker,
            locations,
            pricing,
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DeliveryStore> {
        &self.store
    }

    pub fn broker(&self) -> &ChannelBroker {
        &self.broker
    }

    pub fn locations(&self) -> &LocationCache {
        &self.locations
    }

    pub async fn load(&self, delivery_id: &str) -> Result<Delivery> {
        self.store.load_delivery(delivery_id).await
    }

    /// Price a query, resolving its promo code through the store.
    pub async fn quote(&self, query: &PriceQuery) -> Result<Quote> {
        let promo = match query.promo_code.as_deref() {
            Some(code) => self.store.load_promo(code).await?,
            None => None,
        };
        pricing::price(&self.pricing, query, promo.as_ref(), Utc::now())
    }

    /// Create a delivery in `REQUESTED`, priced from its pickup/drop-off
    /// distance. An unusable promo code is dropped and reported in the
    /// returned quote.
    pub async fn request_delivery(&self, request: NewDelivery) -> Result<(Delivery, Quote)> {
        request.pickup.validate()?;
        request.dropoff.validate()?;
        let distance_km = geo::distance_between(&request.pickup, &request.dropoff);

        let query = PriceQuery {
            vehicle_type: request.vehicle_type,
            distance_km,
            waiting_minutes: i64::from(request.waiting_minutes),
            delivery_type: request.delivery_type,
            promo_code: request.promo_code.clone(),
        };
        let quote = self.quote(&query).await?;

        let delivery = Delivery {
            id: format!("del-{}", Uuid::new_v4()),
            status: DeliveryStatus::Requested,
            delivery_type: request.delivery_type,
            vehicle_type: request.vehicle_type,
            client_id: request.client_id,
            driver_id: None,
            pickup: request.pickup,
            dropoff: request.dropoff,
            price: quote.calculation.total,
            distance_km,
            waiting_minutes: request.waiting_minutes,
            promo_code: request.promo_code.filter(|_| quote.promo_error.is_none()),
            created_at: Utc::now(),
            assigned_at: None,
        };
        self.store.insert_delivery(&delivery).await?;
        info!(delivery_id = %delivery.id, client_id = %delivery.client_id, price = delivery.price, "delivery requested");

        self.broker.notify(
            &delivery.client_id,
            "delivery_requested",
            json!({ "deliveryId": delivery.id, "price": delivery.price }),
        );
        Ok((delivery, quote))
    }

    /// Apply a status change to `delivery`, the version the caller read.
    pub async fn transition(
        &self,
        delivery: &Delivery,
        to: DeliveryStatus,
        actor: &Actor,
    ) -> Result<Delivery> {
        let next = state_machine::transition(delivery, to, actor)?;
        self.commit(delivery, next).await
    }

    /// Load the current version of a delivery and apply a status change.
    pub async fn transition_by_id(
        &self,
        delivery_id: &str,
        to: DeliveryStatus,
        actor: &Actor,
    ) -> Result<Delivery> {
        let current = self.store.load_delivery(delivery_id).await?;
        self.transition(&current, to, actor).await
    }

    /// `REQUESTED -> ASSIGNED` with an explicit driver, who must exist,
    /// accept work and drive a vehicle able to serve the delivery.
    pub async fn assign(
        &self,
        delivery: &Delivery,
        driver_id: &str,
        actor: &Actor,
    ) -> Result<Delivery> {
        let next = state_machine::assign(delivery, driver_id, actor, Utc::now())?;
        let claimed = self
            .store
            .claim_driver(driver_id, delivery.vehicle_type)
            .await?;
        self.commit_claimed(delivery, next, claimed).await
    }

    /// Load the current version of a delivery and assign `driver_id` to it.
    pub async fn assign_by_id(
        &self,
        delivery_id: &str,
        driver_id: &str,
        actor: &Actor,
    ) -> Result<Delivery> {
        let current = self.store.load_delivery(delivery_id).await?;
        self.assign(&current, driver_id, actor).await
    }

    /// Assign the nearest eligible driver to a `REQUESTED` delivery.
    ///
    /// Candidates come from a roster snapshot, so each one is claimed in the
    /// store before use; a candidate taken in the meantime is skipped.
    /// Fails with `NoDriverAvailable` when nobody qualifies; retrying is up
    /// to the caller.
    pub async fn auto_assign(&self, delivery_id: &str) -> Result<Delivery> {
        let delivery = self.store.load_delivery(delivery_id).await?;
        if delivery.status != DeliveryStatus::Requested {
            return Err(DispatchError::InvalidTransition {
                from: delivery.status.to_string(),
                to: DeliveryStatus::Assigned.to_string(),
            });
        }

        let drivers = self
            .store
            .list_available_drivers(delivery.vehicle_type)
            .await?;
        let ranked = assignment::rank_candidates(
            &drivers,
            &self.locations,
            &delivery.pickup,
            delivery.vehicle_type,
            Utc::now(),
        );

        let dispatcher = Actor::dispatcher();
        let mut skipped = 0usize;
        for candidate in &ranked {
            let next =
                state_machine::assign(&delivery, &candidate.driver_id, &dispatcher, Utc::now())?;
            let claimed = match self
                .store
                .claim_driver(&candidate.driver_id, delivery.vehicle_type)
                .await
            {
                Ok(claimed) => claimed,
                Err(DispatchError::NoDriverAvailable | DispatchError::NotFound(_)) => {
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let result = self.commit_claimed(&delivery, next, claimed).await;
            match &result {
                Ok(_) => info!(
                    delivery_id,
                    driver_id = %candidate.driver_id,
                    distance_km = candidate.distance_km,
                    "driver auto-assigned"
                ),
                Err(e) => warn!(delivery_id, driver_id = %candidate.driver_id, "auto-assignment failed: {e}"),
            }
            return result;
        }

        if skipped > 0 {
            info!(delivery_id, skipped, "every ranked driver was taken in the meantime");
        }
        Err(DispatchError::NoDriverAvailable)
    }

    /// Commit an assignment whose driver is already claimed, handing the
    /// driver back if the delivery could not be saved.
    async fn commit_claimed(
        &self,
        delivery: &Delivery,
        next: Delivery,
        claimed: Driver,
    ) -> Result<Delivery> {
        let result = self.commit(delivery, next).await;
        if result.is_err() {
            self.set_driver_status(&claimed.id, claimed.status).await;
        }
        result
    }

    /// Driver-reported availability (AVAILABLE, ONLINE or OFFLINE). An
    /// unknown driver is registered when `vehicle` is given.
    pub async fn set_availability(
        &self,
        driver_id: &str,
        status: DriverStatus,
        vehicle: Option<VehicleType>,
    ) -> Result<Driver> {
        let driver = self
            .store
            .set_availability(driver_id, status, vehicle)
            .await?;
        info!(driver_id, status = ?driver.status, "driver availability changed");
        Ok(driver)
    }

    /// Record a driver position. When `delivery_id` names a delivery in
    /// progress for this driver, the position is also published on that
    /// delivery's location topic along with the current ETA.
    pub async fn update_location(
        &self,
        driver_id: &str,
        latitude: f64,
        longitude: f64,
        delivery_id: Option<&str>,
    ) -> Result<LocationSample> {
        let point = GeoPoint::new(latitude, longitude)?;
        let delivery = match delivery_id {
            Some(delivery_id) => {
                let delivery = self.store.load_delivery(delivery_id).await?;
                if delivery.driver_id.as_deref() != Some(driver_id) {
                    return Err(DispatchError::invalid_input(format!(
                        "driver {driver_id} is not assigned to delivery {delivery_id}"
                    )));
                }
                Some(delivery)
            }
            None => None,
        };

        let sample = LocationSample {
            driver_id: driver_id.to_string(),
            delivery_id: delivery_id.map(str::to_string),
            latitude: point.latitude,
            longitude: point.longitude,
            captured_at: Utc::now(),
        };
        self.locations.set(driver_id, sample.clone())?;

        if let Some(delivery) = delivery.filter(|d| !d.status.is_terminal()) {
            let eta = self.eta_from(&delivery, &sample.point());
            self.broker.publish_location(&delivery.id, &sample, eta);
        }
        Ok(sample)
    }

    /// Minutes until the assigned driver reaches the next stop: the pickup
    /// before collection, the drop-off after. `None` when there is no
    /// driver or no fresh position for it.
    pub async fn eta(&self, delivery_id: &str) -> Result<Option<u32>> {
        let delivery = self.store.load_delivery(delivery_id).await?;
        let Some(driver_id) = delivery.driver_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .locations
            .get(driver_id)
            .and_then(|sample| self.eta_from(&delivery, &sample.point())))
    }

    fn eta_from(&self, delivery: &Delivery, position: &GeoPoint) -> Option<u32> {
        let target = match delivery.status {
            DeliveryStatus::Assigned | DeliveryStatus::Accepted => &delivery.pickup,
            DeliveryStatus::PickedUp => &delivery.dropoff,
            _ => return None,
        };
        geo::eta_minutes(
            geo::distance_between(position, target),
            self.pricing.average_speed_kmh,
        )
        .ok()
    }

    /// Relay a chat line between the client and the driver of a delivery.
    pub async fn relay_chat(&self, delivery_id: &str, sender: &Actor, message: &str) -> Result<()> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DispatchError::invalid_input("chat message is empty"));
        }
        if message.chars().count() > MAX_CHAT_LEN {
            return Err(DispatchError::invalid_input(format!(
                "chat message longer than {MAX_CHAT_LEN} characters"
            )));
        }

        let delivery = self.store.load_delivery(delivery_id).await?;
        let is_party = delivery.client_id == sender.id
            || delivery.driver_id.as_deref() == Some(sender.id.as_str());
        if !is_party {
            return Err(DispatchError::invalid_input(format!(
                "{} is not a participant of delivery {delivery_id}",
                sender.id
            )));
        }

        self.broker
            .publish_chat(delivery_id, &sender.id, sender.role, message, Utc::now());
        Ok(())
    }

    fn lock_for(&self, delivery_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(delivery_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry of `delivery_id` unless another caller holds a
    /// handle to it.
    fn release_lock(&self, delivery_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(delivery_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Number of per-delivery locks currently allocated.
    pub(crate) fn lock_count(&self) -> usize {
        self.locks.len()
    }

    async fn commit(&self, previous: &Delivery, next: Delivery) -> Result<Delivery> {
        let lock = self.lock_for(&next.id);
        let saved = {
            let _guard = lock.lock().await;
            let saved = self.store.save_delivery(&next, previous.status).await;
            if saved.is_ok() {
                self.broker.publish_status(&next);
            }
            saved
        };
        self.release_lock(&next.id, lock);
        saved?;

        info!(
            delivery_id = %next.id,
            from = %previous.status,
            to = %next.status,
            "delivery transitioned"
        );

        self.after_commit(previous, &next).await;
        Ok(next)
    }

    /// Roster bookkeeping and notifications. The transition is already
    /// durable here, so failures are logged rather than returned. The
    /// driver went BUSY with its claim; here it is only freed again.
    async fn after_commit(&self, previous: &Delivery, next: &Delivery) {
        let summary = json!({
            "deliveryId": next.id,
            "status": next.status,
            "driverId": next.driver_id,
        });

        match next.status {
            DeliveryStatus::Assigned => {
                if let Some(driver_id) = next.driver_id.as_deref() {
                    self.broker.notify(
                        driver_id,
                        "delivery_assigned",
                        json!({
                            "deliveryId": next.id,
                            "pickup": next.pickup,
                            "dropoff": next.dropoff,
                            "price": next.price,
                        }),
                    );
                }
            }
            DeliveryStatus::Delivered | DeliveryStatus::Cancelled => {
                if let Some(driver_id) = previous.driver_id.as_deref() {
                    self.set_driver_status(driver_id, DriverStatus::Available)
                        .await;
                    let title = if next.status == DeliveryStatus::Cancelled {
                        "delivery_cancelled"
                    } else {
                        "delivery_status"
                    };
                    self.broker.notify(driver_id, title, summary.clone());
                }
            }
            _ => {
                if let Some(driver_id) = next.driver_id.as_deref() {
                    self.broker
                        .notify(driver_id, "delivery_status", summary.clone());
                }
            }
        }

        self.broker
            .notify(&next.client_id, "delivery_status", summary);
    }

    async fn set_driver_status(&self, driver_id: &str, status: DriverStatus) {
        if let Err(e) = self.store.set_driver_status(driver_id, status).await {
            warn!(driver_id, ?status, "failed to update driver status: {e}");
        }
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("broker", &self.broker)
            .field("locations", &self.locations.len())
            .field("locks", &self.lock_count())
            .finish()
    }
}
