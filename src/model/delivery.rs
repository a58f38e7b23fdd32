use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{DeliveryId, DriverId, GeoPoint, ParticipantId, VehicleType};
use crate::utils::DispatchError;

/// Lifecycle of a delivery.
///
/// `REQUESTED -> ASSIGNED -> ACCEPTED -> PICKED_UP -> DELIVERED`, with
/// `CANCELLED` reachable from the first three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Requested,
    Assigned,
    Accepted,
    PickedUp,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Requested => "REQUESTED",
            DeliveryStatus::Assigned => "ASSIGNED",
            DeliveryStatus::Accepted => "ACCEPTED",
            DeliveryStatus::PickedUp => "PICKED_UP",
            DeliveryStatus::Delivered => "DELIVERED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }

    /// Statuses in which a driver is attached to the delivery.
    pub fn has_driver(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Assigned
                | DeliveryStatus::Accepted
                | DeliveryStatus::PickedUp
                | DeliveryStatus::Delivered
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REQUESTED" => Ok(DeliveryStatus::Requested),
            "ASSIGNED" => Ok(DeliveryStatus::Assigned),
            "ACCEPTED" => Ok(DeliveryStatus::Accepted),
            "PICKED_UP" => Ok(DeliveryStatus::PickedUp),
            "DELIVERED" => Ok(DeliveryStatus::Delivered),
            "CANCELLED" => Ok(DeliveryStatus::Cancelled),
            other => Err(DispatchError::invalid_input(format!(
                "unknown delivery status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryType {
    Simple,
    Express,
    Groupee,
    Demenagement,
}

impl FromStr for DeliveryType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SIMPLE" => Ok(DeliveryType::Simple),
            "EXPRESS" => Ok(DeliveryType::Express),
            "GROUPEE" => Ok(DeliveryType::Groupee),
            "DEMENAGEMENT" => Ok(DeliveryType::Demenagement),
            other => Err(DispatchError::invalid_input(format!(
                "unknown delivery type '{other}'"
            ))),
        }
    }
}

/// A delivery record.
///
/// Only the dispatch engine produces modified copies of a `Delivery`; the
/// invariant `driver_id.is_some() == status.has_driver()` holds for every
/// record it persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: DeliveryId,
    pub status: DeliveryStatus,
    #[serde(rename = "type")]
    pub delivery_type: DeliveryType,
    pub vehicle_type: VehicleType,
    pub client_id: ParticipantId,
    pub driver_id: Option<DriverId>,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub price: f64,
    pub distance_km: f64,
    pub waiting_minutes: u32,
    pub promo_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
}

/// What a client submits when requesting a delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDelivery {
    pub client_id: ParticipantId,
    #[serde(rename = "type")]
    pub delivery_type: DeliveryType,
    pub vehicle_type: VehicleType,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    #[serde(default)]
    pub waiting_minutes: u32,
    #[serde(default)]
    pub promo_code: Option<String>,
}
