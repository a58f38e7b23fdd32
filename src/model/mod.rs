//! Domain records shared by the dispatch core.
//!
//! These types mirror what the persistence port stores and what the wire
//! protocol carries. Enumerations serialize as the upper-case names used by
//! mobile clients (`"PICKED_UP"`, `"CAMIONNETTE"`, ...).

pub mod delivery;
pub mod driver;
pub mod promo;

pub use delivery::{Delivery, DeliveryStatus, DeliveryType, NewDelivery};
pub use driver::{Driver, DriverStatus, VehicleType};
pub use promo::{Discount, Promo};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::DispatchError;

pub type ParticipantId = String;
pub type DeliveryId = String;
pub type DriverId = String;

/// Role under which a participant acts, as vouched for by the identity
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Driver,
    Admin,
    /// The dispatch routine itself (auto-assignment, schedulers).
    Dispatcher,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Client => "client",
            Role::Driver => "driver",
            Role::Admin => "admin",
            Role::Dispatcher => "dispatcher",
        };
        f.write_str(s)
    }
}

impl FromStr for Role {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            "dispatcher" => Ok(Role::Dispatcher),
            other => Err(DispatchError::invalid_input(format!("unknown role '{other}'"))),
        }
    }
}

/// Who is asking for a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ParticipantId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<ParticipantId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    /// The auto-assignment routine.
    pub fn dispatcher() -> Self {
        Self::new("dispatcher", Role::Dispatcher)
    }
}

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting anything outside [-90, 90] x [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DispatchError> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(DispatchError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

#[cfg(test)]
mod tests;
