use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::DriverId;
use crate::utils::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    Moto,
    Voiture,
    Camionnette,
}

impl VehicleType {
    fn capacity_rank(&self) -> u8 {
        match self {
            VehicleType::Moto => 0,
            VehicleType::Voiture => 1,
            VehicleType::Camionnette => 2,
        }
    }

    /// A vehicle can take any job sized for a vehicle of the same or a
    /// smaller class.
    pub fn can_serve(&self, requested: VehicleType) -> bool {
        self.capacity_rank() >= requested.capacity_rank()
    }
}

impl FromStr for VehicleType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MOTO" => Ok(VehicleType::Moto),
            "VOITURE" => Ok(VehicleType::Voiture),
            "CAMIONNETTE" => Ok(VehicleType::Camionnette),
            other => Err(DispatchError::invalid_input(format!(
                "unknown vehicle type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Available,
    Online,
    Busy,
    Offline,
}

impl DriverStatus {
    /// Whether a driver in this status may be offered a new delivery.
    pub fn accepts_work(&self) -> bool {
        matches!(self, DriverStatus::Available | DriverStatus::Online)
    }
}

/// Roster entry for a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: DriverId,
    pub vehicle_type: VehicleType,
    pub status: DriverStatus,
    pub updated_at: DateTime<Utc>,
}
