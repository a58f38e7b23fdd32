//! `DeliveryStore` backed by `sled`
//!
//! Layout: one tree per record type (`deliveries`, `drivers`, `promos`),
//! keyed by id (or code), values are JSON. Optimistic delivery saves use
//! `compare_and_swap` on the exact bytes that were checked, so two writers
//! racing from the same prior status cannot both win. Driver records are
//! updated through a compare-and-swap loop for the same reason.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sled::{Db, Tree};
use tracing::debug;

use super::DeliveryStore;
use crate::model::{Delivery, DeliveryStatus, Driver, DriverStatus, Promo, VehicleType};
use crate::utils::{DispatchError, Result};

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    deliveries: Tree,
    drivers: Tree,
    promos: Tree,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A throw-away database removed when the last handle is dropped.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            deliveries: db.open_tree("deliveries")?,
            drivers: db.open_tree("drivers")?,
            promos: db.open_tree("promos")?,
            db,
        })
    }

    /// Flush dirty buffers to disk.
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    /// Replace a driver record with `change(current)`, retrying until no
    /// other writer slipped in between the read and the swap. Returns the
    /// record before and after the change.
    fn swap_driver<F>(&self, driver_id: &str, mut change: F) -> Result<(Option<Driver>, Driver)>
    where
        F: FnMut(Option<Driver>) -> Result<Driver>,
    {
        loop {
            let current = self.drivers.get(driver_id)?;
            let before: Option<Driver> = current.as_deref().map(decode).transpose()?;
            let after = change(before.clone())?;
            let bytes = encode(&after)?;
            match self
                .drivers
                .compare_and_swap(driver_id.as_bytes(), current, Some(bytes))?
            {
                Ok(()) => return Ok((before, after)),
                Err(_) => debug!(driver_id, "driver record changed concurrently, retrying"),
            }
        }
    }
}

fn existing(driver: Option<Driver>, driver_id: &str) -> Result<Driver> {
    driver.ok_or_else(|| DispatchError::NotFound(format!("driver {driver_id}")))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl DeliveryStore for SledStore {
    async fn load_delivery(&self, id: &str) -> Result<Delivery> {
        match self.deliveries.get(id)? {
            Some(bytes) => decode(&bytes),
            None => Err(DispatchError::NotFound(format!("delivery {id}"))),
        }
    }

    async fn insert_delivery(&self, delivery: &Delivery) -> Result<()> {
        let bytes = encode(delivery)?;
        match self
            .deliveries
            .compare_and_swap(delivery.id.as_bytes(), None::<&[u8]>, Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(DispatchError::Conflict(delivery.id.clone())),
        }
    }

    async fn save_delivery(&self, delivery: &Delivery, expected: DeliveryStatus) -> Result<()> {
        let current = self
            .deliveries
            .get(delivery.id.as_bytes())?
            .ok_or_else(|| DispatchError::NotFound(format!("delivery {}", delivery.id)))?;
        let stored: Delivery = decode(&current)?;
        if stored.status != expected {
            debug!(
                delivery_id = %delivery.id,
                expected = %expected,
                found = %stored.status,
                "optimistic save rejected"
            );
            return Err(DispatchError::Conflict(delivery.id.clone()));
        }

        let bytes = encode(delivery)?;
        match self
            .deliveries
            .compare_and_swap(delivery.id.as_bytes(), Some(current), Some(bytes))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(DispatchError::Conflict(delivery.id.clone())),
        }
    }

    async fn list_available_drivers(&self, vehicle: VehicleType) -> Result<Vec<Driver>> {
        let mut drivers = Vec::new();
        for entry in self.drivers.iter() {
            let (_, bytes) = entry?;
            let driver: Driver = decode(&bytes)?;
            if driver.status.accepts_work() && driver.vehicle_type.can_serve(vehicle) {
                drivers.push(driver);
            }
        }
        Ok(drivers)
    }

    async fn save_driver(&self, driver: &Driver) -> Result<()> {
        self.drivers.insert(driver.id.as_bytes(), encode(driver)?)?;
        Ok(())
    }

    async fn set_driver_status(&self, driver_id: &str, status: DriverStatus) -> Result<()> {
        self.swap_driver(driver_id, |current| {
            let mut driver = existing(current, driver_id)?;
            driver.status = status;
            driver.updated_at = Utc::now();
            Ok(driver)
        })?;
        Ok(())
    }

    async fn claim_driver(&self, driver_id: &str, vehicle: VehicleType) -> Result<Driver> {
        let (before, _) = self.swap_driver(driver_id, |current| {
            let mut driver = existing(current, driver_id)?;
            if !driver.vehicle_type.can_serve(vehicle) {
                return Err(DispatchError::invalid_input(format!(
                    "driver {driver_id} drives a {:?}, which cannot serve a {vehicle:?} delivery",
                    driver.vehicle_type
                )));
            }
            if !driver.status.accepts_work() {
                return Err(DispatchError::NoDriverAvailable);
            }
            driver.status = DriverStatus::Busy;
            driver.updated_at = Utc::now();
            Ok(driver)
        })?;
        existing(before, driver_id)
    }

    async fn set_availability(
        &self,
        driver_id: &str,
        status: DriverStatus,
        vehicle: Option<VehicleType>,
    ) -> Result<Driver> {
        if status == DriverStatus::Busy {
            return Err(DispatchError::invalid_input(
                "BUSY is only ever set by an assignment",
            ));
        }
        let (_, after) = self.swap_driver(driver_id, |current| {
            let mut driver = match (current, vehicle) {
                (Some(driver), _) => driver,
                (None, Some(vehicle_type)) => Driver {
                    id: driver_id.to_string(),
                    vehicle_type,
                    status,
                    updated_at: Utc::now(),
                },
                (None, None) => {
                    return Err(DispatchError::NotFound(format!("driver {driver_id}")));
                }
            };
            if driver.status == DriverStatus::Busy {
                return Err(DispatchError::invalid_input(format!(
                    "driver {driver_id} is busy with a delivery"
                )));
            }
            driver.status = status;
            if let Some(vehicle_type) = vehicle {
                driver.vehicle_type = vehicle_type;
            }
            driver.updated_at = Utc::now();
            Ok(driver)
        })?;
        Ok(after)
    }

    async fn load_promo(&self, code: &str) -> Result<Option<Promo>> {
        self.promos
            .get(code.to_ascii_uppercase())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn save_promo(&self, promo: &Promo) -> Result<()> {
        self.promos
            .insert(promo.code.to_ascii_uppercase(), encode(promo)?)?;
        Ok(())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .field("deliveries", &self.deliveries.len())
            .field("drivers", &self.drivers.len())
            .finish()
    }
}
