//! The `persistence` module is the port through which the dispatch core
//! reads and writes deliveries, the driver roster and promo codes.
//!
//! [`DeliveryStore`] is the contract; [`SledStore`] implements it on top of
//! `sled`, an embedded key-value store. Saves of a delivery are optimistic:
//! the caller names the status it read, and the write fails with
//! [`DispatchError::Conflict`](crate::utils::DispatchError::Conflict) if the
//! stored record moved on in the meantime. Driver status changes are
//! atomic per driver: [`DeliveryStore::claim_driver`] is the only way a
//! driver becomes `BUSY`, and two claims on one driver never both succeed.

pub mod sled_store;

use async_trait::async_trait;

use crate::model::{Delivery, DeliveryStatus, Driver, DriverStatus, Promo, VehicleType};
use crate::utils::Result;

pub use sled_store::SledStore;

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Fails with `NotFound` when no such delivery exists.
    async fn load_delivery(&self, id: &str) -> Result<Delivery>;

    /// Store a brand new delivery. Fails with `Conflict` if the id is taken.
    async fn insert_delivery(&self, delivery: &Delivery) -> Result<()>;

    /// Replace a delivery whose stored status is still `expected`.
    async fn save_delivery(&self, delivery: &Delivery, expected: DeliveryStatus) -> Result<()>;

    /// Drivers that accept work and whose vehicle can serve `vehicle`.
    async fn list_available_drivers(&self, vehicle: VehicleType) -> Result<Vec<Driver>>;

    async fn save_driver(&self, driver: &Driver) -> Result<()>;

    async fn set_driver_status(&self, driver_id: &str, status: DriverStatus) -> Result<()>;

    /// Atomically move a driver that accepts work to `BUSY`, returning the
    /// record as it was before the claim.
    ///
    /// Fails with `NoDriverAvailable` when the driver is busy or offline,
    /// `InvalidInput` when its vehicle cannot serve `vehicle` and `NotFound`
    /// for an unknown driver.
    async fn claim_driver(&self, driver_id: &str, vehicle: VehicleType) -> Result<Driver>;

    /// Driver-initiated status change. Registers an unknown driver when
    /// `vehicle` is given. Refused while the driver is `BUSY`.
    async fn set_availability(
        &self,
        driver_id: &str,
        status: DriverStatus,
        vehicle: Option<VehicleType>,
    ) -> Result<Driver>;

    /// `Ok(None)` when the code is unknown.
    async fn load_promo(&self, code: &str) -> Result<Option<Promo>>;

    async fn save_promo(&self, promo: &Promo) -> Result<()>;
}
