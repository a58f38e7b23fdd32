use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::model::{DeliveryId, DriverId, GeoPoint};
use crate::utils::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub driver_id: DriverId,
    pub delivery_id: Option<DeliveryId>,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Concurrent map of driver id to latest [`LocationSample`].
///
/// Backed by a sharded `DashMap`, so writers for different drivers rarely
/// contend. Cloning yields another handle to the same cache.
#[derive(Debug, Clone)]
pub struct LocationCache {
    samples: Arc<DashMap<DriverId, LocationSample>>,
    staleness: Duration,
}

impl LocationCache {
    pub const DEFAULT_STALENESS_SECS: i64 = 300;

    pub fn new(staleness: Duration) -> Self {
        Self {
            samples: Arc::new(DashMap::new()),
            staleness,
        }
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    /// Record `sample` for `driver_id`.
    ///
    /// Out-of-range coordinates are rejected. A sample older than the one
    /// already stored is ignored, so concurrent writers converge on the
    /// most recent position regardless of arrival order.
    pub fn set(&self, driver_id: &str, mut sample: LocationSample) -> Result<()> {
        sample.point().validate()?;
        sample.driver_id = driver_id.to_string();

        match self.samples.entry(driver_id.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().captured_at <= sample.captured_at {
                    existing.insert(sample);
                } else {
                    debug!(driver_id, "ignoring out-of-order location sample");
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(sample);
            }
        }
        Ok(())
    }

    pub fn get(&self, driver_id: &str) -> Option<LocationSample> {
        self.get_at(driver_id, Utc::now())
    }

    /// Like [`get`](Self::get), evaluating staleness against `now`.
    pub fn get_at(&self, driver_id: &str, now: DateTime<Utc>) -> Option<LocationSample> {
        let sample = self.samples.get(driver_id)?;
        if now - sample.captured_at > self.staleness {
            return None;
        }
        Some(sample.clone())
    }

    /// Drop entries older than the staleness window. Returns how many were
    /// removed.
    pub fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        let before = self.samples.len();
        self.samples
            .retain(|_, sample| now - sample.captured_at <= self.staleness);
        before.saturating_sub(self.samples.len())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new(Duration::seconds(Self::DEFAULT_STALENESS_SECS))
    }
}
