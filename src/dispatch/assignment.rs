//! Nearest-driver selection.
//!
//! Candidates must accept work, drive a vehicle able to serve the request
//! and have a non-stale position. The closest one wins; ties go to the
//! most recent position fix, then to the lexicographically smallest driver
//! id so the choice is deterministic.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::geo;
use crate::location::LocationCache;
use crate::model::{Driver, DriverId, GeoPoint, VehicleType};
use crate::utils::{DispatchError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub driver_id: DriverId,
    pub distance_km: f64,
    pub located_at: DateTime<Utc>,
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| b.located_at.cmp(&a.located_at))
        .then_with(|| a.driver_id.cmp(&b.driver_id))
}

/// Every eligible driver with its distance to `pickup`, best first.
pub fn rank_candidates(
    drivers: &[Driver],
    locations: &LocationCache,
    pickup: &GeoPoint,
    vehicle: VehicleType,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = drivers
        .iter()
        .filter(|d| d.status.accepts_work() && d.vehicle_type.can_serve(vehicle))
        .filter_map(|d| {
            let sample = locations.get_at(&d.id, now)?;
            Some(Candidate {
                driver_id: d.id.clone(),
                distance_km: geo::distance_between(&sample.point(), pickup),
                located_at: sample.captured_at,
            })
        })
        .collect();
    candidates.sort_by(rank);
    candidates
}

/// The best candidate, or [`DispatchError::NoDriverAvailable`].
pub fn select_driver(
    drivers: &[Driver],
    locations: &LocationCache,
    pickup: &GeoPoint,
    vehicle: VehicleType,
    now: DateTime<Utc>,
) -> Result<Candidate> {
    rank_candidates(drivers, locations, pickup, vehicle, now)
        .into_iter()
        .next()
        .ok_or(DispatchError::NoDriverAvailable)
}
