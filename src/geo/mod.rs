//! Great-circle distance and arrival-time estimates.
//!
//! Pure functions, safe to call from any task.

use crate::model::GeoPoint;
use crate::utils::{DispatchError, Result};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two positions.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // clamp guards against a > 1.0 from rounding on antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

pub fn distance_between(a: &GeoPoint, b: &GeoPoint) -> f64 {
    distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Minutes needed to cover `distance_km` at `avg_speed_kmh`, rounded up to
/// the next whole minute.
pub fn eta_minutes(distance_km: f64, avg_speed_kmh: f64) -> Result<u32> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return Err(DispatchError::invalid_input("distance must be >= 0"));
    }
    if !avg_speed_kmh.is_finite() || avg_speed_kmh <= 0.0 {
        return Err(DispatchError::invalid_input("average speed must be > 0"));
    }
    let minutes = distance_km / avg_speed_kmh * 60.0;
    // 1e-9 keeps exact multiples (e.g. 15.000000000000002) from rounding up
    Ok((minutes - 1e-9).ceil().max(0.0) as u32)
}
