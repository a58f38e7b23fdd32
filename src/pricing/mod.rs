//! Price calculation.
//!
//! [`price`] is pure: the promo record (if any) is resolved by the caller
//! and passed in. An unusable promo code never fails the calculation; the
//! returned [`Quote`] carries the undiscounted price together with the
//! [`DispatchError::PromoInvalid`] explaining why no discount was applied.

pub mod fares;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PricingSettings;
use crate::model::{DeliveryType, Discount, Promo, VehicleType};
use crate::utils::{DispatchError, Result};

pub use fares::{Fare, fare_for};

/// Input of a price query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuery {
    pub vehicle_type: VehicleType,
    pub distance_km: f64,
    pub waiting_minutes: i64,
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub promo_code: Option<String>,
}

impl PriceQuery {
    /// Build a query from untyped fields, as received from a form or CLI.
    pub fn parse(
        vehicle_type: &str,
        distance_km: f64,
        waiting_minutes: i64,
        delivery_type: &str,
        promo_code: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            vehicle_type: vehicle_type.parse()?,
            distance_km,
            waiting_minutes,
            delivery_type: delivery_type.parse()?,
            promo_code: promo_code.filter(|c| !c.trim().is_empty()),
        })
    }

    fn validate(&self) -> Result<()> {
        if !self.distance_km.is_finite() || self.distance_km <= 0.0 {
            return Err(DispatchError::invalid_input("distance must be > 0"));
        }
        if self.waiting_minutes < 0 {
            return Err(DispatchError::invalid_input("waiting time must be >= 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceCalculation {
    pub base_fare: f64,
    pub distance_fare: f64,
    pub waiting_fare: f64,
    pub type_surcharge: f64,
    pub discount: f64,
    pub total: f64,
}

/// Result of a price query.
#[derive(Debug)]
pub struct Quote {
    pub calculation: PriceCalculation,
    /// Set when a promo code was supplied but could not be applied.
    pub promo_error: Option<DispatchError>,
}

fn round_units(amount: f64) -> f64 {
    amount.round()
}

/// Compute the price of `query`.
///
/// `promo` is the record stored under `query.promo_code`, or `None` when
/// the code is unknown.
pub fn price(
    settings: &PricingSettings,
    query: &PriceQuery,
    promo: Option<&Promo>,
    now: DateTime<Utc>,
) -> Result<Quote> {
    query.validate()?;

    let fare = fare_for(query.vehicle_type, query.delivery_type);
    let base_fare = round_units(fare.base);
    let distance_fare = round_units(fare.per_km * query.distance_km);
    let billable_waiting = (query.waiting_minutes - i64::from(settings.free_waiting_minutes)).max(0);
    let waiting_fare = round_units(billable_waiting as f64 * settings.waiting_rate_per_minute);
    let type_surcharge = round_units((base_fare + distance_fare) * fare.surcharge_rate);
    let subtotal = base_fare + distance_fare + waiting_fare + type_surcharge;

    let (discount, promo_error) = match query.promo_code.as_deref() {
        None => (0.0, None),
        Some(code) => match promo {
            None => (0.0, Some(DispatchError::PromoInvalid(format!("unknown code '{code}'")))),
            Some(p) => match p.rejection(now) {
                Some(reason) => (0.0, Some(DispatchError::PromoInvalid(format!("{code} {reason}")))),
                None => (discount_amount(p.discount, subtotal), None),
            },
        },
    };

    Ok(Quote {
        calculation: PriceCalculation {
            base_fare,
            distance_fare,
            waiting_fare,
            type_surcharge,
            discount,
            total: (subtotal - discount).max(0.0),
        },
        promo_error,
    })
}

fn discount_amount(discount: Discount, subtotal: f64) -> f64 {
    let raw = match discount {
        Discount::Percentage(pct) => round_units(subtotal * pct.clamp(0.0, 100.0) / 100.0),
        Discount::Fixed(amount) => round_units(amount.max(0.0)),
    };
    raw.min(subtotal)
}

#[cfg(test)]
mod tests;
