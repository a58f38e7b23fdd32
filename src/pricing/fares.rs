//! Fare tables.
//!
//! Amounts are whole currency units. SIMPLE and EXPRESS share the standard
//! table and differ only by the surcharge rate; GROUPEE and DEMENAGEMENT
//! have their own tables.

use crate::model::{DeliveryType, VehicleType};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fare {
    pub base: f64,
    pub per_km: f64,
    /// Fraction of `base + distance` added on top.
    pub surcharge_rate: f64,
}

const fn fare(base: f64, per_km: f64, surcharge_rate: f64) -> Fare {
    Fare {
        base,
        per_km,
        surcharge_rate,
    }
}

const EXPRESS_SURCHARGE: f64 = 0.5;

pub fn fare_for(vehicle: VehicleType, delivery: DeliveryType) -> Fare {
    use DeliveryType::*;
    use VehicleType::*;

    match (delivery, vehicle) {
        (Simple, Moto) => fare(500.0, 150.0, 0.0),
        (Simple, Voiture) => fare(1000.0, 250.0, 0.0),
        (Simple, Camionnette) => fare(2000.0, 400.0, 0.0),

        (Express, Moto) => fare(500.0, 150.0, EXPRESS_SURCHARGE),
        (Express, Voiture) => fare(1000.0, 250.0, EXPRESS_SURCHARGE),
        (Express, Camionnette) => fare(2000.0, 400.0, EXPRESS_SURCHARGE),

        (Groupee, Moto) => fare(400.0, 120.0, 0.0),
        (Groupee, Voiture) => fare(800.0, 200.0, 0.0),
        (Groupee, Camionnette) => fare(1600.0, 320.0, 0.0),

        (Demenagement, Moto) => fare(1500.0, 300.0, 0.0),
        (Demenagement, Voiture) => fare(3000.0, 450.0, 0.0),
        (Demenagement, Camionnette) => fare(5000.0, 600.0, 0.0),
    }
}
