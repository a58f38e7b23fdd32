use super::*;
use chrono::{Duration, Utc};

#[test]
fn geo_point_rejects_out_of_range() {
    assert!(GeoPoint::new(4.05, 9.7).is_ok());
    assert!(GeoPoint::new(90.0, -180.0).is_ok());
    assert!(matches!(
        GeoPoint::new(90.5, 0.0),
        Err(DispatchError::InvalidCoordinate { .. })
    ));
    assert!(matches!(
        GeoPoint::new(0.0, 181.0),
        Err(DispatchError::InvalidCoordinate { .. })
    ));
    assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
}

#[test]
fn status_driver_presence_matches_invariant() {
    assert!(!DeliveryStatus::Requested.has_driver());
    assert!(DeliveryStatus::Assigned.has_driver());
    assert!(DeliveryStatus::Delivered.has_driver());
    assert!(!DeliveryStatus::Cancelled.has_driver());
}

#[test]
fn enums_use_wire_names() {
    let json = serde_json::to_string(&DeliveryStatus::PickedUp).unwrap();
    assert_eq!(json, "\"PICKED_UP\"");
    let vehicle: VehicleType = serde_json::from_str("\"CAMIONNETTE\"").unwrap();
    assert_eq!(vehicle, VehicleType::Camionnette);
    assert_eq!("demenagement".parse::<DeliveryType>().unwrap(), DeliveryType::Demenagement);
    assert!("BICYCLE".parse::<VehicleType>().is_err());
    assert_eq!("Driver".parse::<Role>().unwrap(), Role::Driver);
}

#[test]
fn vehicle_compatibility_is_by_capacity() {
    assert!(VehicleType::Moto.can_serve(VehicleType::Moto));
    assert!(VehicleType::Camionnette.can_serve(VehicleType::Voiture));
    assert!(!VehicleType::Moto.can_serve(VehicleType::Voiture));
    assert!(!VehicleType::Voiture.can_serve(VehicleType::Camionnette));
}

#[test]
fn promo_rejection_reasons() {
    let now = Utc::now();
    let mut promo = Promo {
        code: "WELCOME".into(),
        discount: Discount::Percentage(10.0),
        expires_at: Some(now + Duration::days(1)),
        remaining_uses: 3,
    };
    assert_eq!(promo.rejection(now), None);

    promo.remaining_uses = 0;
    assert_eq!(promo.rejection(now), Some("exhausted"));

    promo.remaining_uses = 3;
    promo.expires_at = Some(now - Duration::seconds(1));
    assert_eq!(promo.rejection(now), Some("expired"));
}
