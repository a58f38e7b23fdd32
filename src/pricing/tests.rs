use super::*;
use crate::config::Settings;
use chrono::Duration;

fn settings() -> PricingSettings {
    Settings::default().pricing
}

fn query(vehicle: VehicleType, km: f64, waiting: i64, kind: DeliveryType) -> PriceQuery {
    PriceQuery {
        vehicle_type: vehicle,
        distance_km: km,
        waiting_minutes: waiting,
        delivery_type: kind,
        promo_code: None,
    }
}

fn promo(discount: Discount, uses: u32) -> Promo {
    Promo {
        code: "PROMO".into(),
        discount,
        expires_at: Some(Utc::now() + Duration::days(7)),
        remaining_uses: uses,
    }
}

#[test]
fn moto_simple_five_km_matches_fare_table() {
    let q = query(VehicleType::Moto, 5.0, 0, DeliveryType::Simple);
    let quote = price(&settings(), &q, None, Utc::now()).unwrap();
    let calc = quote.calculation;
    assert_eq!(calc.base_fare, 500.0);
    assert_eq!(calc.distance_fare, 750.0);
    assert_eq!(calc.waiting_fare, 0.0);
    assert_eq!(calc.type_surcharge, 0.0);
    assert_eq!(calc.discount, 0.0);
    assert_eq!(calc.total, 1250.0);
    assert!(quote.promo_error.is_none());
}

#[test]
fn express_costs_more_than_simple() {
    let s = settings();
    let simple = price(&s, &query(VehicleType::Voiture, 8.0, 0, DeliveryType::Simple), None, Utc::now())
        .unwrap()
        .calculation;
    let express = price(&s, &query(VehicleType::Voiture, 8.0, 0, DeliveryType::Express), None, Utc::now())
        .unwrap()
        .calculation;
    // (1000 + 2000) * 0.5
    assert_eq!(express.type_surcharge, 1500.0);
    assert_eq!(express.total, simple.total + 1500.0);
}

#[test]
fn groupee_and_demenagement_use_their_own_tables() {
    let s = settings();
    let groupee = price(&s, &query(VehicleType::Moto, 5.0, 0, DeliveryType::Groupee), None, Utc::now())
        .unwrap()
        .calculation;
    assert_eq!(groupee.total, 400.0 + 600.0);

    let moving = price(
        &s,
        &query(VehicleType::Camionnette, 10.0, 0, DeliveryType::Demenagement),
        None,
        Utc::now(),
    )
    .unwrap()
    .calculation;
    assert_eq!(moving.total, 5000.0 + 6000.0);
}

#[test]
fn waiting_is_billed_above_free_allowance() {
    let s = settings();
    let within = price(&s, &query(VehicleType::Moto, 5.0, 5, DeliveryType::Simple), None, Utc::now())
        .unwrap()
        .calculation;
    assert_eq!(within.waiting_fare, 0.0);

    let over = price(&s, &query(VehicleType::Moto, 5.0, 12, DeliveryType::Simple), None, Utc::now())
        .unwrap()
        .calculation;
    assert_eq!(over.waiting_fare, 7.0 * 50.0);
    assert_eq!(over.total, 1250.0 + 350.0);
}

#[test]
fn invalid_inputs_are_rejected() {
    let s = settings();
    for q in [
        query(VehicleType::Moto, 0.0, 0, DeliveryType::Simple),
        query(VehicleType::Moto, -2.0, 0, DeliveryType::Simple),
        query(VehicleType::Moto, 3.0, -1, DeliveryType::Simple),
    ] {
        let err = price(&s, &q, None, Utc::now()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidInput(_)), "{err}");
    }
    assert!(matches!(
        PriceQuery::parse("TROTTINETTE", 3.0, 0, "SIMPLE", None),
        Err(DispatchError::InvalidInput(_))
    ));
    assert!(matches!(
        PriceQuery::parse("MOTO", 3.0, 0, "URGENT", None),
        Err(DispatchError::InvalidInput(_))
    ));
}

#[test]
fn percentage_and_fixed_promos_apply() {
    let s = settings();
    let mut q = query(VehicleType::Moto, 5.0, 0, DeliveryType::Simple);
    q.promo_code = Some("PROMO".into());

    let pct = promo(Discount::Percentage(10.0), 3);
    let quote = price(&s, &q, Some(&pct), Utc::now()).unwrap();
    assert!(quote.promo_error.is_none());
    assert_eq!(quote.calculation.discount, 125.0);
    assert_eq!(quote.calculation.total, 1125.0);

    let fixed = promo(Discount::Fixed(300.0), 1);
    let quote = price(&s, &q, Some(&fixed), Utc::now()).unwrap();
    assert_eq!(quote.calculation.total, 950.0);
}

#[test]
fn discount_never_makes_total_negative() {
    let mut q = query(VehicleType::Moto, 1.0, 0, DeliveryType::Simple);
    q.promo_code = Some("PROMO".into());
    let huge = promo(Discount::Fixed(100_000.0), 1);
    let quote = price(&settings(), &q, Some(&huge), Utc::now()).unwrap();
    assert_eq!(quote.calculation.discount, 650.0);
    assert_eq!(quote.calculation.total, 0.0);
}

#[test]
fn exhausted_promo_is_reported_and_total_is_undiscounted() {
    let mut q = query(VehicleType::Moto, 5.0, 0, DeliveryType::Simple);
    q.promo_code = Some("PROMO".into());
    let spent = promo(Discount::Percentage(50.0), 0);

    let quote = price(&settings(), &q, Some(&spent), Utc::now()).unwrap();
    assert!(matches!(quote.promo_error, Some(DispatchError::PromoInvalid(_))));
    assert_eq!(quote.calculation.discount, 0.0);
    assert_eq!(quote.calculation.total, 1250.0);
}

#[test]
fn unknown_and_expired_promos_are_reported() {
    let mut q = query(VehicleType::Moto, 5.0, 0, DeliveryType::Simple);
    q.promo_code = Some("NOPE".into());
    let quote = price(&settings(), &q, None, Utc::now()).unwrap();
    assert!(matches!(quote.promo_error, Some(DispatchError::PromoInvalid(_))));

    let mut expired = promo(Discount::Percentage(10.0), 5);
    expired.expires_at = Some(Utc::now() - Duration::hours(1));
    let quote = price(&settings(), &q, Some(&expired), Utc::now()).unwrap();
    assert!(quote.promo_error.is_some());
    assert_eq!(quote.calculation.total, 1250.0);
}
