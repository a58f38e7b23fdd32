use super::*;
use crate::broker::{ChannelBroker, Event, EventKind, TopicKey, TopicKind};
use crate::config::Settings;
use crate::dispatch::DispatchEngine;
use crate::location::LocationCache;
use crate::model::{
    Delivery, DeliveryStatus, DeliveryType, DriverStatus, GeoPoint, Role, VehicleType,
};
use crate::persistence::{DeliveryStore, SledStore};
use crate::registry::{ChannelSink, ConnectionRegistry};
use crate::utils::DispatchError;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn gateway() -> RealtimeGateway {
    let registry = ConnectionRegistry::new(32, Duration::from_secs(1));
    let engine = DispatchEngine::new(
        Arc::new(SledStore::temporary().unwrap()),
        ChannelBroker::new(registry.clone()),
        LocationCache::default(),
        Settings::default().pricing,
    );
    RealtimeGateway::new(registry, Arc::new(engine))
}

async fn seed(gateway: &RealtimeGateway, status: DeliveryStatus, driver: Option<&str>) {
    let delivery = Delivery {
        id: "del-1".into(),
        status,
        delivery_type: DeliveryType::Simple,
        vehicle_type: VehicleType::Moto,
        client_id: "client-1".into(),
        driver_id: driver.map(str::to_string),
        pickup: GeoPoint { latitude: 0.0, longitude: 0.0 },
        dropoff: GeoPoint { latitude: 0.05, longitude: 0.0 },
        price: 1250.0,
        distance_km: 5.56,
        waiting_minutes: 0,
        promo_code: None,
        created_at: Utc::now(),
        assigned_at: driver.map(|_| Utc::now()),
    };
    gateway.engine().store().insert_delivery(&delivery).await.unwrap();
}

/// Open a session and consume its `connection` greeting.
async fn connect(
    gateway: &RealtimeGateway,
    who: &str,
    role: Role,
) -> (String, mpsc::UnboundedReceiver<String>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = gateway.open(who, role, Arc::new(ChannelSink::new(tx)));
    let hello = next_event(&mut rx).await;
    assert_eq!(hello.kind, EventKind::Connection);
    assert_eq!(hello.data["sessionId"], id.as_str());
    (id, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> Event {
    let raw = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn test_access_table() {
    assert_eq!(access(Role::Client, TopicKind::Chat), Access::OwnDelivery);
    assert_eq!(access(Role::Driver, TopicKind::Location), Access::OwnDelivery);
    assert_eq!(access(Role::Admin, TopicKind::Status), Access::AnyDelivery);
    assert_eq!(access(Role::Admin, TopicKind::Chat), Access::Denied);
    assert_eq!(access(Role::Admin, TopicKind::Notification), Access::OwnUser);
    assert_eq!(access(Role::Dispatcher, TopicKind::Status), Access::Denied);
}

#[test]
fn test_client_message_wire_shape() {
    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "location",
        "latitude": 4.05,
        "longitude": 9.7,
        "deliveryId": "del-1"
    }))
    .unwrap();
    assert_eq!(
        msg,
        ClientMessage::Location {
            latitude: 4.05,
            longitude: 9.7,
            delivery_id: Some("del-1".into()),
        }
    );

    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "subscribe",
        "topic": { "kind": "status", "scopeId": "del-1" }
    }))
    .unwrap();
    assert_eq!(msg, ClientMessage::Subscribe { topic: TopicKey::status("del-1") });

    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "transition",
        "deliveryId": "del-1",
        "status": "PICKED_UP"
    }))
    .unwrap();
    assert!(matches!(msg, ClientMessage::Transition { status: DeliveryStatus::PickedUp, .. }));

    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "request_delivery",
        "deliveryType": "EXPRESS",
        "vehicleType": "VOITURE",
        "pickup": { "latitude": 4.05, "longitude": 9.7 },
        "dropoff": { "latitude": 4.06, "longitude": 9.74 }
    }))
    .unwrap();
    assert!(matches!(
        msg,
        ClientMessage::RequestDelivery {
            delivery_type: DeliveryType::Express,
            waiting_minutes: 0,
            promo_code: None,
            ..
        }
    ));

    let msg: ClientMessage =
        serde_json::from_value(json!({ "type": "availability", "status": "ONLINE" })).unwrap();
    assert_eq!(
        msg,
        ClientMessage::Availability { status: DriverStatus::Online, vehicle_type: None }
    );

    assert!(serde_json::from_value::<ClientMessage>(json!({ "type": "publish" })).is_err());
}

#[test]
fn test_token_roundtrip() {
    let authority = TokenAuthority::new("secret");
    let token = authority
        .issue("driver-1", Role::Driver, chrono::Duration::hours(1))
        .unwrap();
    let claims = authority.verify(&token).unwrap();
    assert_eq!(claims.sub, "driver-1");
    assert_eq!(claims.role, Role::Driver);

    assert!(TokenAuthority::new("other").verify(&token).is_err());
    assert!(authority.verify("not-a-token").is_err());

    let expired = authority
        .issue("driver-1", Role::Driver, chrono::Duration::hours(-1))
        .unwrap();
    assert!(authority.verify(&expired).is_err());
}

#[tokio::test]
async fn test_subscribe_own_delivery_only() {
    let gateway = gateway();
    seed(&gateway, DeliveryStatus::Accepted, Some("driver-1")).await;

    let (owner, _rx) = connect(&gateway, "client-1", Role::Client).await;
    gateway.subscribe(&owner, &TopicKey::status("del-1")).await.unwrap();
    gateway.subscribe(&owner, &TopicKey::chat("del-1")).await.unwrap();

    let (driver, _rx_d) = connect(&gateway, "driver-1", Role::Driver).await;
    gateway.subscribe(&driver, &TopicKey::location("del-1")).await.unwrap();

    let (stranger, _rx_s) = connect(&gateway, "client-2", Role::Client).await;
    let err = gateway
        .subscribe(&stranger, &TopicKey::status("del-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::SubscriptionDenied(_)));

    let other_driver = connect(&gateway, "driver-2", Role::Driver).await.0;
    assert!(gateway.subscribe(&other_driver, &TopicKey::chat("del-1")).await.is_err());

    assert_eq!(gateway.registry().subscriber_count(&TopicKey::status("del-1")), 1);
}

#[tokio::test]
async fn test_notification_topic_is_private() {
    let gateway = gateway();
    let (id, _rx) = connect(&gateway, "client-1", Role::Client).await;
    gateway
        .subscribe(&id, &TopicKey::notification("client-1"))
        .await
        .unwrap();
    let err = gateway
        .subscribe(&id, &TopicKey::notification("client-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::SubscriptionDenied(_)));
}

#[tokio::test]
async fn test_admin_observes_any_existing_delivery() {
    let gateway = gateway();
    seed(&gateway, DeliveryStatus::Requested, None).await;
    let (admin, _rx) = connect(&gateway, "admin-1", Role::Admin).await;

    gateway.subscribe(&admin, &TopicKey::status("del-1")).await.unwrap();
    assert!(matches!(
        gateway.subscribe(&admin, &TopicKey::status("ghost")).await,
        Err(DispatchError::NotFound(_))
    ));
    assert!(matches!(
        gateway.subscribe(&admin, &TopicKey::chat("del-1")).await,
        Err(DispatchError::SubscriptionDenied(_))
    ));
}

#[tokio::test]
async fn test_bad_messages_are_answered_with_error_events() {
    let gateway = gateway();
    let (id, mut rx) = connect(&gateway, "client-1", Role::Client).await;

    gateway.handle_text(&id, "{not json").await;
    let err = next_event(&mut rx).await;
    assert_eq!(err.kind, EventKind::Error);
    assert_eq!(err.data["kind"], "validation");

    gateway
        .handle_text(&id, r#"{"type":"location","latitude":1.0,"longitude":1.0}"#)
        .await;
    let err = next_event(&mut rx).await;
    assert_eq!(err.kind, EventKind::Error);

    gateway.handle_text(&id, r#"{"type":"auth","token":"x"}"#).await;
    assert_eq!(next_event(&mut rx).await.kind, EventKind::Error);

    // the session survives all of it
    assert!(gateway.registry().session(&id).is_ok());
}

#[tokio::test]
async fn test_driver_location_reaches_client() {
    let gateway = gateway();
    seed(&gateway, DeliveryStatus::Accepted, Some("driver-1")).await;
    let (client, mut client_rx) = connect(&gateway, "client-1", Role::Client).await;
    gateway.subscribe(&client, &TopicKey::location("del-1")).await.unwrap();
    let (driver, _driver_rx) = connect(&gateway, "driver-1", Role::Driver).await;

    gateway
        .handle_text(
            &driver,
            r#"{"type":"location","latitude":0.01,"longitude":0.0,"deliveryId":"del-1"}"#,
        )
        .await;
    let event = next_event(&mut client_rx).await;
    assert_eq!(event.kind, EventKind::Location);
    assert_eq!(event.data["driverId"], "driver-1");
    assert!(event.data["etaMinutes"].as_u64().is_some());
}

#[tokio::test]
async fn test_quote_over_the_gateway() {
    let gateway = gateway();
    let (id, mut rx) = connect(&gateway, "client-1", Role::Client).await;

    gateway
        .handle_text(
            &id,
            r#"{"type":"quote","vehicleType":"MOTO","distanceKm":5.0,"deliveryType":"SIMPLE"}"#,
        )
        .await;
    let event = next_event(&mut rx).await;
    assert_eq!(event.kind, EventKind::Quote);
    assert_eq!(event.data["calculation"]["total"], 1250.0);
    assert!(event.data["promoError"].is_null());

    gateway
        .handle_text(
            &id,
            r#"{"type":"quote","vehicleType":"BUS","distanceKm":5.0,"deliveryType":"SIMPLE"}"#,
        )
        .await;
    assert_eq!(next_event(&mut rx).await.kind, EventKind::Error);
}

#[tokio::test]
async fn test_transition_message_publishes_status() {
    let gateway = gateway();
    seed(&gateway, DeliveryStatus::Assigned, Some("driver-1")).await;
    let (client, mut client_rx) = connect(&gateway, "client-1", Role::Client).await;
    gateway.subscribe(&client, &TopicKey::status("del-1")).await.unwrap();
    let (driver, _rx) = connect(&gateway, "driver-1", Role::Driver).await;

    gateway
        .handle_text(&driver, r#"{"type":"transition","deliveryId":"del-1","status":"ACCEPTED"}"#)
        .await;
    let event = next_event(&mut client_rx).await;
    assert_eq!(event.kind, EventKind::Status);
    assert_eq!(event.data["status"], "ACCEPTED");

    // the client may not pick up the parcel
    gateway
        .handle_text(&client, r#"{"type":"transition","deliveryId":"del-1","status":"PICKED_UP"}"#)
        .await;
    let err = next_event(&mut client_rx).await;
    assert_eq!(err.kind, EventKind::Error);
    assert_eq!(err.data["kind"], "conflict");
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let gateway = gateway();
    let (a, _rx_a) = connect(&gateway, "client-1", Role::Client).await;
    let (_b, _rx_b) = connect(&gateway, "driver-1", Role::Driver).await;
    assert!(gateway.close(&a));
    assert_eq!(gateway.shutdown(), 1);
    assert!(gateway.registry().is_empty());
}

#[tokio::test]
async fn test_client_requests_and_admin_assigns_over_the_gateway() {
    let gateway = gateway();
    let (client, mut client_rx) = connect(&gateway, "client-1", Role::Client).await;
    gateway
        .handle_text(
            &client,
            r#"{"type":"request_delivery","deliveryType":"SIMPLE","vehicleType":"MOTO",
                "pickup":{"latitude":0.0,"longitude":0.0},
                "dropoff":{"latitude":0.05,"longitude":0.0}}"#,
        )
        .await;
    let created = next_event(&mut client_rx).await;
    assert_eq!(created.kind, EventKind::Delivery);
    assert_eq!(created.data["delivery"]["status"], "REQUESTED");
    assert_eq!(created.data["delivery"]["clientId"], "client-1");
    assert!(created.data["calculation"]["total"].as_f64().unwrap() > 0.0);
    let delivery_id = created.data["delivery"]["id"].as_str().unwrap().to_string();

    let (driver, mut driver_rx) = connect(&gateway, "driver-1", Role::Driver).await;
    gateway
        .handle_text(&driver, r#"{"type":"availability","status":"ONLINE","vehicleType":"MOTO"}"#)
        .await;
    let roster = next_event(&mut driver_rx).await;
    assert_eq!(roster.kind, EventKind::Driver);
    assert_eq!(roster.data["driver"]["status"], "ONLINE");

    // a client cannot assign its own delivery
    let assign = json!({ "type": "assign", "deliveryId": delivery_id, "driverId": "driver-1" });
    gateway.handle_text(&client, &assign.to_string()).await;
    assert_eq!(next_event(&mut client_rx).await.kind, EventKind::Error);

    let (admin, mut admin_rx) = connect(&gateway, "admin-1", Role::Admin).await;
    gateway.handle_text(&admin, &assign.to_string()).await;
    let assigned = next_event(&mut admin_rx).await;
    assert_eq!(assigned.kind, EventKind::Delivery);
    assert_eq!(assigned.data["delivery"]["status"], "ASSIGNED");
    assert_eq!(assigned.data["delivery"]["driverId"], "driver-1");

    // busy drivers cannot change their own availability
    gateway
        .handle_text(&driver, r#"{"type":"availability","status":"OFFLINE"}"#)
        .await;
    let err = next_event(&mut driver_rx).await;
    assert_eq!(err.kind, EventKind::Error);
    assert_eq!(err.data["kind"], "validation");
}

#[tokio::test]
async fn test_auto_assign_message_is_admin_only() {
    let gateway = gateway();
    seed(&gateway, DeliveryStatus::Requested, None).await;

    let (driver, mut driver_rx) = connect(&gateway, "driver-1", Role::Driver).await;
    gateway
        .handle_text(&driver, r#"{"type":"availability","status":"AVAILABLE","vehicleType":"VOITURE"}"#)
        .await;
    assert_eq!(next_event(&mut driver_rx).await.kind, EventKind::Driver);
    gateway
        .handle_text(&driver, r#"{"type":"location","latitude":0.01,"longitude":0.0}"#)
        .await;

    let (client, mut client_rx) = connect(&gateway, "client-1", Role::Client).await;
    gateway
        .handle_text(&client, r#"{"type":"auto_assign","deliveryId":"del-1"}"#)
        .await;
    let err = next_event(&mut client_rx).await;
    assert_eq!(err.kind, EventKind::Error);
    assert_eq!(err.data["kind"], "validation");

    let (admin, mut admin_rx) = connect(&gateway, "admin-1", Role::Admin).await;
    gateway
        .handle_text(&admin, r#"{"type":"auto_assign","deliveryId":"del-1"}"#)
        .await;
    let assigned = next_event(&mut admin_rx).await;
    assert_eq!(assigned.kind, EventKind::Delivery);
    assert_eq!(assigned.data["delivery"]["driverId"], "driver-1");

    // already assigned
    gateway
        .handle_text(&admin, r#"{"type":"auto_assign","deliveryId":"del-1"}"#)
        .await;
    assert_eq!(next_event(&mut admin_rx).await.data["kind"], "conflict");
}

#[tokio::test]
async fn test_track_returns_delivery_and_eta_to_parties() {
    let gateway = gateway();
    seed(&gateway, DeliveryStatus::Accepted, Some("driver-1")).await;
    let (driver, _driver_rx) = connect(&gateway, "driver-1", Role::Driver).await;
    gateway
        .handle_text(
            &driver,
            r#"{"type":"location","latitude":0.01,"longitude":0.0,"deliveryId":"del-1"}"#,
        )
        .await;

    let (client, mut client_rx) = connect(&gateway, "client-1", Role::Client).await;
    gateway
        .handle_text(&client, r#"{"type":"track","deliveryId":"del-1"}"#)
        .await;
    let tracked = next_event(&mut client_rx).await;
    assert_eq!(tracked.kind, EventKind::Delivery);
    assert_eq!(tracked.data["delivery"]["status"], "ACCEPTED");
    assert!(tracked.data["etaMinutes"].as_u64().is_some());

    let (stranger, mut stranger_rx) = connect(&gateway, "client-2", Role::Client).await;
    gateway
        .handle_text(&stranger, r#"{"type":"track","deliveryId":"del-1"}"#)
        .await;
    assert_eq!(next_event(&mut stranger_rx).await.kind, EventKind::Error);
}

#[tokio::test]
async fn test_availability_is_for_drivers_only() {
    let gateway = gateway();
    let (client, mut rx) = connect(&gateway, "client-1", Role::Client).await;
    gateway
        .handle_text(&client, r#"{"type":"availability","status":"ONLINE","vehicleType":"MOTO"}"#)
        .await;
    assert_eq!(next_event(&mut rx).await.kind, EventKind::Error);

    let (driver, mut driver_rx) = connect(&gateway, "driver-1", Role::Driver).await;
    // unknown driver without a vehicle
    gateway
        .handle_text(&driver, r#"{"type":"availability","status":"ONLINE"}"#)
        .await;
    assert_eq!(next_event(&mut driver_rx).await.kind, EventKind::Error);
    gateway
        .handle_text(&driver, r#"{"type":"availability","status":"BUSY","vehicleType":"MOTO"}"#)
        .await;
    assert_eq!(next_event(&mut driver_rx).await.kind, EventKind::Error);
    assert!(gateway
        .engine()
        .store()
        .list_available_drivers(VehicleType::Moto)
        .await
        .unwrap()
        .is_empty());
}
