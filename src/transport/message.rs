use serde::{Deserialize, Serialize};

use crate::broker::TopicKey;
use crate::model::{DeliveryStatus, DeliveryType, DriverStatus, GeoPoint, Role, VehicleType};

/// Messages a participant sends over its real-time connection.
///
/// The first message of a connection must be `auth`; everything else is
/// refused until then.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    Subscribe {
        topic: TopicKey,
    },
    Unsubscribe {
        topic: TopicKey,
    },
    /// Driver position, optionally tied to the delivery being driven.
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        delivery_id: Option<String>,
    },
    Chat {
        delivery_id: String,
        message: String,
    },
    /// Request a status change of a delivery.
    Transition {
        delivery_id: String,
        status: DeliveryStatus,
    },
    /// Enum values arrive as strings so that unknown ones are reported as
    /// invalid input rather than as unparseable JSON.
    Quote {
        vehicle_type: String,
        distance_km: f64,
        #[serde(default)]
        waiting_minutes: i64,
        delivery_type: String,
        #[serde(default)]
        promo_code: Option<String>,
    },
    /// A client asks for a new delivery; the client id is the sender's.
    RequestDelivery {
        delivery_type: DeliveryType,
        vehicle_type: VehicleType,
        pickup: GeoPoint,
        dropoff: GeoPoint,
        #[serde(default)]
        waiting_minutes: u32,
        #[serde(default)]
        promo_code: Option<String>,
    },
    Assign {
        delivery_id: String,
        driver_id: String,
    },
    AutoAssign {
        delivery_id: String,
    },
    /// A driver going online, available or offline.
    Availability {
        status: DriverStatus,
        #[serde(default)]
        vehicle_type: Option<VehicleType>,
    },
    /// Current record and ETA of a delivery.
    Track {
        delivery_id: String,
    },
}

/// JWT claims identifying a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}
