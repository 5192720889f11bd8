//! Canonical callers and documents shared by the integration tests.

use rideshear_rules::{FieldValue, Fields};
use serde_json::{json, Value};

pub struct MockUser {
    pub uid: &'static str,
    pub email: &'static str,
}

pub const MOCK_USER: MockUser = MockUser {
    uid: "user1",
    email: "test@example.com",
};

pub const MOCK_DRIVER: MockUser = MockUser {
    uid: "driver1",
    email: "driver@example.com",
};

/// Turns a `json!` object literal into [`Fields`]; anything else yields an
/// empty map.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

pub fn mock_user_data() -> Fields {
    fields(json!({
        "name": "John Doe",
        "email": MOCK_USER.email,
        "userType": "rider",
        "createdAt": FieldValue::server_timestamp(),
    }))
}

pub fn mock_ride_data() -> Fields {
    fields(json!({
        "riderId": MOCK_USER.uid,
        "pickupAddress": "123 Main St",
        "destinationAddress": "456 Oak Ave",
        "status": "requested",
        "rideType": "standard",
        "estimatedFare": 15.5,
        "requestTime": FieldValue::server_timestamp(),
    }))
}

/// Ride already accepted by [`MOCK_DRIVER`].
pub fn accepted_ride_data() -> Fields {
    let mut ride = mock_ride_data();
    ride.insert("driverId".into(), json!(MOCK_DRIVER.uid));
    ride.insert("status".into(), json!("accepted"));
    ride
}

pub fn mock_report_data(reporter: &str) -> Fields {
    fields(json!({
        "reporterId": reporter,
        "reportedUserId": MOCK_DRIVER.uid,
        "reason": "inappropriate_behavior",
        "description": "Driver was rude",
        "timestamp": FieldValue::server_timestamp(),
    }))
}

pub fn mock_message_data(sender: &str, text: &str) -> Fields {
    fields(json!({
        "senderId": sender,
        "message": text,
        "timestamp": FieldValue::server_timestamp(),
    }))
}
