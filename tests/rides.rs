// Ride requests under rides/{rideId}: creation, acceptance and status flow.
use rideshear::fixtures::{accepted_ride_data, fields, mock_ride_data, MOCK_DRIVER, MOCK_USER};
use rideshear::rules::{DenyReason, FieldValue, Fields};
use rideshear::{assert_fails, assert_succeeds, TestEnvironment};
use serde_json::json;

const RIDE_ID: &str = "test-ride";

async fn seeded_with(ride: Fields) -> TestEnvironment {
    let env = TestEnvironment::new().expect("built-in policies");
    env.with_security_rules_disabled(|admin| async move {
        admin.collection("rides").doc(RIDE_ID)?.set(ride).await
    })
    .await
    .expect("seed ride");
    env
}

#[tokio::test]
async fn users_can_create_their_own_rides() {
    let env = TestEnvironment::new().unwrap();
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let ride = db.collection("rides").new_doc().unwrap();

    assert_succeeds(ride.set(mock_ride_data())).await;
    assert_eq!(env.store().list("rides").len(), 1);
}

#[tokio::test]
async fn users_cannot_create_rides_for_other_users() {
    let env = TestEnvironment::new().unwrap();
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let ride = db.collection("rides").new_doc().unwrap();

    let mut invalid = mock_ride_data();
    invalid.insert("riderId".into(), json!("other-user"));
    assert_fails(ride.set(invalid)).await;
}

#[tokio::test]
async fn invalid_ride_data_is_rejected() {
    let env = TestEnvironment::new().unwrap();
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let ride = db.collection("rides").new_doc().unwrap();

    let err = assert_fails(ride.set(fields(json!({
        "riderId": MOCK_USER.uid,
        "status": "invalid-status",
    }))))
    .await;
    assert!(matches!(err.reason(), Some(DenyReason::ValidationFailure { .. })));

    let mut negative_fare = mock_ride_data();
    negative_fare.insert("estimatedFare".into(), json!(-3));
    assert_fails(ride.set(negative_fare)).await;
}

#[tokio::test]
async fn new_rides_start_as_requested() {
    let env = TestEnvironment::new().unwrap();
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let ride = db.collection("rides").new_doc().unwrap();

    let mut pre_accepted = mock_ride_data();
    pre_accepted.insert("status".into(), json!("accepted"));
    assert_fails(ride.set(pre_accepted)).await;
}

#[tokio::test]
async fn drivers_can_read_available_rides() {
    let env = seeded_with(mock_ride_data()).await;
    let driver = env.authenticated_context(MOCK_DRIVER.uid, None);

    let ride = assert_succeeds(driver.collection("rides").doc(RIDE_ID).unwrap().get())
        .await
        .expect("ride stored");
    assert_eq!(ride["status"], json!("requested"));

    let anonymous = env.unauthenticated_context();
    assert_fails(anonymous.collection("rides").doc(RIDE_ID).unwrap().get()).await;
}

#[tokio::test]
async fn drivers_can_accept_rides() {
    let env = seeded_with(mock_ride_data()).await;
    let driver = env.authenticated_context(MOCK_DRIVER.uid, None);
    let ride = driver.collection("rides").doc(RIDE_ID).unwrap();

    assert_succeeds(ride.update(fields(json!({
        "driverId": MOCK_DRIVER.uid,
        "status": "accepted",
        "acceptTime": FieldValue::server_timestamp(),
    }))))
    .await;

    let stored = env.store().get(ride.path()).unwrap();
    assert_eq!(stored.fields["status"], json!("accepted"));
    assert_eq!(stored.fields["driverId"], json!(MOCK_DRIVER.uid));
    assert!(stored.fields["acceptTime"].is_string());
}

#[tokio::test]
async fn drivers_cannot_accept_on_behalf_of_someone_else() {
    let env = seeded_with(mock_ride_data()).await;
    let driver = env.authenticated_context(MOCK_DRIVER.uid, None);
    let ride = driver.collection("rides").doc(RIDE_ID).unwrap();

    assert_fails(ride.update(fields(json!({
        "driverId": "driver2",
        "status": "accepted",
    }))))
    .await;
}

#[tokio::test]
async fn accepted_rides_cannot_be_taken_over() {
    let env = seeded_with(accepted_ride_data()).await;
    let other_driver = env.authenticated_context("driver2", None);
    let ride = other_driver.collection("rides").doc(RIDE_ID).unwrap();

    assert_fails(ride.update(fields(json!({
        "driverId": "driver2",
        "status": "accepted",
    }))))
    .await;
}

#[tokio::test]
async fn participants_move_the_ride_along() {
    let env = seeded_with(accepted_ride_data()).await;
    let driver = env.authenticated_context(MOCK_DRIVER.uid, None);
    let ride = driver.collection("rides").doc(RIDE_ID).unwrap();

    assert_succeeds(ride.update(fields(json!({ "status": "arriving" })))).await;
    assert_fails(ride.update(fields(json!({ "status": "teleported" })))).await;
    assert_fails(ride.update(fields(json!({ "estimatedFare": 99 })))).await;
}

#[tokio::test]
async fn users_cannot_modify_core_ride_details() {
    let env = seeded_with(mock_ride_data()).await;
    let rider = env.authenticated_context(MOCK_USER.uid, None);
    let ride = rider.collection("rides").doc(RIDE_ID).unwrap();

    assert_fails(ride.update(fields(json!({ "pickupAddress": "Different Address" })))).await;
    assert_succeeds(ride.update(fields(json!({ "notes": "gate code 1234" })))).await;
}

#[tokio::test]
async fn rides_are_never_deleted() {
    let env = seeded_with(mock_ride_data()).await;
    let rider = env.authenticated_context(MOCK_USER.uid, None);

    assert_fails(rider.collection("rides").doc(RIDE_ID).unwrap().delete()).await;
    assert_eq!(env.store().len(), 1);
}
