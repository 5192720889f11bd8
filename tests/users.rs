// Profile documents under users/{userId}.
use rideshear::fixtures::{fields, mock_user_data, MOCK_USER};
use rideshear::rules::{DenyReason, FieldValue};
use rideshear::{assert_fails, assert_succeeds, TestEnvironment};
use serde_json::json;

async fn seeded() -> TestEnvironment {
    let env = TestEnvironment::new().expect("built-in policies");
    env.with_security_rules_disabled(|admin| async move {
        admin
            .collection("users")
            .doc(MOCK_USER.uid)?
            .set(mock_user_data())
            .await
    })
    .await
    .expect("seed profile");
    env
}

#[tokio::test]
async fn users_can_create_their_own_profile() {
    let env = TestEnvironment::new().unwrap();
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let user = db.collection("users").doc(MOCK_USER.uid).unwrap();

    assert_succeeds(user.set(mock_user_data())).await;

    let stored = env.store().get(user.path()).unwrap();
    assert!(stored.fields["createdAt"].is_string(), "server timestamp resolved");
}

#[tokio::test]
async fn users_cannot_create_profiles_for_other_users() {
    let env = TestEnvironment::new().unwrap();
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let other = db.collection("users").doc("other-user").unwrap();

    assert_fails(other.set(mock_user_data())).await;
    assert!(env.store().is_empty());
}

#[tokio::test]
async fn profiles_require_valid_fields() {
    let env = TestEnvironment::new().unwrap();
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let user = db.collection("users").doc(MOCK_USER.uid).unwrap();

    let mut unknown_type = mock_user_data();
    unknown_type.insert("userType".into(), json!("admin"));
    let err = assert_fails(user.set(unknown_type)).await;
    assert!(matches!(
        err.reason(),
        Some(DenyReason::ValidationFailure { field, .. }) if field == "userType"
    ));

    let mut blank_name = mock_user_data();
    blank_name.insert("name".into(), json!(""));
    assert_fails(user.set(blank_name)).await;
}

#[tokio::test]
async fn users_can_read_their_own_profile() {
    let env = seeded().await;
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let user = db.collection("users").doc(MOCK_USER.uid).unwrap();

    let profile = assert_succeeds(user.get()).await.expect("profile stored");
    assert_eq!(profile["name"], json!("John Doe"));
}

#[tokio::test]
async fn other_users_cannot_read_a_profile_but_admins_can() {
    let env = seeded().await;

    let stranger = env.authenticated_context("someone-else", None);
    assert_fails(stranger.collection("users").doc(MOCK_USER.uid).unwrap().get()).await;

    let admin = env.authenticated_context("support", Some(fields(json!({ "admin": true }))));
    assert_succeeds(admin.collection("users").doc(MOCK_USER.uid).unwrap().get()).await;
}

#[tokio::test]
async fn unauthenticated_users_cannot_access_user_data() {
    let env = seeded().await;
    let db = env.unauthenticated_context();
    let user = db.collection("users").doc(MOCK_USER.uid).unwrap();

    assert_fails(user.get()).await;
}

#[tokio::test]
async fn users_cannot_change_user_type_after_creation() {
    let env = seeded().await;
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let user = db.collection("users").doc(MOCK_USER.uid).unwrap();

    assert_fails(user.update(fields(json!({ "userType": "driver" })))).await;
    assert_fails(user.update(fields(json!({ "userType": FieldValue::delete() })))).await;
}

#[tokio::test]
async fn users_can_update_other_profile_fields() {
    let env = seeded().await;
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let user = db.collection("users").doc(MOCK_USER.uid).unwrap();

    assert_succeeds(user.update(fields(json!({ "name": "Johnny" })))).await;
    let stored = env.store().get(user.path()).unwrap();
    assert_eq!(stored.fields["name"], json!("Johnny"));
    assert_eq!(stored.fields["userType"], json!("rider"));
}

#[tokio::test]
async fn profiles_cannot_be_deleted() {
    let env = seeded().await;
    let db = env.authenticated_context(MOCK_USER.uid, None);
    let user = db.collection("users").doc(MOCK_USER.uid).unwrap();

    let err = assert_fails(user.delete()).await;
    assert!(matches!(err.reason(), Some(DenyReason::PolicyNotFound { .. })));
    assert_eq!(env.store().len(), 1);
}
