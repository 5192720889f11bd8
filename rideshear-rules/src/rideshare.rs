//! Built-in policy set for the ride-sharing data model.
//!
//! | collection                         | create | read | update | delete |
//! |------------------------------------|--------|------|--------|--------|
//! | `users/{userId}`                   | self + profile fields | self or admin | self, `userType` frozen | no rule |
//! | `rides/{rideId}`                   | own ride, `requested` | signed in | rider or driver transitions | deny |
//! | `rides/{rideId}/messages/{msgId}`  | participant sender | participant | deny | deny |
//! | `reports/{reportId}`               | own report | reporter | deny | deny |

use crate::constraint::FieldConstraint;
use crate::error::RuleError;
use crate::context::Snapshot;
use crate::path::CollectionPattern;
use crate::predicate::Predicate;
use crate::rule::CollectionPolicy;
use crate::table::PolicyTable;

pub const RIDE_STATUSES: &[&str] = &[
    "requested",
    "accepted",
    "arriving",
    "in_progress",
    "completed",
    "cancelled",
];

pub const USER_TYPES: &[&str] = &["rider", "driver"];

/// Ride fields only the rider sets, fixed once the ride exists.
pub const RIDE_CORE_FIELDS: &[&str] = &[
    "riderId",
    "pickupAddress",
    "destinationAddress",
    "rideType",
    "estimatedFare",
    "requestTime",
];

/// Fields a participant may touch when moving a ride along.
pub const RIDE_TRANSITION_FIELDS: &[&str] = &["status", "driverId", "acceptTime"];

/// Builds the table enforcing the ride-sharing access rules.
pub fn policy_table() -> Result<PolicyTable, RuleError> {
    PolicyTable::from_policies(policies()?)
}

pub fn policies() -> Result<Vec<CollectionPolicy>, RuleError> {
    Ok(vec![users()?, rides()?, messages()?, reports()?])
}

fn users() -> Result<CollectionPolicy, RuleError> {
    let profile = Predicate::required([
        FieldConstraint::text("name"),
        FieldConstraint::text("email"),
        FieldConstraint::enumeration("userType", USER_TYPES),
        FieldConstraint::timestamp("createdAt").optional(),
    ]);

    Ok(CollectionPolicy::new(CollectionPattern::parse("users/{userId}")?)
        .describe("user profiles")
        .create(Predicate::all([
            Predicate::IsAuthenticated,
            Predicate::principal_matches("userId"),
            profile,
        ]))
        .read(Predicate::all([
            Predicate::IsAuthenticated,
            Predicate::any([
                Predicate::principal_matches("userId"),
                Predicate::has_claim("admin"),
            ]),
        ]))
        .update(Predicate::all([
            Predicate::IsAuthenticated,
            Predicate::principal_matches("userId"),
            Predicate::fields_unchanged(&["userType"]),
        ])))
}

fn rides() -> Result<CollectionPolicy, RuleError> {
    let ride_fields = Predicate::required([
        FieldConstraint::text("riderId"),
        FieldConstraint::text("pickupAddress"),
        FieldConstraint::text("destinationAddress"),
        FieldConstraint::enumeration("status", RIDE_STATUSES),
        FieldConstraint::text("rideType"),
        FieldConstraint::number("estimatedFare").min(0.0),
        FieldConstraint::timestamp("requestTime"),
    ]);

    let rider_edit = Predicate::all([
        Predicate::is_owner("riderId"),
        Predicate::fields_unchanged(RIDE_CORE_FIELDS),
        Predicate::value_in(Snapshot::Proposed, "status", RIDE_STATUSES),
    ]);

    let driver_accepts = Predicate::all([
        Predicate::value_in(Snapshot::Existing, "status", &["requested"]),
        Predicate::value_in(Snapshot::Proposed, "status", &["accepted"]),
        Predicate::owner_on(Snapshot::Proposed, "driverId"),
        Predicate::only_fields_changed(RIDE_TRANSITION_FIELDS),
    ]);

    let ride_participant = Predicate::any([
        Predicate::owner_on(Snapshot::Existing, "riderId"),
        Predicate::owner_on(Snapshot::Existing, "driverId"),
    ]);

    let participant_transition = Predicate::all([
        ride_participant,
        Predicate::only_fields_changed(RIDE_TRANSITION_FIELDS),
        Predicate::value_in(Snapshot::Proposed, "status", RIDE_STATUSES),
    ]);

    Ok(CollectionPolicy::new(CollectionPattern::parse("rides/{rideId}")?)
        .describe("ride requests")
        .create(Predicate::all([
            Predicate::IsAuthenticated,
            Predicate::is_owner("riderId"),
            ride_fields,
            Predicate::value_in(Snapshot::Proposed, "status", &["requested"]),
        ]))
        .read(Predicate::IsAuthenticated)
        .update(Predicate::all([
            Predicate::IsAuthenticated,
            Predicate::any([rider_edit, driver_accepts, participant_transition]),
        ]))
        .delete(Predicate::Deny))
}

fn messages() -> Result<CollectionPolicy, RuleError> {
    Ok(
        CollectionPolicy::new(CollectionPattern::parse("rides/{rideId}/messages/{messageId}")?)
            .describe("ride chat between rider and driver")
            .create(Predicate::all([
                Predicate::IsAuthenticated,
                Predicate::is_owner("senderId"),
                Predicate::required([
                    FieldConstraint::text("senderId"),
                    FieldConstraint::text("message"),
                    FieldConstraint::timestamp("timestamp").optional(),
                ]),
                Predicate::participant("rides/{rideId}"),
            ]))
            .read(Predicate::participant("rides/{rideId}"))
            .update(Predicate::Deny)
            .delete(Predicate::Deny),
    )
}

fn reports() -> Result<CollectionPolicy, RuleError> {
    Ok(CollectionPolicy::new(CollectionPattern::parse("reports/{reportId}")?)
        .describe("user reports, immutable once filed")
        .create(Predicate::all([
            Predicate::IsAuthenticated,
            Predicate::is_owner("reporterId"),
            Predicate::required([
                FieldConstraint::text("reporterId"),
                FieldConstraint::text("reportedUserId"),
                FieldConstraint::text("reason"),
                FieldConstraint::string("description").optional(),
                FieldConstraint::timestamp("timestamp").optional(),
            ]),
        ]))
        .read(Predicate::all([
            Predicate::IsAuthenticated,
            Predicate::is_owner("reporterId"),
        ]))
        .update(Predicate::Deny)
        .delete(Predicate::Deny))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextBuilder, RawRequest};
    use crate::document::Fields;
    use crate::evaluator::Evaluator;
    use crate::operation::OperationKind;
    use crate::outcome::DenyReason;
    use crate::principal::Principal;
    use crate::resolver::EmptyResolver;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    fn accepted_ride() -> Fields {
        fields(json!({
            "riderId": "user1",
            "driverId": "driver1",
            "pickupAddress": "123 Main St",
            "destinationAddress": "456 Elm St",
            "status": "accepted",
            "rideType": "standard",
            "estimatedFare": 15.5,
            "requestTime": "2024-05-01T08:30:00.000Z"
        }))
    }

    fn status_update(uid: &str) -> RawRequest {
        RawRequest::new(OperationKind::Update, "rides/r1", Principal::authenticated(uid))
            .existing(accepted_ride())
            .payload(fields(json!({ "status": "arriving" })))
    }

    #[tokio::test]
    async fn ride_participants_are_judged_on_the_supplied_snapshot() {
        let evaluator = Evaluator::new(policy_table().unwrap());
        let builder = ContextBuilder::new(Arc::new(EmptyResolver));

        let driver = evaluator.check(&builder, status_update("driver1")).await.unwrap();
        assert!(driver.is_allowed(), "{driver:?}");

        let stranger = evaluator.check(&builder, status_update("random-user")).await.unwrap();
        assert!(matches!(
            stranger.reason(),
            Some(DenyReason::PredicateFailed { rule, .. }) if rule == "rides/{rideId}:update"
        ));
    }
}
