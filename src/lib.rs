//! Rideshear: access policies for the ride-sharing document store.
//!
//! The policy engine itself lives in `rideshear-rules`; this crate adds an
//! emulated store that runs every operation through it, so whole request
//! flows can be exercised the way a client would issue them.
//!
//! * [`harness`]: per-caller contexts over an in-memory store
//! * [`fixtures`]: canonical users, rides and reports

pub mod fixtures;
pub mod harness;

pub use harness::{
    assert_fails, assert_succeeds, CollectionRef, DocumentRef, HarnessError, HarnessResult,
    TestContext, TestEnvironment,
};
pub use rideshear_rules as rules;
