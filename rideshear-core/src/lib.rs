//! Core shared library for the Rideshear policy engine.
//!
//! This crate exposes the primitives every other crate in the workspace
//! depends on: the canonical error type, environment-driven configuration
//! and the tracing setup used by the binaries.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{CoreConfig, Environment};
pub use errors::{ConfigError, CoreError, Result as CoreResult};
