//! Domain models for orgplane.
//!
//! These are the core types shared across all crates.

pub mod idempotency;
pub mod provisioning;
pub mod tenant;
pub mod token;
pub mod user;
