//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (ids, timestamps, errors, state machine)
//! - `subscription` - Billing state, entitlements, usage metering and reconciliation

pub mod foundation;
pub mod subscription;
