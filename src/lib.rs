//! Lingua Subscriptions - subscription and feature-entitlement engine.
//!
//! Tracks one subscription record per learner, mirrors billing-provider state
//! from signed webhook events and decides whether metered features may be
//! used under the learner's effective plan.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
