//! HTTP surface for billing entitlements.
//!
//! Exposes entitlement lookups, import admission and portal sessions as axum
//! routes over a shared [`BillingState`].

pub mod identity;
pub mod routes;
pub mod state;

pub use identity::CallerIdentity;
pub use routes::{AdmissionResponse, EntitlementResponse, billing_routes};
pub use state::{BillingState, BillingStateBuilder};
