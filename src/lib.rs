//! Mealplan entitlements - billing decisions for magic recipe imports
//!
//! Resolves whether a household group may run a metered import (text, URL or
//! photo) under its plan, how many monthly credits remain, and which billing
//! prompts to show. Subscriptions and usage counters live in external stores
//! reached through async traits; the decision itself is a pure function.
//!
//! # Features
//!
//! - **Entitlements**: plan tiers, monthly credit allotments, grace periods
//!   and allow-listed overrides
//! - **Admission**: fail-closed import gating with conditional credit debits
//! - **Portal**: customer portal sessions for billing managers
//! - **HTTP**: axum routes over the above
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use mealplan_entitlements::{BillingState, ConfigBuilder, billing_routes};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     mealplan_entitlements::init_tracing_with_config(&config);
//!
//!     let state = BillingState::builder(config.billing, subscriptions, usage, portal_client).build()?;
//!     let app = billing_routes(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod billing;
mod config;
mod error;
pub mod http;
mod utils;

// Re-exports for public API
pub use config::{BillingConfig, Config, ConfigBuilder, LoggingConfig};
pub use error::{AppError, ErrorResponse, Result};
pub use http::{BillingState, CallerIdentity, billing_routes};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "mealplan::billing=debug")
/// - `MEALPLAN_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = utils::get_env_with_prefix("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    install_subscriber(env_filter, json_logs);
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &Config) {
    install_subscriber(EnvFilter::new(&config.logging.level), config.logging.json);
}

fn install_subscriber(env_filter: EnvFilter, json: bool) {
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
