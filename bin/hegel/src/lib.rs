//! Hegel - instance metadata service
//!
//! Serves each machine its own record from the hardware inventory: an
//! EC2-compatible `/2009-04-04` tree, operator-defined custom endpoints,
//! and the service's own health, version and metrics endpoints.

pub mod forwarded;
pub mod health;
pub mod metrics;
pub mod metrics_middleware;
pub mod server;

pub use health::{Availability, AvailabilityTracker, HealthSnapshot};
pub use metrics::HegelMetrics;
pub use server::{AppState, ServerConfig, router, serve};

/// Source revision baked in at build time through `GIT_REV`
pub const GIT_REV: &str = match option_env!("GIT_REV") {
    Some(rev) => rev,
    None => "unknown",
};
