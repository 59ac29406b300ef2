//! Hegel Client - Hardware inventory access
//!
//! This crate provides the [`HardwareClient`] seam the server fetches
//! machine records through, and its gRPC implementation.

pub mod grpc;
pub mod record;

pub use grpc::GrpcHardwareClient;
pub use record::Hardware;

use async_trait::async_trait;
use hegel_common::Result;

/// Source of machine records, keyed by the address a machine calls from
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Fetch the record owning `ip`
    ///
    /// Returns `Error::HardwareNotFound` when the backend has no record,
    /// `Error::BackendUnavailable` on transport failure or timeout.
    async fn by_ip(&self, ip: &str) -> Result<Hardware>;

    /// Issue a cheap call that only succeeds when the backend is reachable
    async fn probe(&self) -> Result<()>;
}
