//! Hegel Common - Shared types and utilities
//!
//! This crate provides the error type and configuration values
//! shared by the metadata engine, the hardware client and the server.

pub mod config;
pub mod error;

pub use config::{CustomEndpoints, DataModel, TrustedProxies};
pub use error::{Error, Result};
