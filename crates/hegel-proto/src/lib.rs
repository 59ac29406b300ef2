//! Hegel Protocol - gRPC service definitions
//!
//! This crate contains the protobuf-generated code for the hardware
//! inventory service Hegel reads machine records from.

/// Hardware service (machine records by IP)
pub mod hardware {
    tonic::include_proto!("hegel.hardware");
}
