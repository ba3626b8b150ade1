//! Core types and trait definitions for the SSH upstream synchronizer.
//!
//! This crate is deliberately free of Kubernetes and database dependencies.
//! Every other crate depends on it.

pub mod error;
pub mod registry;
pub mod upstream;

pub use error::{Classify, ErrorKind};
pub use registry::{PublicKeyPolicy, UpstreamRegistry};
pub use upstream::Upstream;
