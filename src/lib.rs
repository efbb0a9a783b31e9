//! Lattice Connector - Kubernetes operator for cloud object-storage resources
//!
//! The connector reconciles declared storage resources against the storage
//! service and gate-checks changes to them before they are admitted.
//!
//! # Architecture
//!
//! Two cooperating engines:
//! - A phase-driven reconciler: an ordered list of idempotent [`phases`] is
//!   walked forward to converge a resource and backward to release its
//!   external state on deletion.
//! - A validating admission webhook: per-kind [`webhook::Validator`]s behind a
//!   dispatcher that separates policy denials from system faults.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (ObjectBucket, AccessKey)
//! - [`controller`] - Reconciliation engine and kube-runtime wiring
//! - [`phases`] - Convergence phases (finalizer registration, bucket allocation)
//! - [`adapter`] - Storage service adapters
//! - [`store`] - Resource record persistence
//! - [`webhook`] - Admission validation and its HTTP server
//! - [`config`] - Command-line and environment configuration
//! - [`events`] - Kubernetes Event publishing
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod adapter;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod phases;
pub mod store;
pub mod telemetry;
pub mod webhook;

#[cfg(test)]
mod testing;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
