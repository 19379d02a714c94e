//! AWS-oriented adapters and handlers for the service state sync.
//!
//! This crate owns runtime integration details (Lambda handlers, object storage,
//! the MySQL store and the parameter store) on top of the domain logic in
//! `service_sync_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod telemetry;
