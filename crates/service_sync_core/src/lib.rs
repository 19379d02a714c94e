//! Domain primitives for syncing infrastructure state into the `services` table.
//!
//! This crate owns snapshot parsing, event routing, reconciliation and the
//! connection lifecycle contract. It intentionally excludes AWS SDK, SQL driver
//! and Lambda runtime concerns; those live in `service_sync_lambda`.

pub mod clock;
pub mod contract;
pub mod guardian;
pub mod parameters;
pub mod reconcile;
pub mod routing;
pub mod snapshot;
pub mod store;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
