//! Reconciliation procedures that keep the directory, the accounting
//! database, the billing backend, and the filesystems in agreement.
//!
//! Every procedure is plan/apply: it fetches authoritative state,
//! computes the minimal set of differences, and applies them in order,
//! logging-and-skipping steps that are already in the desired state.
//! Re-running after a successful run plans nothing.

#![deny(missing_docs)]

pub mod cleanup;
pub mod group_move;
pub mod quota_sync;
pub mod usage_report;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = hpcadm_core::Result<T>;
