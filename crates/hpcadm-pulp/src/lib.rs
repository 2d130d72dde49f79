//! Client and reporting helpers for the Pulp v2 repository manager.
//!
//! Search endpoints are POSTed with a `criteria` object; large result
//! sets are fetched in `limit`/`skip` pages and accumulated.

#![deny(missing_docs)]

mod client;
mod models;
pub mod reports;

pub use client::{PulpClient, SearchCriteria, SEARCH_PAGE_LIMIT};
pub use models::{ContentUnit, Distributor, Importer, Repository, RpmMetadata, Task};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = hpcadm_core::Result<T>;
