//! LDAP directory client for cluster account maintenance.
//!
//! This crate provides the paged-search client (RFC 2696 simple paged
//! results), the typed projection of directory entries, and single
//! attribute modifications used by the reconciliation procedures.

#![deny(missing_docs)]

mod accounts;
mod client;
mod config;
mod dn;
mod entry;

pub use accounts::{
    DirectoryGroup, DirectoryUser, GROUP_ATTRIBUTES, QUOTA_USER_ATTRIBUTES, USER_ATTRIBUTES,
};
pub use client::{
    escape_filter_value, DirectoryClient, DirectoryModification, PageState, PagedSearchError,
    PagedSearchOutcome, SearchPage, SearchRequest, SearchScope, DEFAULT_PAGE_SIZE,
};
pub use config::DirectoryConfig;
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use entry::{DirectoryEntry, Projection, Truncation};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = hpcadm_core::Result<T>;
