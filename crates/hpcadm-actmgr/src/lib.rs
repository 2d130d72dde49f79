//! Client for the account-management (billing) REST API.
//!
//! Accounts and statuses are served under `/api` with token
//! authentication. List endpoints are paginated by a `page` query
//! parameter starting at 1; iteration stops at the first empty page.

#![deny(missing_docs)]

mod client;
mod models;

pub use client::ActmgrClient;
pub use models::{Account, AccountFilter, AccountUpdate, Group, GroupRef, Status};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = hpcadm_core::Result<T>;
