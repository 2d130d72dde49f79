//! # hpcadm-core
//!
//! Shared foundations for the HPC account-maintenance toolkit.
//!
//! This crate provides the error taxonomy, settings loading, HTTP client
//! plumbing, and subprocess execution used by the per-system client crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types shared across the workspace
//! - [`settings`] - Per-environment settings file loading
//! - [`client`] - HTTP client configuration, retry policy, and the service client
//! - [`query`] - Query parameter builder for REST clients
//! - [`bytes`] - Byte-size formatting and parsing
//! - [`run`] - Subprocess runner abstraction

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bytes;
pub mod client;
pub mod error;
pub mod query;
pub mod run;
pub mod settings;

// Re-export commonly used types
pub use error::{Error, Result};
