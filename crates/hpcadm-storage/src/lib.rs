//! Filesystem-side account management: home/scratch trees, ZFS user
//! quotas, and space-used reporting.

#![deny(missing_docs)]

pub mod home;
pub mod passwd;
pub mod quota;
pub mod usage;
pub mod zfs;

pub use home::{AccountHome, CleanupAction, CleanupOutcome, PathCleanup};
pub use passwd::{PasswdLookup, SystemPasswd};
pub use quota::QuotaAttribute;
pub use usage::{BeegfsReport, UsageResolver};
pub use zfs::ZfsClient;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = hpcadm_core::Result<T>;
