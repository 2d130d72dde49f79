//! Wrappers over the SLURM accounting command-line tools.
//!
//! `sacctmgr` manages accounting users and associations; `sacct` reports
//! completed jobs for usage summaries. Both are driven through the shared
//! [`hpcadm_core::run::CommandRunner`] abstraction so tests can script
//! command output.

#![deny(missing_docs)]

pub mod duration;
pub mod sacct;
pub mod sacctmgr;

pub use duration::parse_duration;
pub use sacct::{
    parse_jobs, ElapsedStrategy, JobRecord, ReportWindow, SacctClient, UsageBucket, UsageSummary,
};
pub use sacctmgr::{Association, SacctmgrClient, UsernameCache};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = hpcadm_core::Result<T>;
