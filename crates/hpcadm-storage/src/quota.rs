//! Parsing of the directory `quota` attribute.
//!
//! The attribute encodes `<mount>:<soft>,<hard>,<softinode>,<hardinode>`
//! where the block limits are in KiB.

use crate::Result;
use hpcadm_core::Error;

/// Parsed directory quota attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaAttribute {
    /// Mount point the quota applies to, e.g. `/home`.
    pub mount: String,
    /// Soft block limit in KiB.
    pub soft_kib: u64,
    /// Hard block limit in KiB.
    pub hard_kib: u64,
    /// Soft inode limit.
    pub soft_inodes: u64,
    /// Hard inode limit.
    pub hard_inodes: u64,
}

impl QuotaAttribute {
    /// Parses the raw attribute value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseError`] when the value does not match the
    /// `<mount>:<soft>,<hard>,<softinode>,<hardinode>` layout.
    pub fn parse(value: &str) -> Result<Self> {
        let malformed = || Error::ParseError(format!("invalid quota attribute: {value:?}"));

        let (mount, limits) = value.rsplit_once(':').ok_or_else(malformed)?;
        if mount.is_empty() {
            return Err(malformed());
        }

        let fields: Vec<&str> = limits.split(',').collect();
        let [soft, hard, soft_inodes, hard_inodes] = fields.as_slice() else {
            return Err(malformed());
        };

        Ok(Self {
            mount: mount.to_string(),
            soft_kib: soft.parse().map_err(|_| malformed())?,
            hard_kib: hard.parse().map_err(|_| malformed())?,
            soft_inodes: soft_inodes.parse().map_err(|_| malformed())?,
            hard_inodes: hard_inodes.parse().map_err(|_| malformed())?,
        })
    }

    /// Hard block limit in bytes.
    #[must_use]
    pub const fn hard_bytes(&self) -> u64 {
        self.hard_kib * 1024
    }

    /// ZFS dataset holding this mount, e.g. pool `tank` and mount `/home`
    /// give `tank/home`.
    #[must_use]
    pub fn dataset(&self, pool: &str) -> String {
        format!("{pool}{}", self.mount)
    }
}
