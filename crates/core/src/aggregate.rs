//! Aggregate root trait and optimistic version expectations.

use crate::error::{DomainError, DomainResult};

/// A record whose writes are versioned.
///
/// Version `0` means "not yet stored"; every committed write bumps it by one.
pub trait AggregateRoot {
    /// Monotonically increasing count of committed writes.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation attached to a versioned write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (unconditional upserts, administrative fixes).
    Any,
    /// Require the stored record to be at an exact version (`0` = must not exist).
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
