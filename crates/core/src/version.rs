//! Optimistic concurrency expectations for versioned rows.

/// Optimistic concurrency expectation for a versioned row.
///
/// Ledger entries carry a version that increments on every committed write. A
/// commit states the version it read; the store rejects the write when the row
/// moved in between.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The row must not exist yet (lazy creation).
    Absent,
    /// Require the row to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expectation for a row that was read at `version` (0 means "not yet created").
    pub fn from_read(version: u64) -> Self {
        if version == 0 {
            ExpectedVersion::Absent
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    /// Check against the stored version (`None` when the row does not exist).
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Absent, None) => true,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            _ => false,
        }
    }
}
