//! Versioned loan storage: the [`LedgerStore`] contract, the persisted
//! snapshot schema, and an in-memory reference backend.

pub mod memory;
pub mod record;

pub use memory::MemoryStore;
pub use record::{LedgerSnapshot, RawLoanRecord, SnapshotError, SCHEMA_VERSION};

use crate::core::loan::Loan;
use crate::core::member::{CommunityId, MemberId};
use thiserror::Error;

/// Monotonically increasing revision of a stored loan record.
pub type Version = u64;

/// A loan as held by a store, together with the record revision used for
/// compare-and-swap writes.
#[derive(Debug, Clone)]
pub struct StoredLoan {
    pub loan: Loan,
    pub version: Version,
}

/// Errors arising from loan storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A compare-and-swap write observed a different revision than the
    /// caller expected. Another writer committed in between; reload and
    /// retry.
    #[error("version conflict on loan {lender} -> {borrower}: expected {expected:?}, found {found:?}")]
    VersionConflict {
        lender: MemberId,
        borrower: MemberId,
        expected: Option<Version>,
        found: Option<Version>,
    },
    /// The backend failed outright.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Keyed storage of loan records, scoped per community.
///
/// One record exists per ordered (lender, borrower) pair. Writes are
/// optimistic: `put` and `delete` name the revision they expect and fail
/// with [`StorageError::VersionConflict`] when another writer got there
/// first. Absence is not an error for `get`.
///
/// Implementations must be safe for concurrent use; operations on
/// different keys are independent.
pub trait LedgerStore: Send + Sync {
    /// Load the loan for an ordered pair, if one exists.
    fn get(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
    ) -> Result<Option<StoredLoan>, StorageError>;

    /// Write a loan record. `expected = None` creates the record and fails
    /// if one already exists; `Some(v)` replaces exactly revision `v`.
    /// Returns the revision of the written record.
    fn put(
        &self,
        community: &CommunityId,
        loan: &Loan,
        expected: Option<Version>,
    ) -> Result<Version, StorageError>;

    /// Remove a loan record at exactly the expected revision.
    fn delete(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
        expected: Version,
    ) -> Result<(), StorageError>;

    /// All loans extended by `lender`, ordered by borrower.
    fn loans_by_lender(
        &self,
        community: &CommunityId,
        lender: &MemberId,
    ) -> Result<Vec<StoredLoan>, StorageError>;

    /// All loans owed by `borrower`, ordered by lender.
    fn loans_by_borrower(
        &self,
        community: &CommunityId,
        borrower: &MemberId,
    ) -> Result<Vec<StoredLoan>, StorageError>;

    /// Every loan in the community, ordered by (lender, borrower).
    fn all_loans(&self, community: &CommunityId) -> Result<Vec<StoredLoan>, StorageError>;

    /// Drop every loan in the community. Returns how many were removed.
    fn clear_community(&self, community: &CommunityId) -> Result<usize, StorageError>;
}
