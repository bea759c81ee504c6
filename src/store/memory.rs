use crate::core::loan::Loan;
use crate::core::member::{CommunityId, MemberId};
use crate::store::record::{LedgerSnapshot, RawLoanRecord};
use crate::store::{LedgerStore, StorageError, StoredLoan, Version};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// lender -> borrower -> versioned record
type Shelf = HashMap<MemberId, HashMap<MemberId, VersionedLoan>>;

#[derive(Debug, Clone)]
struct VersionedLoan {
    loan: Loan,
    version: Version,
}

/// In-memory reference implementation of [`LedgerStore`].
///
/// Holds every community's loans in nested maps behind a reader-writer
/// lock; per-record revisions carry the compare-and-swap contract.
/// Snapshots move the whole ledger in and out of JSON.
#[derive(Debug, Default)]
pub struct MemoryStore {
    communities: RwLock<HashMap<CommunityId, Shelf>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot, migrating historical records.
    ///
    /// `now` anchors the timestamps of records that predate timestamps.
    pub fn from_snapshot(snapshot: LedgerSnapshot, now: DateTime<Utc>) -> Self {
        let mut communities: HashMap<CommunityId, Shelf> = HashMap::new();
        for (community, lenders) in snapshot.communities {
            let mut shelf = Shelf::new();
            for (lender, borrowers) in lenders {
                for (borrower, raw) in borrowers {
                    if let Some(loan) = raw.migrate(&lender, &borrower, now) {
                        shelf
                            .entry(lender.clone())
                            .or_default()
                            .insert(borrower, VersionedLoan { loan, version: 1 });
                    }
                }
            }
            if !shelf.is_empty() {
                communities.insert(community, shelf);
            }
        }
        Self {
            communities: RwLock::new(communities),
        }
    }

    /// Export the full ledger as a snapshot at the current schema version.
    pub fn snapshot(&self) -> Result<LedgerSnapshot, StorageError> {
        let guard = self.read()?;
        let mut snapshot = LedgerSnapshot::new();
        for (community, shelf) in guard.iter() {
            let mut lenders = BTreeMap::new();
            for (lender, borrowers) in shelf {
                let records: BTreeMap<MemberId, RawLoanRecord> = borrowers
                    .iter()
                    .map(|(borrower, v)| (borrower.clone(), RawLoanRecord::from(&v.loan)))
                    .collect();
                lenders.insert(lender.clone(), records);
            }
            snapshot.communities.insert(community.clone(), lenders);
        }
        Ok(snapshot)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<CommunityId, Shelf>>, StorageError> {
        self.communities
            .read()
            .map_err(|_| StorageError::Backend("loan store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<CommunityId, Shelf>>, StorageError> {
        self.communities
            .write()
            .map_err(|_| StorageError::Backend("loan store lock poisoned".into()))
    }
}

impl LedgerStore for MemoryStore {
    fn get(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
    ) -> Result<Option<StoredLoan>, StorageError> {
        let guard = self.read()?;
        Ok(guard
            .get(community)
            .and_then(|shelf| shelf.get(lender))
            .and_then(|borrowers| borrowers.get(borrower))
            .map(|v| StoredLoan {
                loan: v.loan.clone(),
                version: v.version,
            }))
    }

    fn put(
        &self,
        community: &CommunityId,
        loan: &Loan,
        expected: Option<Version>,
    ) -> Result<Version, StorageError> {
        let mut guard = self.write()?;
        let borrowers = guard
            .entry(community.clone())
            .or_default()
            .entry(loan.lender().clone())
            .or_default();
        let found = borrowers.get(loan.borrower()).map(|v| v.version);

        let next = match (expected, found) {
            (None, None) => 1,
            (Some(e), Some(f)) if e == f => f + 1,
            _ => {
                return Err(StorageError::VersionConflict {
                    lender: loan.lender().clone(),
                    borrower: loan.borrower().clone(),
                    expected,
                    found,
                })
            }
        };
        borrowers.insert(
            loan.borrower().clone(),
            VersionedLoan {
                loan: loan.clone(),
                version: next,
            },
        );
        Ok(next)
    }

    fn delete(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
        expected: Version,
    ) -> Result<(), StorageError> {
        let mut guard = self.write()?;
        let found = guard
            .get(community)
            .and_then(|shelf| shelf.get(lender))
            .and_then(|borrowers| borrowers.get(borrower))
            .map(|v| v.version);

        if found != Some(expected) {
            return Err(StorageError::VersionConflict {
                lender: lender.clone(),
                borrower: borrower.clone(),
                expected: Some(expected),
                found,
            });
        }

        // Remove the record and prune emptied maps so a cleared loan
        // leaves no trace.
        if let Some(shelf) = guard.get_mut(community) {
            if let Some(borrowers) = shelf.get_mut(lender) {
                borrowers.remove(borrower);
                if borrowers.is_empty() {
                    shelf.remove(lender);
                }
            }
            if shelf.is_empty() {
                guard.remove(community);
            }
        }
        Ok(())
    }

    fn loans_by_lender(
        &self,
        community: &CommunityId,
        lender: &MemberId,
    ) -> Result<Vec<StoredLoan>, StorageError> {
        let guard = self.read()?;
        let mut loans: Vec<StoredLoan> = guard
            .get(community)
            .and_then(|shelf| shelf.get(lender))
            .map(|borrowers| {
                borrowers
                    .values()
                    .map(|v| StoredLoan {
                        loan: v.loan.clone(),
                        version: v.version,
                    })
                    .collect()
            })
            .unwrap_or_default();
        loans.sort_by(|a, b| a.loan.borrower().cmp(b.loan.borrower()));
        Ok(loans)
    }

    fn loans_by_borrower(
        &self,
        community: &CommunityId,
        borrower: &MemberId,
    ) -> Result<Vec<StoredLoan>, StorageError> {
        let guard = self.read()?;
        let mut loans: Vec<StoredLoan> = guard
            .get(community)
            .map(|shelf| {
                shelf
                    .values()
                    .filter_map(|borrowers| borrowers.get(borrower))
                    .map(|v| StoredLoan {
                        loan: v.loan.clone(),
                        version: v.version,
                    })
                    .collect()
            })
            .unwrap_or_default();
        loans.sort_by(|a, b| a.loan.lender().cmp(b.loan.lender()));
        Ok(loans)
    }

    fn all_loans(&self, community: &CommunityId) -> Result<Vec<StoredLoan>, StorageError> {
        let guard = self.read()?;
        let mut loans: Vec<StoredLoan> = guard
            .get(community)
            .map(|shelf| {
                shelf
                    .values()
                    .flat_map(|borrowers| borrowers.values())
                    .map(|v| StoredLoan {
                        loan: v.loan.clone(),
                        version: v.version,
                    })
                    .collect()
            })
            .unwrap_or_default();
        loans.sort_by(|a, b| {
            (a.loan.lender(), a.loan.borrower()).cmp(&(b.loan.lender(), b.loan.borrower()))
        });
        Ok(loans)
    }

    fn clear_community(&self, community: &CommunityId) -> Result<usize, StorageError> {
        let mut guard = self.write()?;
        let removed = guard
            .remove(community)
            .map(|shelf| shelf.values().map(HashMap::len).sum())
            .unwrap_or(0);
        Ok(removed)
    }
}
