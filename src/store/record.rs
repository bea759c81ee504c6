use crate::core::loan::Loan;
use crate::core::member::{CommunityId, MemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Current version of the persisted snapshot schema.
///
/// - 0: bare records carrying `outstanding` and `interest` only
/// - 1: added `original_amount` and creation timestamps, both optional
/// - 2: full records with ids and explicit accrual anchors
pub const SCHEMA_VERSION: u32 = 2;

/// Errors arising from reading or writing ledger snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A loan record as persisted, tolerant of every historical shape.
///
/// Only `outstanding` has been present since the first schema; everything
/// else is optional on the way in and filled by [`RawLoanRecord::migrate`].
/// Records written by this build always carry every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLoanRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lender: Option<MemberId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub borrower: Option<MemberId>,
    #[serde(default, alias = "original_amount", skip_serializing_if = "Option::is_none")]
    pub principal: Option<u64>,
    pub outstanding: u64,
    #[serde(default, alias = "interest", skip_serializing_if = "Option::is_none")]
    pub interest_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accrual_at: Option<DateTime<Utc>>,
}

impl RawLoanRecord {
    /// Fill a possibly historical record out to the current schema.
    ///
    /// The identity comes from the snapshot's map keys, which are
    /// authoritative over whatever the record itself carries. Absent
    /// timestamps default to the load instant so accrual never
    /// back-computes across unknown history. Returns `None` for a record
    /// with nothing owed; cleared loans must not exist as records.
    pub fn migrate(self, lender: &MemberId, borrower: &MemberId, now: DateTime<Utc>) -> Option<Loan> {
        if self.outstanding == 0 {
            return None;
        }
        let created_at = self.created_at.unwrap_or(now);
        Some(Loan::from_parts(
            self.id.unwrap_or_else(Uuid::new_v4),
            lender.clone(),
            borrower.clone(),
            self.principal.unwrap_or(self.outstanding),
            self.outstanding,
            self.interest_rate,
            created_at,
            self.last_accrual_at.unwrap_or(created_at),
        ))
    }
}

impl From<&Loan> for RawLoanRecord {
    fn from(loan: &Loan) -> Self {
        Self {
            id: Some(loan.id()),
            lender: Some(loan.lender().clone()),
            borrower: Some(loan.borrower().clone()),
            principal: Some(loan.principal()),
            outstanding: loan.outstanding(),
            interest_rate: loan.interest_rate(),
            created_at: Some(loan.created_at()),
            last_accrual_at: Some(loan.last_accrual_at()),
        }
    }
}

/// Serialized form of an entire ledger: every community's loans keyed by
/// lender then borrower, plus the schema version that wrote them.
///
/// Ordered maps keep the JSON stable across exports, so snapshots diff
/// cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub communities: BTreeMap<CommunityId, BTreeMap<MemberId, BTreeMap<MemberId, RawLoanRecord>>>,
}

impl LedgerSnapshot {
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            communities: BTreeMap::new(),
        }
    }

    /// Parse a snapshot, rejecting files written by a newer build.
    ///
    /// Version 0 files predate the version field itself; its serde default
    /// of zero routes them through migration like any other old shape.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: LedgerSnapshot = serde_json::from_str(json)?;
        if snapshot.schema_version > SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of loan records across all communities.
    pub fn loan_count(&self) -> usize {
        self.communities
            .values()
            .map(|lenders| lenders.values().map(BTreeMap::len).sum::<usize>())
            .sum()
    }
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
