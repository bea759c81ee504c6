use crate::core::clock::{Clock, SystemClock};
use crate::core::loan::{clamp_amount, clamp_rate, Loan, RateChange};
use crate::core::member::{CommunityId, MemberId};
use crate::service::funding::FundsError;
use crate::store::{LedgerStore, StorageError, StoredLoan};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Policy knobs for the ledger service.
#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    /// Allow a member to hold a loan with themselves. Off by default;
    /// mostly useful in sandbox communities.
    pub allow_self_loans: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            allow_self_loans: false,
        }
    }
}

/// Errors arising from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no loan from {lender} to {borrower}")]
    NoSuchLoan { lender: MemberId, borrower: MemberId },
    #[error("{member} cannot hold a loan with themselves")]
    SelfLoan { member: MemberId },
    #[error("a new loan needs a positive amount")]
    ZeroPrincipal,
    #[error("{member} cannot afford {amount}")]
    InsufficientFunds { member: MemberId, amount: u64 },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("funds transfer failed: {0}")]
    Funds(#[from] FundsError),
}

/// Outcome of a `give`: the loan as written, and how this call changed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanMutation {
    pub loan: Loan,
    /// True when this call opened the loan, false when it extended one.
    pub created: bool,
    pub rate_change: RateChange,
}

impl fmt::Display for LoanMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.created { "opened" } else { "extended" };
        write!(
            f,
            "{} loan {} -> {}: outstanding {}",
            verb,
            self.loan.lender(),
            self.loan.borrower(),
            self.loan.outstanding()
        )?;
        match self.loan.interest_rate() {
            Some(rate) => write!(f, " at {}%/day", rate),
            None => write!(f, ", interest-free"),
        }
    }
}

/// Outcome of a `repay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repayment {
    /// Amount actually repaid, capped at the outstanding balance.
    pub repaid: u64,
    /// Balance still owed afterward.
    pub remaining: u64,
    /// True when the repayment cleared the loan.
    pub cleared: bool,
}

impl fmt::Display for Repayment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cleared {
            write!(f, "repaid {}, loan cleared", self.repaid)
        } else {
            write!(f, "repaid {}, remaining {}", self.repaid, self.remaining)
        }
    }
}

/// Outcome of a `forgive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forgiveness {
    /// Outstanding balance, interest included, at the moment of forgiveness.
    pub forgiven: u64,
}

impl fmt::Display for Forgiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "forgave {}", self.forgiven)
    }
}

/// Orchestrates loans for all communities over a [`LedgerStore`].
///
/// Every mutation runs as a single load, compute, compare-and-swap cycle
/// and retries from a fresh read when another writer commits in between,
/// so concurrent operations on one loan never lose updates. Reading a
/// balance applies pending interest and persists it (accrual-on-read).
///
/// # Examples
///
/// ```
/// use debtbook::prelude::*;
///
/// let service = LedgerService::new(MemoryStore::new());
/// let guild = CommunityId::new("guild-1");
/// let alice = MemberId::new("alice");
/// let bob = MemberId::new("bob");
///
/// service.give(&guild, &alice, &bob, 100, Some(10)).unwrap();
/// let repayment = service.repay(&guild, &alice, &bob, Some(40)).unwrap();
/// assert_eq!(repayment.remaining, 60);
/// ```
pub struct LedgerService<S, C> {
    store: S,
    clock: C,
    config: LedgerConfig,
}

impl<S: LedgerStore> LedgerService<S, SystemClock> {
    /// Service over `store` using the system clock and default policy.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: LedgerStore, C: Clock> LedgerService<S, C> {
    /// Service over `store` reading time from `clock`.
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            config: LedgerConfig::default(),
        }
    }

    /// Replace the policy configuration.
    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lend `amount` from `lender` to `borrower`.
    ///
    /// Opens a loan when the pair has none, otherwise folds the amount into
    /// the existing one: the outstanding balance grows, the interest rate is
    /// replaced by the newly supplied value (cleared when omitted), and the
    /// accrual anchor resets. Amount and rate are clamped into range.
    pub fn give(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
        amount: u64,
        interest_rate: Option<u32>,
    ) -> Result<LoanMutation, LedgerError> {
        if lender == borrower && !self.config.allow_self_loans {
            return Err(LedgerError::SelfLoan {
                member: lender.clone(),
            });
        }
        let amount = clamp_amount(amount);
        let interest_rate = interest_rate.map(clamp_rate);

        loop {
            match self.store.get(community, lender, borrower)? {
                None => {
                    if amount == 0 {
                        return Err(LedgerError::ZeroPrincipal);
                    }
                    let loan = Loan::open(
                        lender.clone(),
                        borrower.clone(),
                        amount,
                        interest_rate,
                        self.clock.now(),
                    );
                    match self.store.put(community, &loan, None) {
                        Ok(_) => {
                            info!("{}: {} lent {} to {}", community, lender, amount, borrower);
                            let rate_change = match interest_rate {
                                Some(rate) => RateChange::Set(rate),
                                None => RateChange::Unchanged,
                            };
                            return Ok(LoanMutation {
                                loan,
                                created: true,
                                rate_change,
                            });
                        }
                        Err(StorageError::VersionConflict { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                Some(stored) => {
                    let (loan, rate_change) =
                        stored.loan.extend(amount, interest_rate, self.clock.now());
                    match self.store.put(community, &loan, Some(stored.version)) {
                        Ok(_) => {
                            info!(
                                "{}: {} extended loan to {} by {}, outstanding {}",
                                community,
                                lender,
                                borrower,
                                amount,
                                loan.outstanding()
                            );
                            return Ok(LoanMutation {
                                loan,
                                created: false,
                                rate_change,
                            });
                        }
                        Err(StorageError::VersionConflict { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Repay up to `requested` toward the loan; `None` repays in full.
    ///
    /// Pending interest accrues first, the amount is capped at the accrued
    /// outstanding balance, and a repayment that reaches zero deletes the
    /// record. Overpayment is impossible; the cap discards the excess.
    pub fn repay(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
        requested: Option<u64>,
    ) -> Result<Repayment, LedgerError> {
        loop {
            let stored = self
                .store
                .get(community, lender, borrower)?
                .ok_or_else(|| LedgerError::NoSuchLoan {
                    lender: lender.clone(),
                    borrower: borrower.clone(),
                })?;
            let accrual = stored.loan.accrue(self.clock.now());
            let outstanding = accrual.loan().outstanding();
            let repaying = requested.map_or(outstanding, |r| r.min(outstanding));

            if repaying == 0 && !accrual.needs_write() {
                return Ok(Repayment {
                    repaid: 0,
                    remaining: outstanding,
                    cleared: false,
                });
            }

            match accrual.loan().after_repayment(repaying) {
                None => match self.store.delete(community, lender, borrower, stored.version) {
                    Ok(()) => {
                        info!(
                            "{}: {} repaid {} in full ({})",
                            community, borrower, lender, repaying
                        );
                        return Ok(Repayment {
                            repaid: repaying,
                            remaining: 0,
                            cleared: true,
                        });
                    }
                    Err(StorageError::VersionConflict { .. }) => continue,
                    Err(e) => return Err(e.into()),
                },
                Some(reduced) => {
                    match self.store.put(community, &reduced, Some(stored.version)) {
                        Ok(_) => {
                            info!(
                                "{}: {} repaid {} to {}, remaining {}",
                                community,
                                borrower,
                                repaying,
                                lender,
                                reduced.outstanding()
                            );
                            return Ok(Repayment {
                                repaid: repaying,
                                remaining: reduced.outstanding(),
                                cleared: false,
                            });
                        }
                        Err(StorageError::VersionConflict { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Write off the loan entirely.
    ///
    /// The forgiven amount includes interest accrued up to this instant,
    /// so the lender learns what they actually gave up.
    pub fn forgive(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
    ) -> Result<Forgiveness, LedgerError> {
        loop {
            let stored = self
                .store
                .get(community, lender, borrower)?
                .ok_or_else(|| LedgerError::NoSuchLoan {
                    lender: lender.clone(),
                    borrower: borrower.clone(),
                })?;
            let forgiven = stored.loan.accrue(self.clock.now()).loan().outstanding();
            match self.store.delete(community, lender, borrower, stored.version) {
                Ok(()) => {
                    info!(
                        "{}: {} forgave {} owed by {}",
                        community, lender, forgiven, borrower
                    );
                    return Ok(Forgiveness { forgiven });
                }
                Err(StorageError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The loan between an ordered pair, accrued to now, if any.
    pub fn loan(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
    ) -> Result<Option<Loan>, LedgerError> {
        match self.store.get(community, lender, borrower)? {
            Some(stored) => self.refresh(community, stored),
            None => Ok(None),
        }
    }

    /// All loans `lender` has extended, accrued to now.
    pub fn loans_given(
        &self,
        community: &CommunityId,
        lender: &MemberId,
    ) -> Result<Vec<Loan>, LedgerError> {
        let mut loans = Vec::new();
        for stored in self.store.loans_by_lender(community, lender)? {
            if let Some(loan) = self.refresh(community, stored)? {
                loans.push(loan);
            }
        }
        Ok(loans)
    }

    /// All loans `borrower` owes, accrued to now.
    pub fn loans_owed(
        &self,
        community: &CommunityId,
        borrower: &MemberId,
    ) -> Result<Vec<Loan>, LedgerError> {
        let mut loans = Vec::new();
        for stored in self.store.loans_by_borrower(community, borrower)? {
            if let Some(loan) = self.refresh(community, stored)? {
                loans.push(loan);
            }
        }
        Ok(loans)
    }

    /// Every loan in the community, accrued to now.
    pub fn all_loans(&self, community: &CommunityId) -> Result<Vec<Loan>, LedgerError> {
        let mut loans = Vec::new();
        for stored in self.store.all_loans(community)? {
            if let Some(loan) = self.refresh(community, stored)? {
                loans.push(loan);
            }
        }
        Ok(loans)
    }

    /// Administrative wipe of every loan in the community. Irreversible.
    pub fn clear_community(&self, community: &CommunityId) -> Result<usize, LedgerError> {
        let removed = self.store.clear_community(community)?;
        if removed > 0 {
            warn!("{}: wiped {} loans", community, removed);
        }
        Ok(removed)
    }

    /// Accrue a loaded loan to now, persisting when the balance moved.
    ///
    /// Returns `None` when the loan was cleared concurrently.
    fn refresh(
        &self,
        community: &CommunityId,
        mut stored: StoredLoan,
    ) -> Result<Option<Loan>, LedgerError> {
        loop {
            let accrual = stored.loan.accrue(self.clock.now());
            if !accrual.needs_write() {
                return Ok(Some(accrual.into_loan()));
            }
            match self.store.put(community, accrual.loan(), Some(stored.version)) {
                Ok(_) => {
                    debug!(
                        "{}: accrued {} on loan {} -> {}",
                        community,
                        accrual.accrued(),
                        accrual.loan().lender(),
                        accrual.loan().borrower()
                    );
                    return Ok(Some(accrual.into_loan()));
                }
                Err(StorageError::VersionConflict { .. }) => {
                    match self
                        .store
                        .get(community, stored.loan.lender(), stored.loan.borrower())?
                    {
                        Some(current) => stored = current,
                        None => return Ok(None),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
