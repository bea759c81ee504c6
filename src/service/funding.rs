use crate::core::clock::Clock;
use crate::core::loan::clamp_amount;
use crate::core::member::{CommunityId, MemberId};
use crate::service::ledger::{LedgerError, LedgerService, LoanMutation, Repayment};
use crate::store::{LedgerStore, StorageError, StoredLoan};
use log::warn;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors surfaced by a currency ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundsError {
    #[error("{account} has insufficient funds to cover {amount}")]
    InsufficientFunds { account: MemberId, amount: u64 },
    #[error("deposit would push {account} above the balance cap of {cap}")]
    BalanceCapExceeded { account: MemberId, cap: u64 },
    #[error("currency backend error: {0}")]
    Backend(String),
}

/// The community currency ledger the loan engine moves credits through.
///
/// The engine assumes nothing beyond per-account balances with atomic
/// withdraw and deposit; the real implementation lives with the host's
/// economy plugin. All amounts are whole credits.
pub trait CurrencyLedger {
    /// Whether `account` can cover `amount` right now.
    fn can_afford(&self, community: &CommunityId, account: &MemberId, amount: u64) -> bool;

    /// Take `amount` out of `account`.
    fn withdraw(
        &self,
        community: &CommunityId,
        account: &MemberId,
        amount: u64,
    ) -> Result<(), FundsError>;

    /// Add `amount` to `account`. Fails with
    /// [`FundsError::BalanceCapExceeded`] when the account would exceed its
    /// maximum balance.
    fn deposit(
        &self,
        community: &CommunityId,
        account: &MemberId,
        amount: u64,
    ) -> Result<(), FundsError>;

    /// Overwrite `account`'s balance.
    fn set_balance(
        &self,
        community: &CommunityId,
        account: &MemberId,
        balance: u64,
    ) -> Result<(), FundsError>;
}

/// In-memory currency ledger with an optional per-account balance cap.
///
/// Accounts spring into existence at zero on first touch, the way most
/// chat economies behave.
#[derive(Debug, Default)]
pub struct MemoryBank {
    /// (community, account) -> balance in whole credits
    balances: RwLock<HashMap<(CommunityId, MemberId), u64>>,
    max_balance: Option<u64>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bank whose accounts cannot exceed `cap`.
    pub fn with_max_balance(cap: u64) -> Self {
        Self {
            balances: RwLock::new(HashMap::new()),
            max_balance: Some(cap),
        }
    }

    pub fn balance(&self, community: &CommunityId, account: &MemberId) -> u64 {
        self.read()
            .get(&(community.clone(), account.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<(CommunityId, MemberId), u64>> {
        // Balances are plain integers; a poisoned lock cannot tear them.
        self.balances.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(CommunityId, MemberId), u64>> {
        self.balances.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl CurrencyLedger for MemoryBank {
    fn can_afford(&self, community: &CommunityId, account: &MemberId, amount: u64) -> bool {
        self.balance(community, account) >= amount
    }

    fn withdraw(
        &self,
        community: &CommunityId,
        account: &MemberId,
        amount: u64,
    ) -> Result<(), FundsError> {
        let mut balances = self.write();
        let key = (community.clone(), account.clone());
        let balance = balances.get(&key).copied().unwrap_or(0);
        if balance < amount {
            return Err(FundsError::InsufficientFunds {
                account: account.clone(),
                amount,
            });
        }
        balances.insert(key, balance - amount);
        Ok(())
    }

    fn deposit(
        &self,
        community: &CommunityId,
        account: &MemberId,
        amount: u64,
    ) -> Result<(), FundsError> {
        let mut balances = self.write();
        let key = (community.clone(), account.clone());
        let balance = balances.get(&key).copied().unwrap_or(0).saturating_add(amount);
        if let Some(cap) = self.max_balance {
            if balance > cap {
                return Err(FundsError::BalanceCapExceeded {
                    account: account.clone(),
                    cap,
                });
            }
        }
        balances.insert(key, balance);
        Ok(())
    }

    fn set_balance(
        &self,
        community: &CommunityId,
        account: &MemberId,
        balance: u64,
    ) -> Result<(), FundsError> {
        self.write()
            .insert((community.clone(), account.clone()), balance);
        Ok(())
    }
}

/// Funded operations: ledger mutations paired with the credit transfer
/// that motivates them.
///
/// There is no transaction spanning the loan store and the currency
/// ledger, so these run as sagas: the ledger is written first, and a
/// failed transfer is answered by restoring the loan's prior state before
/// the error propagates.
impl<S: LedgerStore, C: Clock> LedgerService<S, C> {
    /// Record a loan and move the credits for it.
    ///
    /// The lender must afford the amount up front; a deposit that would
    /// push the borrower over their balance cap settles by clamping the
    /// borrower to the cap rather than failing the loan.
    pub fn give_funded<B: CurrencyLedger>(
        &self,
        bank: &B,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
        amount: u64,
        interest_rate: Option<u32>,
    ) -> Result<LoanMutation, LedgerError> {
        let amount = clamp_amount(amount);
        if !bank.can_afford(community, lender, amount) {
            return Err(LedgerError::InsufficientFunds {
                member: lender.clone(),
                amount,
            });
        }

        let prior = self.store().get(community, lender, borrower)?;
        let mutation = self.give(community, lender, borrower, amount, interest_rate)?;

        if let Err(e) = bank.withdraw(community, lender, amount) {
            self.unwind(community, lender, borrower, prior);
            return Err(e.into());
        }
        if let Err(e) = deposit_or_clamp(bank, community, borrower, amount) {
            if let Err(refund) = bank.deposit(community, lender, amount) {
                warn!(
                    "{}: could not refund {} after failed transfer: {}",
                    community, lender, refund
                );
            }
            self.unwind(community, lender, borrower, prior);
            return Err(e.into());
        }
        Ok(mutation)
    }

    /// Collect a repayment and move the credits for it.
    ///
    /// The repayable amount is capped at the accrued outstanding balance
    /// before the borrower's funds are checked, so nobody is asked to pay
    /// more than they owe.
    pub fn repay_funded<B: CurrencyLedger>(
        &self,
        bank: &B,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
        requested: Option<u64>,
    ) -> Result<Repayment, LedgerError> {
        let outstanding = self
            .loan(community, lender, borrower)?
            .ok_or_else(|| LedgerError::NoSuchLoan {
                lender: lender.clone(),
                borrower: borrower.clone(),
            })?
            .outstanding();
        let repaying = requested.map_or(outstanding, |r| r.min(outstanding));
        if !bank.can_afford(community, borrower, repaying) {
            return Err(LedgerError::InsufficientFunds {
                member: borrower.clone(),
                amount: repaying,
            });
        }

        let prior = self.store().get(community, lender, borrower)?;
        let repayment = self.repay(community, lender, borrower, Some(repaying))?;

        if let Err(e) = bank.withdraw(community, borrower, repayment.repaid) {
            self.unwind(community, lender, borrower, prior);
            return Err(e.into());
        }
        if let Err(e) = deposit_or_clamp(bank, community, lender, repayment.repaid) {
            if let Err(refund) = bank.deposit(community, borrower, repayment.repaid) {
                warn!(
                    "{}: could not refund {} after failed transfer: {}",
                    community, borrower, refund
                );
            }
            self.unwind(community, lender, borrower, prior);
            return Err(e.into());
        }
        Ok(repayment)
    }

    /// Best-effort restoration of a loan's pre-operation state after a
    /// failed transfer. Compensation failures are logged, not propagated;
    /// the transfer error is the one the caller needs to see.
    fn unwind(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
        prior: Option<StoredLoan>,
    ) {
        if let Err(e) = self.restore(community, lender, borrower, prior) {
            warn!(
                "{}: failed to roll back loan {} -> {}: {}",
                community, lender, borrower, e
            );
        }
    }

    fn restore(
        &self,
        community: &CommunityId,
        lender: &MemberId,
        borrower: &MemberId,
        prior: Option<StoredLoan>,
    ) -> Result<(), StorageError> {
        let current = self.store().get(community, lender, borrower)?;
        match (prior, current) {
            (Some(p), Some(c)) => self
                .store()
                .put(community, &p.loan, Some(c.version))
                .map(|_| ()),
            (Some(p), None) => self.store().put(community, &p.loan, None).map(|_| ()),
            (None, Some(c)) => self.store().delete(community, lender, borrower, c.version),
            (None, None) => Ok(()),
        }
    }
}

/// Deposit that answers a balance-cap rejection by parking the account at
/// its cap. Credits above the cap are forfeit.
fn deposit_or_clamp<B: CurrencyLedger>(
    bank: &B,
    community: &CommunityId,
    account: &MemberId,
    amount: u64,
) -> Result<(), FundsError> {
    match bank.deposit(community, account, amount) {
        Err(FundsError::BalanceCapExceeded { cap, .. }) => {
            bank.set_balance(community, account, cap)
        }
        other => other,
    }
}
