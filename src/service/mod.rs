//! Ledger orchestration and the funded-transfer saga.

pub mod funding;
pub mod ledger;

pub use funding::{CurrencyLedger, FundsError, MemoryBank};
pub use ledger::{Forgiveness, LedgerConfig, LedgerError, LedgerService, LoanMutation, Repayment};
