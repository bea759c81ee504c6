//! # debtbook
//!
//! Peer-to-peer debt ledger engine with lazy interest accrual.
//!
//! Members of a community lend each other community currency. The engine
//! keeps one directed loan per (lender, borrower) pair and tracks principal,
//! outstanding balance, and an optional interest rate applied over elapsed
//! whole days whenever the balance is read.
//!
//! ## Architecture
//!
//! - **core** — Foundational types: members, loans, the accrual algorithm, clocks
//! - **service** — Ledger orchestration and the funded-transfer saga
//! - **simulation** — Random loan book generation for stress testing
//! - **store** — Versioned loan storage, snapshot schema, in-memory backend

pub mod core;
pub mod service;
pub mod simulation;
pub mod store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::core::clock::{Clock, ManualClock, SystemClock};
    pub use crate::core::loan::Loan;
    pub use crate::core::member::{CommunityId, MemberId};
    pub use crate::service::funding::{CurrencyLedger, MemoryBank};
    pub use crate::service::ledger::{LedgerConfig, LedgerError, LedgerService};
    pub use crate::store::memory::MemoryStore;
    pub use crate::store::{LedgerStore, StoredLoan};
}
