//! Foundational types: members, loans, the accrual algorithm, clocks.

pub mod clock;
pub mod loan;
pub mod member;
