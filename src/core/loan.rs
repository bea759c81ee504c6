use crate::core::member::MemberId;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest amount the ledger will record, both for a single principal and
/// for outstanding balance growth. Extension and accrual saturate here.
pub const MAX_LOAN_AMOUNT: u64 = 10_000_000_000_000;

/// Largest accepted interest rate, in percent per day.
pub const MAX_INTEREST_RATE: u32 = 1000;

/// Clamp a requested amount into the accepted range.
///
/// Out-of-range requests are clamped rather than rejected; the ledger
/// records what it can honor.
pub fn clamp_amount(amount: u64) -> u64 {
    amount.min(MAX_LOAN_AMOUNT)
}

/// Clamp a requested interest rate into the accepted range.
pub fn clamp_rate(rate: u32) -> u32 {
    rate.min(MAX_INTEREST_RATE)
}

/// A directed loan from `lender` to `borrower`.
///
/// Represents the fact that `borrower` owes `lender` an outstanding amount
/// of community currency. A community holds at most one loan per ordered
/// (lender, borrower) pair; lending again while a loan is open extends it
/// rather than creating a second record.
///
/// Loans are immutable snapshots. Every mutation returns a new value; the
/// store owns the persisted state, and a `Loan` in memory is a transient
/// projection checked out for a single operation.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use debtbook::core::loan::Loan;
/// use debtbook::core::member::MemberId;
///
/// let opened = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
/// let loan = Loan::open(
///     MemberId::new("alice"),
///     MemberId::new("bob"),
///     100,
///     Some(10),
///     opened,
/// );
///
/// // Three days later, 10% simple interest per day has accrued.
/// let now = Utc.with_ymd_and_hms(2024, 1, 4, 9, 0, 0).unwrap();
/// let accrual = loan.accrue(now);
/// assert_eq!(accrual.loan().outstanding(), 130);
/// assert_eq!(accrual.accrued(), 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    /// Unique identifier for this loan record.
    id: Uuid,
    /// The member who lent and is owed.
    lender: MemberId,
    /// The member who borrowed and owes.
    borrower: MemberId,
    /// The amount originally lent, before interest or repayment.
    principal: u64,
    /// The amount currently owed, including accrued interest.
    outstanding: u64,
    /// Interest in percent per day. `None` means interest-free.
    interest_rate: Option<u32>,
    /// When this loan was opened.
    created_at: DateTime<Utc>,
    /// Start of the last day interest was applied through.
    last_accrual_at: DateTime<Utc>,
}

impl Loan {
    /// Open a new loan.
    ///
    /// The amount and rate are clamped into their accepted ranges and the
    /// accrual anchor starts at the opening day's boundary.
    ///
    /// # Panics
    ///
    /// Panics if `amount` clamps to zero: a loan with nothing owed must not
    /// exist as a record.
    pub fn open(
        lender: MemberId,
        borrower: MemberId,
        amount: u64,
        interest_rate: Option<u32>,
        at: DateTime<Utc>,
    ) -> Self {
        let amount = clamp_amount(amount);
        assert!(amount > 0, "Loan principal must be positive");
        Self {
            id: Uuid::new_v4(),
            lender,
            borrower,
            principal: amount,
            outstanding: amount,
            interest_rate: interest_rate.map(clamp_rate),
            created_at: at,
            last_accrual_at: day_start(at),
        }
    }

    /// Rebuild a loan from stored parts (snapshot import, migration).
    ///
    /// Applies the same clamping as `open` but trusts the caller on
    /// timestamps and identity.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        lender: MemberId,
        borrower: MemberId,
        principal: u64,
        outstanding: u64,
        interest_rate: Option<u32>,
        created_at: DateTime<Utc>,
        last_accrual_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            lender,
            borrower,
            principal: clamp_amount(principal),
            outstanding: clamp_amount(outstanding),
            interest_rate: interest_rate.map(clamp_rate),
            created_at,
            last_accrual_at,
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn lender(&self) -> &MemberId {
        &self.lender
    }

    pub fn borrower(&self) -> &MemberId {
        &self.borrower
    }

    pub fn principal(&self) -> u64 {
        self.principal
    }

    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }

    pub fn interest_rate(&self) -> Option<u32> {
        self.interest_rate
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accrual_at(&self) -> DateTime<Utc> {
        self.last_accrual_at
    }

    // --- Behavior ---

    /// Apply interest for the whole days elapsed since the last accrual.
    ///
    /// Interest is simple over the elapsed days on the current outstanding
    /// balance: `ceil(outstanding * rate% * days)`, rounded up so no
    /// fractional unit is lost to the lender. Crossing a day boundary counts
    /// as one elapsed day even when fewer than 24 hours have passed; reads
    /// within the same day accrue nothing, which makes repeated reads
    /// idempotent.
    ///
    /// Returns a post-accrual snapshot plus the amount added. The caller is
    /// responsible for persisting the snapshot when `needs_write()` says the
    /// balance moved.
    pub fn accrue(&self, now: DateTime<Utc>) -> Accrual {
        let rate = match self.interest_rate {
            Some(rate) if rate > 0 => rate,
            _ => return Accrual::unchanged(self.clone()),
        };

        let days = (now.date_naive() - self.last_accrual_at.date_naive()).num_days();
        if days < 1 {
            return Accrual::unchanged(self.clone());
        }

        // Exact in u128: outstanding <= 10^13, rate <= 10^3, so the product
        // fits with room for any realistic day count.
        let interest = (self.outstanding as u128 * rate as u128 * days as u128).div_ceil(100);
        let headroom = (MAX_LOAN_AMOUNT - self.outstanding) as u128;
        let accrued = interest.min(headroom) as u64;
        if accrued == 0 {
            return Accrual::unchanged(self.clone());
        }

        let mut loan = self.clone();
        loan.outstanding += accrued;
        loan.last_accrual_at = day_start(now);
        Accrual { loan, accrued }
    }

    /// Fold a further amount into this loan.
    ///
    /// The outstanding balance grows by `amount` (saturating at the ledger
    /// cap) and the accrual anchor resets to the extension day. The interest
    /// rate is replaced by the newly supplied value; omitting it clears the
    /// rate. The original principal is kept for display.
    pub fn extend(
        &self,
        amount: u64,
        interest_rate: Option<u32>,
        now: DateTime<Utc>,
    ) -> (Loan, RateChange) {
        let amount = clamp_amount(amount);
        let interest_rate = interest_rate.map(clamp_rate);

        let change = match (self.interest_rate, interest_rate) {
            (old, new) if old == new => RateChange::Unchanged,
            (_, Some(new)) => RateChange::Set(new),
            (Some(_), None) => RateChange::Cleared,
            (None, None) => RateChange::Unchanged,
        };

        let mut loan = self.clone();
        loan.outstanding = loan.outstanding.saturating_add(amount).min(MAX_LOAN_AMOUNT);
        loan.interest_rate = interest_rate;
        loan.last_accrual_at = day_start(now);
        (loan, change)
    }

    /// The loan after repaying `amount`, or `None` when the repayment
    /// clears it.
    ///
    /// Callers cap the amount at the current outstanding balance; anything
    /// at or above it clears the loan.
    pub fn after_repayment(&self, amount: u64) -> Option<Loan> {
        if amount >= self.outstanding {
            return None;
        }
        let mut loan = self.clone();
        loan.outstanding -= amount;
        Some(loan)
    }
}

/// Truncate an instant to the start of its UTC day.
fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Outcome of an accrual computation: the post-accrual loan snapshot and
/// the interest that was applied.
#[derive(Debug, Clone)]
pub struct Accrual {
    loan: Loan,
    accrued: u64,
}

impl Accrual {
    fn unchanged(loan: Loan) -> Self {
        Self { loan, accrued: 0 }
    }

    /// The loan as of the accrual instant.
    pub fn loan(&self) -> &Loan {
        &self.loan
    }

    pub fn into_loan(self) -> Loan {
        self.loan
    }

    /// Interest added by this accrual.
    pub fn accrued(&self) -> u64 {
        self.accrued
    }

    /// Whether the balance moved and the snapshot must be persisted.
    pub fn needs_write(&self) -> bool {
        self.accrued > 0
    }
}

/// How an extension changed the interest rate, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateChange {
    /// The rate is the same as before.
    Unchanged,
    /// The rate was replaced with a new value.
    Set(u32),
    /// The rate was dropped; the loan is now interest-free.
    Cleared,
}
