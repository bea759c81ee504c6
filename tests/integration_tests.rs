use chrono::{TimeZone, Utc};
use debtbook::core::clock::ManualClock;
use debtbook::core::member::{CommunityId, MemberId};
use debtbook::service::funding::{CurrencyLedger, FundsError, MemoryBank};
use debtbook::service::ledger::{LedgerError, LedgerService};
use debtbook::store::{LedgerSnapshot, LedgerStore, MemoryStore, SCHEMA_VERSION};
use std::sync::Arc;
use std::thread;

fn guild() -> CommunityId {
    CommunityId::new("guild-1")
}

fn member(name: &str) -> MemberId {
    MemberId::new(name)
}

fn clock_at_noon(year: i32, month: u32, day: u32) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
    ))
}

fn service_with(clock: &Arc<ManualClock>) -> LedgerService<MemoryStore, Arc<ManualClock>> {
    LedgerService::with_clock(MemoryStore::new(), Arc::clone(clock))
}

/// Full lifecycle: lend, accrue over days, partially repay, forgive.
#[test]
fn full_lifecycle_lend_accrue_repay_forgive() {
    let clock = clock_at_noon(2024, 1, 1);
    let service = service_with(&clock);
    let (alice, bob, carol) = (member("alice"), member("bob"), member("carol"));

    let mutation = service.give(&guild(), &alice, &bob, 100, Some(10)).unwrap();
    assert!(mutation.created);
    assert_eq!(mutation.loan.outstanding(), 100);

    // Three days at 10% per day on the outstanding balance.
    clock.advance_days(3);
    let loan = service.loan(&guild(), &alice, &bob).unwrap().unwrap();
    assert_eq!(loan.outstanding(), 130);
    assert_eq!(loan.principal(), 100);

    let repayment = service.repay(&guild(), &alice, &bob, Some(50)).unwrap();
    assert_eq!(repayment.repaid, 50);
    assert_eq!(repayment.remaining, 80);
    assert!(!repayment.cleared);

    service.give(&guild(), &carol, &bob, 200, None).unwrap();
    let owed = service.loans_owed(&guild(), &bob).unwrap();
    assert_eq!(owed.len(), 2);

    let forgiveness = service.forgive(&guild(), &alice, &bob).unwrap();
    assert_eq!(forgiveness.forgiven, 80);

    let owed = service.loans_owed(&guild(), &bob).unwrap();
    assert_eq!(owed.len(), 1);
    assert_eq!(owed[0].lender(), &carol);
}

/// Lending again to the same borrower folds into one loan and replaces
/// the rate; omitting the rate makes the loan interest-free.
#[test]
fn regive_merges_and_replaces_rate() {
    let clock = clock_at_noon(2024, 1, 1);
    let service = service_with(&clock);
    let (alice, bob) = (member("alice"), member("bob"));

    service.give(&guild(), &alice, &bob, 100, Some(10)).unwrap();
    let second = service.give(&guild(), &alice, &bob, 50, None).unwrap();
    assert!(!second.created);
    assert_eq!(second.loan.outstanding(), 150);
    assert_eq!(second.loan.interest_rate(), None);

    // Now interest-free: time passing changes nothing.
    clock.advance_days(30);
    let loan = service.loan(&guild(), &alice, &bob).unwrap().unwrap();
    assert_eq!(loan.outstanding(), 150);
}

/// Paying more than is owed settles the loan and discards the excess.
#[test]
fn overpayment_capped_at_outstanding() {
    let clock = clock_at_noon(2024, 1, 1);
    let service = service_with(&clock);
    let (alice, bob) = (member("alice"), member("bob"));

    service.give(&guild(), &alice, &bob, 50, None).unwrap();
    let repayment = service.repay(&guild(), &alice, &bob, Some(100)).unwrap();
    assert_eq!(repayment.repaid, 50);
    assert!(repayment.cleared);
    assert!(service.loan(&guild(), &alice, &bob).unwrap().is_none());
}

/// Interest accrues before the repayment applies, so paying the accrued
/// balance exactly settles the loan.
#[test]
fn repayment_applies_interest_first() {
    let clock = clock_at_noon(2024, 1, 1);
    let service = service_with(&clock);
    let (alice, bob) = (member("alice"), member("bob"));

    service.give(&guild(), &alice, &bob, 100, Some(10)).unwrap();
    clock.advance_days(3);

    let repayment = service.repay(&guild(), &alice, &bob, Some(130)).unwrap();
    assert_eq!(repayment.repaid, 130);
    assert!(repayment.cleared);
}

/// Loans in one community are invisible to every other community.
#[test]
fn communities_are_isolated() {
    let clock = clock_at_noon(2024, 1, 1);
    let service = service_with(&clock);
    let (alice, bob) = (member("alice"), member("bob"));
    let other = CommunityId::new("guild-2");

    service.give(&guild(), &alice, &bob, 100, None).unwrap();
    service.give(&other, &alice, &bob, 7, None).unwrap();

    assert_eq!(service.all_loans(&guild()).unwrap().len(), 1);
    assert_eq!(
        service.loan(&other, &alice, &bob).unwrap().unwrap().outstanding(),
        7
    );

    assert_eq!(service.clear_community(&guild()).unwrap(), 1);
    assert!(service.all_loans(&guild()).unwrap().is_empty());
    assert_eq!(service.all_loans(&other).unwrap().len(), 1);
}

/// Snapshot to JSON and back preserves every loan field.
#[test]
fn snapshot_round_trip_preserves_loans() {
    let clock = clock_at_noon(2024, 3, 15);
    let service = service_with(&clock);
    let (alice, bob, carol) = (member("alice"), member("bob"), member("carol"));

    service.give(&guild(), &alice, &bob, 100, Some(10)).unwrap();
    service.give(&guild(), &carol, &bob, 250, None).unwrap();
    service
        .give(&CommunityId::new("guild-2"), &bob, &alice, 9, Some(1))
        .unwrap();

    let snapshot = service.store().snapshot().unwrap();
    let json = snapshot.to_json().unwrap();

    // The written form carries the schema version and nests
    // community -> lender -> borrower.
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["schema_version"], SCHEMA_VERSION);
    assert_eq!(
        parsed["communities"]["guild-1"]["alice"]["bob"]["outstanding"],
        100
    );

    let restored = MemoryStore::from_snapshot(
        LedgerSnapshot::from_json(&json).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap(),
    );

    let original = service.store().all_loans(&guild()).unwrap();
    let reloaded = restored.all_loans(&guild()).unwrap();
    assert_eq!(original.len(), reloaded.len());
    for (a, b) in original.iter().zip(reloaded.iter()) {
        assert_eq!(a.loan.id(), b.loan.id());
        assert_eq!(a.loan.lender(), b.loan.lender());
        assert_eq!(a.loan.borrower(), b.loan.borrower());
        assert_eq!(a.loan.principal(), b.loan.principal());
        assert_eq!(a.loan.outstanding(), b.loan.outstanding());
        assert_eq!(a.loan.interest_rate(), b.loan.interest_rate());
        assert_eq!(a.loan.created_at(), b.loan.created_at());
        assert_eq!(a.loan.last_accrual_at(), b.loan.last_accrual_at());
    }
}

/// Ledger files written before the schema carried versions or timestamps
/// still load; missing fields are filled in and zero balances dropped.
#[test]
fn legacy_snapshot_migrates() {
    let json = r#"{
        "communities": {
            "guild-1": {
                "alice": {
                    "bob": { "outstanding": 120, "interest": 10 },
                    "carol": { "outstanding": 0 }
                }
            }
        }
    }"#;

    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let snapshot = LedgerSnapshot::from_json(json).unwrap();
    assert_eq!(snapshot.schema_version, 0);

    let store = MemoryStore::from_snapshot(snapshot, now);
    let stored = store
        .get(&guild(), &member("alice"), &member("bob"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.loan.outstanding(), 120);
    assert_eq!(stored.loan.principal(), 120);
    assert_eq!(stored.loan.interest_rate(), Some(10));
    assert_eq!(stored.loan.created_at(), now);

    // The cleared record did not survive migration.
    assert!(store
        .get(&guild(), &member("alice"), &member("carol"))
        .unwrap()
        .is_none());

    // The migrated loan accrues from the load instant.
    let clock = clock_at_noon(2024, 1, 1);
    let service = LedgerService::with_clock(store, Arc::clone(&clock));
    clock.advance_days(1);
    let loan = service
        .loan(&guild(), &member("alice"), &member("bob"))
        .unwrap()
        .unwrap();
    assert_eq!(loan.outstanding(), 132);
}

/// Files claiming a newer schema than this build understands are refused.
#[test]
fn future_snapshot_version_is_rejected() {
    let json = r#"{ "schema_version": 99, "communities": {} }"#;
    assert!(LedgerSnapshot::from_json(json).is_err());
}

/// Hammer one loan with concurrent unit repayments; every one must land.
#[test]
fn concurrent_repayments_never_lose_updates() {
    let service = Arc::new(LedgerService::new(MemoryStore::new()));
    let (alice, bob) = (member("alice"), member("bob"));
    service.give(&guild(), &alice, &bob, 1_000, None).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let (alice, bob) = (member("alice"), member("bob"));
                for _ in 0..10 {
                    service.repay(&guild(), &alice, &bob, Some(1)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let loan = service.loan(&guild(), &alice, &bob).unwrap().unwrap();
    assert_eq!(loan.outstanding(), 1_000 - 80);
}

/// Racing unit repayments drain a loan to zero: the repaid total must
/// match the principal and exactly one worker observes the clearance.
#[test]
fn concurrent_unit_repayments_clear_exactly_once() {
    let service = Arc::new(LedgerService::new(MemoryStore::new()));
    let (alice, bob) = (member("alice"), member("bob"));
    service.give(&guild(), &alice, &bob, 40, None).unwrap();

    // 48 attempts against 40 outstanding, so the late workers must find
    // the loan already gone.
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let (alice, bob) = (member("alice"), member("bob"));
                let mut repaid = 0u64;
                let mut clearances = 0u32;
                for _ in 0..6 {
                    match service.repay(&guild(), &alice, &bob, Some(1)) {
                        Ok(repayment) => {
                            repaid += repayment.repaid;
                            if repayment.cleared {
                                clearances += 1;
                            }
                        }
                        Err(LedgerError::NoSuchLoan { .. }) => {}
                        Err(e) => panic!("repayment failed: {}", e),
                    }
                }
                (repaid, clearances)
            })
        })
        .collect();

    let mut total_repaid = 0u64;
    let mut total_clearances = 0u32;
    for handle in handles {
        let (repaid, clearances) = handle.join().unwrap();
        total_repaid += repaid;
        total_clearances += clearances;
    }

    assert_eq!(total_repaid, 40);
    assert_eq!(total_clearances, 1);
    assert!(service.loan(&guild(), &alice, &bob).unwrap().is_none());
    assert!(service.all_loans(&guild()).unwrap().is_empty());
}

/// Concurrent gives to one pair must merge every amount, including the
/// racing creates at the start.
#[test]
fn concurrent_gives_merge_all_amounts() {
    let service = Arc::new(LedgerService::new(MemoryStore::new()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let (alice, bob) = (member("alice"), member("bob"));
                for _ in 0..5 {
                    service.give(&guild(), &alice, &bob, 10, None).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let loan = service
        .loan(&guild(), &member("alice"), &member("bob"))
        .unwrap()
        .unwrap();
    assert_eq!(loan.outstanding(), 200);
}

/// A currency ledger that rejects configured operations, for exercising
/// the transfer compensation paths.
struct VetoBank {
    inner: MemoryBank,
    veto_withdrawals: bool,
    veto_deposits_to: Option<MemberId>,
}

impl VetoBank {
    fn over(inner: MemoryBank) -> Self {
        Self {
            inner,
            veto_withdrawals: false,
            veto_deposits_to: None,
        }
    }
}

impl CurrencyLedger for VetoBank {
    fn can_afford(&self, community: &CommunityId, account: &MemberId, amount: u64) -> bool {
        self.inner.can_afford(community, account, amount)
    }

    fn withdraw(
        &self,
        community: &CommunityId,
        account: &MemberId,
        amount: u64,
    ) -> Result<(), FundsError> {
        if self.veto_withdrawals {
            return Err(FundsError::Backend("withdraw vetoed".to_string()));
        }
        self.inner.withdraw(community, account, amount)
    }

    fn deposit(
        &self,
        community: &CommunityId,
        account: &MemberId,
        amount: u64,
    ) -> Result<(), FundsError> {
        if self.veto_deposits_to.as_ref() == Some(account) {
            return Err(FundsError::Backend("deposit vetoed".to_string()));
        }
        self.inner.deposit(community, account, amount)
    }

    fn set_balance(
        &self,
        community: &CommunityId,
        account: &MemberId,
        balance: u64,
    ) -> Result<(), FundsError> {
        self.inner.set_balance(community, account, balance)
    }
}

/// A failed withdrawal after the loan was written must erase the loan.
#[test]
fn failed_withdrawal_rolls_back_new_loan() {
    let inner = MemoryBank::new();
    inner.set_balance(&guild(), &member("alice"), 500).unwrap();
    let bank = VetoBank {
        veto_withdrawals: true,
        ..VetoBank::over(inner)
    };
    let service = LedgerService::new(MemoryStore::new());

    let err = service
        .give_funded(&bank, &guild(), &member("alice"), &member("bob"), 300, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Funds(FundsError::Backend(_))));

    assert!(service
        .loan(&guild(), &member("alice"), &member("bob"))
        .unwrap()
        .is_none());
    assert_eq!(bank.inner.balance(&guild(), &member("alice")), 500);
}

/// A failed deposit refunds the lender and restores the extended loan to
/// its prior balance.
#[test]
fn failed_deposit_restores_extended_loan() {
    let (alice, bob) = (member("alice"), member("bob"));
    let inner = MemoryBank::new();
    inner.set_balance(&guild(), &alice, 500).unwrap();
    let service = LedgerService::new(MemoryStore::new());

    // Open the loan through a working bank first.
    service
        .give_funded(&inner, &guild(), &alice, &bob, 100, None)
        .unwrap();

    let bank = VetoBank {
        veto_deposits_to: Some(bob.clone()),
        ..VetoBank::over(inner)
    };
    let err = service
        .give_funded(&bank, &guild(), &alice, &bob, 50, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Funds(FundsError::Backend(_))));

    // The extension was rolled back and the lender made whole.
    let loan = service.loan(&guild(), &alice, &bob).unwrap().unwrap();
    assert_eq!(loan.outstanding(), 100);
    assert_eq!(bank.inner.balance(&guild(), &alice), 400);
}

/// A failed deposit to the lender refunds the borrower and restores the
/// repaid balance.
#[test]
fn failed_deposit_restores_repaid_loan() {
    let (alice, bob) = (member("alice"), member("bob"));
    let inner = MemoryBank::new();
    inner.set_balance(&guild(), &alice, 500).unwrap();
    let service = LedgerService::new(MemoryStore::new());
    service
        .give_funded(&inner, &guild(), &alice, &bob, 100, None)
        .unwrap();

    let bank = VetoBank {
        veto_deposits_to: Some(alice.clone()),
        ..VetoBank::over(inner)
    };
    let err = service
        .repay_funded(&bank, &guild(), &alice, &bob, Some(40))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Funds(FundsError::Backend(_))));

    let loan = service.loan(&guild(), &alice, &bob).unwrap().unwrap();
    assert_eq!(loan.outstanding(), 100);
    assert_eq!(bank.inner.balance(&guild(), &bob), 100);
}

/// A deposit over the borrower's balance cap parks them at the cap while
/// the loan still records the full amount.
#[test]
fn deposit_cap_parks_borrower_at_cap() {
    let (alice, bob) = (member("alice"), member("bob"));
    let bank = MemoryBank::with_max_balance(1_000);
    bank.set_balance(&guild(), &alice, 500).unwrap();
    bank.set_balance(&guild(), &bob, 950).unwrap();
    let service = LedgerService::new(MemoryStore::new());

    service
        .give_funded(&bank, &guild(), &alice, &bob, 200, None)
        .unwrap();

    assert_eq!(bank.balance(&guild(), &bob), 1_000);
    assert_eq!(bank.balance(&guild(), &alice), 300);
    let loan = service.loan(&guild(), &alice, &bob).unwrap().unwrap();
    assert_eq!(loan.outstanding(), 200);
}

/// Accrual persisted by a read survives a snapshot and reload.
#[test]
fn listing_persists_accrual_through_snapshot() {
    let clock = clock_at_noon(2024, 1, 1);
    let service = service_with(&clock);
    let (alice, bob) = (member("alice"), member("bob"));
    service.give(&guild(), &alice, &bob, 100, Some(10)).unwrap();

    clock.advance_days(2);
    let loans = service.all_loans(&guild()).unwrap();
    assert_eq!(loans[0].outstanding(), 120);

    let json = service.store().snapshot().unwrap().to_json().unwrap();
    let restored = MemoryStore::from_snapshot(
        LedgerSnapshot::from_json(&json).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap(),
    );
    let stored = restored.get(&guild(), &alice, &bob).unwrap().unwrap();
    assert_eq!(stored.loan.outstanding(), 120);
}
