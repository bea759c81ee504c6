use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use debtbook::core::clock::ManualClock;
use debtbook::core::loan::Loan;
use debtbook::core::member::{CommunityId, MemberId};
use debtbook::service::ledger::LedgerService;
use debtbook::simulation::stress_test::{generate_random_loan_book, LoanBookConfig};
use debtbook::store::MemoryStore;

fn bench_accrue_single_loan(c: &mut Criterion) {
    let opened = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let loan = Loan::open(
        MemberId::new("alice"),
        MemberId::new("bob"),
        100_000,
        Some(10),
        opened,
    );
    let later = opened + Duration::days(30);

    c.bench_function("accrue_single_loan", |b| {
        b.iter(|| black_box(&loan).accrue(black_box(later)))
    });
}

fn bench_list_100_loans(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let config = LoanBookConfig {
        member_count: 40,
        loan_count: 100,
        ..Default::default()
    };
    let store = generate_random_loan_book(&config, now);
    let community = config.communities[0].clone();
    let service = LedgerService::with_clock(store, ManualClock::new(now));

    c.bench_function("list_100_loans", |b| {
        b.iter(|| service.all_loans(black_box(&community)).unwrap())
    });
}

fn bench_list_1000_loans(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let config = LoanBookConfig {
        member_count: 120,
        loan_count: 1000,
        ..Default::default()
    };
    let store = generate_random_loan_book(&config, now);
    let community = config.communities[0].clone();
    let service = LedgerService::with_clock(store, ManualClock::new(now));

    c.bench_function("list_1000_loans", |b| {
        b.iter(|| service.all_loans(black_box(&community)).unwrap())
    });
}

fn bench_give_repay_cycle(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let service = LedgerService::with_clock(MemoryStore::new(), ManualClock::new(now));
    let community = CommunityId::new("bench");
    let (alice, bob) = (MemberId::new("alice"), MemberId::new("bob"));

    c.bench_function("give_repay_cycle", |b| {
        b.iter(|| {
            service
                .give(&community, &alice, &bob, black_box(100), Some(10))
                .unwrap();
            service.repay(&community, &alice, &bob, None).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_accrue_single_loan,
    bench_list_100_loans,
    bench_list_1000_loans,
    bench_give_repay_cycle
);
criterion_main!(benches);
