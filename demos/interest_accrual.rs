//! Interest accrual example.
//!
//! Walks loans through several days of simple interest with a manual
//! clock, showing accrual-on-read, rounding, and what re-lending does
//! to a running loan.

use chrono::{TimeZone, Utc};
use debtbook::prelude::*;
use std::sync::Arc;

fn main() {
    println!("╔══════════════════════════════════════╗");
    println!("║  debtbook: Interest Accrual Example  ║");
    println!("╚══════════════════════════════════════╝\n");

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
    ));
    let service = LedgerService::with_clock(MemoryStore::new(), Arc::clone(&clock));
    let guild = CommunityId::new("guild-1");

    let alice = MemberId::new("alice");
    let bob = MemberId::new("bob");
    let carol = MemberId::new("carol");
    let dave = MemberId::new("dave");

    // --- Scenario 1: Interest over a quiet gap ---
    println!("━━━ Scenario 1: Interest Over a Quiet Gap ━━━\n");

    service.give(&guild, &alice, &bob, 100, Some(10)).unwrap();
    println!("Day 0: alice lends bob 100 at 10%/day");

    clock.advance_days(3);
    let loan = service.loan(&guild, &alice, &bob).unwrap().unwrap();
    println!(
        "Day 3: first read finds bob owing {} (simple interest over 3 days)\n",
        loan.outstanding()
    );

    // --- Scenario 2: Daily reads compound ---
    println!("━━━ Scenario 2: Daily Reads Compound ━━━\n");

    service.give(&guild, &carol, &dave, 100, Some(10)).unwrap();
    println!("Day 0: carol lends dave 100 at 10%/day");

    for day in 1..=3 {
        clock.advance_days(1);
        let loan = service.loan(&guild, &carol, &dave).unwrap().unwrap();
        println!("Day {}: dave owes {}", day, loan.outstanding());
    }
    println!("Each read persists the interest, so the next day accrues on the new balance.\n");

    // --- Scenario 3: Rounding favors the lender ---
    println!("━━━ Scenario 3: Rounding Favors the Lender ━━━\n");

    let erin = MemberId::new("erin");
    let frank = MemberId::new("frank");
    service.give(&guild, &erin, &frank, 33, Some(10)).unwrap();
    clock.advance_days(1);
    let loan = service.loan(&guild, &erin, &frank).unwrap().unwrap();
    println!(
        "33 at 10%/day accrues ceil(3.3) = 4 after one day: frank owes {}\n",
        loan.outstanding()
    );

    // --- Scenario 4: Re-lending folds into the running loan ---
    println!("━━━ Scenario 4: Re-Lending Folds Into the Running Loan ━━━\n");

    // alice -> bob was last read on its day 3, at 130. Days have passed
    // unread since; the merge replaces the terms without applying them.
    let mutation = service.give(&guild, &alice, &bob, 50, None).unwrap();
    println!("alice lends bob 50 more with no rate: {}", mutation);
    println!("(interest never read out is not applied; the new terms start fresh)");

    clock.advance_days(5);
    let loan = service.loan(&guild, &alice, &bob).unwrap().unwrap();
    println!(
        "Five days later, still {}: the loan is now interest-free",
        loan.outstanding()
    );
}
