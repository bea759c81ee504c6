//! Basic lending example.
//!
//! Opens a funded loan, repays part of it, and forgives the rest,
//! showing the credit movements along the way.

use debtbook::prelude::*;

fn print_balances(bank: &MemoryBank, community: &CommunityId, members: &[&MemberId]) {
    println!("Balances:");
    for member in members {
        println!(
            "  {:<8} {:>6} credits",
            member,
            bank.balance(community, member)
        );
    }
}

fn main() {
    println!("╔═══════════════════════════════════╗");
    println!("║  debtbook: Basic Lending Example  ║");
    println!("╚═══════════════════════════════════╝\n");

    let guild = CommunityId::new("guild-1");
    let alice = MemberId::new("alice");
    let bob = MemberId::new("bob");

    let bank = MemoryBank::new();
    bank.set_balance(&guild, &alice, 500).unwrap();
    bank.set_balance(&guild, &bob, 50).unwrap();

    let service = LedgerService::new(MemoryStore::new());

    // --- Scenario 1: A funded loan ---
    println!("━━━ Scenario 1: A Funded Loan ━━━\n");
    print_balances(&bank, &guild, &[&alice, &bob]);

    let mutation = service
        .give_funded(&bank, &guild, &alice, &bob, 300, Some(5))
        .unwrap();
    println!("\n{}\n", mutation);
    print_balances(&bank, &guild, &[&alice, &bob]);
    println!();

    // --- Scenario 2: Repayment is capped at what is owed ---
    println!("━━━ Scenario 2: Repayment ━━━\n");

    let repayment = service
        .repay_funded(&bank, &guild, &alice, &bob, Some(100))
        .unwrap();
    println!("bob pays 100:  {}", repayment);

    // Asking to repay more than the debt settles it exactly.
    let repayment = service
        .repay_funded(&bank, &guild, &alice, &bob, Some(9_999))
        .unwrap();
    println!("bob pays 9999: {}\n", repayment);

    print_balances(&bank, &guild, &[&alice, &bob]);
    match service.loan(&guild, &alice, &bob).unwrap() {
        Some(loan) => println!("\nStill open: {} credits", loan.outstanding()),
        None => println!("\nNo loan remains between alice and bob."),
    }
    println!();

    // --- Scenario 3: Forgiveness ---
    println!("━━━ Scenario 3: Forgiveness ━━━\n");

    service
        .give_funded(&bank, &guild, &alice, &bob, 120, None)
        .unwrap();
    println!("alice lends bob 120, interest-free");

    let forgiveness = service.forgive(&guild, &alice, &bob).unwrap();
    println!("alice forgives the loan: {}", forgiveness);
    println!("(forgiveness writes off the debt; no credits move)\n");

    print_balances(&bank, &guild, &[&alice, &bob]);
}
