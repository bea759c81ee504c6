//! debtbook CLI
//!
//! Manage a JSON ledger of peer-to-peer loans from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Lend 100 credits at 10% per day
//! debtbook give --ledger book.json --community guild-1 \
//!     --lender alice --borrower bob --amount 100 --interest 10
//!
//! # Repay part of it
//! debtbook repay --ledger book.json --community guild-1 \
//!     --lender alice --borrower bob --amount 40
//!
//! # Show everything, with interest accrued to now
//! debtbook list --ledger book.json --community guild-1
//!
//! # Generate a random ledger for testing
//! debtbook generate --members 20 --loans 60 --output book.json
//! ```

use chrono::{DateTime, Utc};
use debtbook::core::clock::ManualClock;
use debtbook::core::loan::Loan;
use debtbook::core::member::{CommunityId, MemberId};
use debtbook::service::ledger::LedgerService;
use debtbook::simulation::stress_test::{generate_random_loan_book, LoanBookConfig};
use debtbook::store::{LedgerSnapshot, MemoryStore};
use std::fs;
use std::io::ErrorKind;
use std::process;

fn print_usage() {
    eprintln!(
        r#"debtbook — peer-to-peer debt ledger with lazy interest accrual

USAGE:
    debtbook <COMMAND> [OPTIONS]

COMMANDS:
    give        Lend an amount, opening or extending a loan
    repay       Repay a loan, in part or in full
    forgive     Write off a loan entirely
    list        Show loans, with interest accrued to now
    clear       Wipe every loan in a community
    generate    Generate a random ledger file (for testing)
    help        Show this message

OPTIONS (give, repay, forgive, list, clear):
    --ledger <FILE>       Path to the ledger JSON file (created if missing)
    --community <ID>      Community the loans belong to
    --lender <ID>         The member who lent; on list, show only loans they gave
    --borrower <ID>       The member who owes; on list, show only loans they owe
    --amount <N>          Whole credits; optional for repay (default: in full)
    --interest <R>        Percent per day (give only; omit for interest-free)
    --member <ID>         On list, show loans this member gave and owes
    --as-of <TIMESTAMP>   RFC 3339 instant to evaluate at (default: now)
    --format <FORMAT>     Output format: text (default) or json

OPTIONS (generate):
    --members <N>         Number of members (default: 10)
    --loans <N>           Number of loans (default: 30)
    --communities <LIST>  Comma-separated community ids (default: community-1)
    --output <FILE>       Write to file instead of stdout
    --as-of <TIMESTAMP>   RFC 3339 instant loans are aged against (default: now)

EXAMPLES:
    debtbook give --ledger book.json --community guild-1 --lender alice --borrower bob --amount 100 --interest 10
    debtbook repay --ledger book.json --community guild-1 --lender alice --borrower bob
    debtbook list --ledger book.json --community guild-1 --lender alice
    debtbook list --ledger book.json --community guild-1 --member bob --format json
    debtbook clear --ledger book.json --community guild-1
    debtbook generate --members 20 --loans 60 --output book.json"#
    );
}

/// Options shared by the ledger commands.
struct CommonArgs {
    ledger: Option<String>,
    community: Option<CommunityId>,
    lender: Option<MemberId>,
    borrower: Option<MemberId>,
    member: Option<MemberId>,
    amount: Option<u64>,
    interest: Option<u32>,
    as_of: Option<DateTime<Utc>>,
    format: String,
}

fn parse_common(args: &[String]) -> CommonArgs {
    let mut common = CommonArgs {
        ledger: None,
        community: None,
        lender: None,
        borrower: None,
        member: None,
        amount: None,
        interest: None,
        as_of: None,
        format: "text".to_string(),
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--ledger" => {
                i += 1;
                common.ledger = Some(value(args, i, "--ledger requires a file path"));
            }
            "--community" => {
                i += 1;
                common.community = Some(CommunityId::new(value(
                    args,
                    i,
                    "--community requires an id",
                )));
            }
            "--lender" => {
                i += 1;
                common.lender = Some(MemberId::new(value(args, i, "--lender requires an id")));
            }
            "--borrower" => {
                i += 1;
                common.borrower = Some(MemberId::new(value(args, i, "--borrower requires an id")));
            }
            "--member" => {
                i += 1;
                common.member = Some(MemberId::new(value(args, i, "--member requires an id")));
            }
            "--amount" => {
                i += 1;
                common.amount = Some(number(args, i, "--amount requires a whole number"));
            }
            "--interest" => {
                i += 1;
                common.interest = Some(number(args, i, "--interest requires a whole number"));
            }
            "--as-of" => {
                i += 1;
                let raw = value(args, i, "--as-of requires an RFC 3339 timestamp");
                common.as_of = Some(parse_as_of(&raw));
            }
            "--format" => {
                i += 1;
                common.format = value(args, i, "--format requires 'text' or 'json'");
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }
    common
}

fn parse_as_of(raw: &str) -> DateTime<Utc> {
    let parsed = DateTime::parse_from_rfc3339(raw).unwrap_or_else(|e| {
        eprintln!("Invalid --as-of '{}': {}", raw, e);
        process::exit(1);
    });
    parsed.with_timezone(&Utc)
}

fn value(args: &[String], i: usize, msg: &str) -> String {
    args.get(i).cloned().unwrap_or_else(|| {
        eprintln!("{}", msg);
        process::exit(1);
    })
}

fn number<T: std::str::FromStr>(args: &[String], i: usize, msg: &str) -> T {
    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
        eprintln!("{}", msg);
        process::exit(1);
    })
}

fn require<T>(opt: Option<T>, flag: &str) -> T {
    opt.unwrap_or_else(|| {
        eprintln!("Error: {} is required", flag);
        process::exit(1);
    })
}

fn load_ledger(path: &str, now: DateTime<Utc>) -> MemoryStore {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        // A missing file is an empty ledger; it is created on first save.
        Err(e) if e.kind() == ErrorKind::NotFound => return MemoryStore::new(),
        Err(e) => {
            eprintln!("Error reading ledger '{}': {}", path, e);
            process::exit(1);
        }
    };
    let snapshot = LedgerSnapshot::from_json(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing ledger '{}': {}", path, e);
        process::exit(1);
    });
    MemoryStore::from_snapshot(snapshot, now)
}

fn save_ledger(path: &str, store: &MemoryStore) {
    let snapshot = store.snapshot().unwrap_or_else(|e| {
        eprintln!("Error snapshotting ledger: {}", e);
        process::exit(1);
    });
    let json = snapshot.to_json().unwrap_or_else(|e| {
        eprintln!("Error encoding ledger: {}", e);
        process::exit(1);
    });
    fs::write(path, json).unwrap_or_else(|e| {
        eprintln!("Error writing ledger '{}': {}", path, e);
        process::exit(1);
    });
}

/// Build the service pinned to one evaluation instant for the whole
/// invocation. Returns the ledger path alongside for saving.
fn open_service(common: &CommonArgs) -> (LedgerService<MemoryStore, ManualClock>, String) {
    let path = require(common.ledger.clone(), "--ledger <FILE>");
    let now = common.as_of.unwrap_or_else(Utc::now);
    let store = load_ledger(&path, now);
    let service = LedgerService::with_clock(store, ManualClock::new(now));
    (service, path)
}

/// JSON output schema for listed loans.
#[derive(serde::Serialize)]
struct LoanOutput {
    lender: String,
    borrower: String,
    principal: u64,
    outstanding: u64,
    interest_rate: Option<u32>,
    created_at: String,
}

impl From<&Loan> for LoanOutput {
    fn from(loan: &Loan) -> Self {
        Self {
            lender: loan.lender().to_string(),
            borrower: loan.borrower().to_string(),
            principal: loan.principal(),
            outstanding: loan.outstanding(),
            interest_rate: loan.interest_rate(),
            created_at: loan.created_at().to_rfc3339(),
        }
    }
}

fn render_loan(loan: &Loan) -> String {
    let rate = match loan.interest_rate() {
        Some(rate) => format!(" at {}%/day", rate),
        None => String::new(),
    };
    format!(
        "{} -> {}: outstanding {} (principal {}){}",
        loan.lender(),
        loan.borrower(),
        loan.outstanding(),
        loan.principal(),
        rate
    )
}

fn print_loans(heading: &str, loans: &[Loan], format: &str) {
    if format == "json" {
        let output: Vec<LoanOutput> = loans.iter().map(LoanOutput::from).collect();
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
        return;
    }
    println!("{}:", heading);
    if loans.is_empty() {
        println!("  (none)");
        return;
    }
    for loan in loans {
        println!("  {}", render_loan(loan));
    }
    let total: u64 = loans.iter().map(|l| l.outstanding()).sum();
    println!("Total outstanding: {} across {} loans", total, loans.len());
}

/// Which loans a `list` invocation shows.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ListScope {
    All,
    Lender(MemberId),
    Borrower(MemberId),
    Member(MemberId),
}

fn list_scope(common: &CommonArgs) -> Result<ListScope, &'static str> {
    match (&common.lender, &common.borrower, &common.member) {
        (Some(lender), None, None) => Ok(ListScope::Lender(lender.clone())),
        (None, Some(borrower), None) => Ok(ListScope::Borrower(borrower.clone())),
        (None, None, Some(member)) => Ok(ListScope::Member(member.clone())),
        (None, None, None) => Ok(ListScope::All),
        _ => Err("--lender, --borrower, and --member are mutually exclusive for list"),
    }
}

fn cmd_give(args: &[String]) {
    let common = parse_common(args);
    let community = require(common.community.clone(), "--community <ID>");
    let lender = require(common.lender.clone(), "--lender <ID>");
    let borrower = require(common.borrower.clone(), "--borrower <ID>");
    let amount = require(common.amount, "--amount <N>");
    let (service, path) = open_service(&common);

    let mutation = service
        .give(&community, &lender, &borrower, amount, common.interest)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        });
    save_ledger(&path, service.store());

    if common.format == "json" {
        println!("{}", serde_json::to_string_pretty(&mutation).unwrap());
    } else {
        println!("{}", mutation);
    }
}

fn cmd_repay(args: &[String]) {
    let common = parse_common(args);
    let community = require(common.community.clone(), "--community <ID>");
    let lender = require(common.lender.clone(), "--lender <ID>");
    let borrower = require(common.borrower.clone(), "--borrower <ID>");
    let (service, path) = open_service(&common);

    let repayment = service
        .repay(&community, &lender, &borrower, common.amount)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        });
    save_ledger(&path, service.store());

    if common.format == "json" {
        println!("{}", serde_json::to_string_pretty(&repayment).unwrap());
    } else {
        println!("{}", repayment);
    }
}

fn cmd_forgive(args: &[String]) {
    let common = parse_common(args);
    let community = require(common.community.clone(), "--community <ID>");
    let lender = require(common.lender.clone(), "--lender <ID>");
    let borrower = require(common.borrower.clone(), "--borrower <ID>");
    let (service, path) = open_service(&common);

    let forgiveness = service
        .forgive(&community, &lender, &borrower)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        });
    save_ledger(&path, service.store());

    if common.format == "json" {
        println!("{}", serde_json::to_string_pretty(&forgiveness).unwrap());
    } else {
        println!("{}", forgiveness);
    }
}

fn cmd_list(args: &[String]) {
    let common = parse_common(args);
    let community = require(common.community.clone(), "--community <ID>");
    let scope = list_scope(&common).unwrap_or_else(|msg| {
        eprintln!("Error: {}", msg);
        process::exit(1);
    });
    let (service, path) = open_service(&common);

    match &scope {
        ListScope::Member(member) => {
            let given = service
                .loans_given(&community, member)
                .unwrap_or_else(|e| {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                });
            let owed = service
                .loans_owed(&community, member)
                .unwrap_or_else(|e| {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                });
            // Listing accrues; persist what moved.
            save_ledger(&path, service.store());

            if common.format == "json" {
                #[derive(serde::Serialize)]
                struct MemberLoansOutput {
                    given: Vec<LoanOutput>,
                    owed: Vec<LoanOutput>,
                }
                let output = MemberLoansOutput {
                    given: given.iter().map(LoanOutput::from).collect(),
                    owed: owed.iter().map(LoanOutput::from).collect(),
                };
                println!("{}", serde_json::to_string_pretty(&output).unwrap());
            } else {
                println!("Loans given by {}:", member);
                if given.is_empty() {
                    println!("  (none)");
                }
                for loan in &given {
                    println!("  {}", render_loan(loan));
                }
                println!("Loans owed by {}:", member);
                if owed.is_empty() {
                    println!("  (none)");
                }
                for loan in &owed {
                    println!("  {}", render_loan(loan));
                }
            }
        }
        ListScope::Lender(lender) => {
            let loans = service.loans_given(&community, lender).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                process::exit(1);
            });
            save_ledger(&path, service.store());
            print_loans(
                &format!("Loans given by {} in {}", lender, community),
                &loans,
                &common.format,
            );
        }
        ListScope::Borrower(borrower) => {
            let loans = service.loans_owed(&community, borrower).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                process::exit(1);
            });
            save_ledger(&path, service.store());
            print_loans(
                &format!("Loans owed by {} in {}", borrower, community),
                &loans,
                &common.format,
            );
        }
        ListScope::All => {
            let loans = service.all_loans(&community).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                process::exit(1);
            });
            save_ledger(&path, service.store());
            print_loans(&format!("Loans in {}", community), &loans, &common.format);
        }
    }
}

fn cmd_clear(args: &[String]) {
    let common = parse_common(args);
    let community = require(common.community.clone(), "--community <ID>");
    let (service, path) = open_service(&common);

    let removed = service.clear_community(&community).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });
    save_ledger(&path, service.store());
    println!("Cleared {} loans from {}", removed, community);
}

/// Options for `generate`.
struct GenerateArgs {
    members: usize,
    loans: usize,
    communities: Vec<CommunityId>,
    output: Option<String>,
    as_of: Option<DateTime<Utc>>,
}

fn parse_generate(args: &[String]) -> GenerateArgs {
    let mut parsed = GenerateArgs {
        members: 10,
        loans: 30,
        communities: vec![CommunityId::new("community-1")],
        output: None,
        as_of: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--members" => {
                i += 1;
                parsed.members = number(args, i, "--members requires a number");
            }
            "--loans" => {
                i += 1;
                parsed.loans = number(args, i, "--loans requires a number");
            }
            "--communities" => {
                i += 1;
                let raw = value(args, i, "--communities requires a comma-separated list");
                parsed.communities = raw.split(',').map(|s| CommunityId::new(s.trim())).collect();
            }
            "--output" => {
                i += 1;
                parsed.output = Some(value(args, i, "--output requires a file path"));
            }
            "--as-of" => {
                i += 1;
                let raw = value(args, i, "--as-of requires an RFC 3339 timestamp");
                parsed.as_of = Some(parse_as_of(&raw));
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }
    parsed
}

fn cmd_generate(args: &[String]) {
    let parsed = parse_generate(args);
    if parsed.members < 2 {
        eprintln!("--members must be at least 2");
        process::exit(1);
    }

    let config = LoanBookConfig {
        member_count: parsed.members,
        loan_count: parsed.loans,
        communities: parsed.communities,
        ..Default::default()
    };

    // Loan ages are backdated relative to the generation instant.
    let now = parsed.as_of.unwrap_or_else(Utc::now);
    let store = generate_random_loan_book(&config, now);
    let snapshot = store.snapshot().unwrap_or_else(|e| {
        eprintln!("Error snapshotting ledger: {}", e);
        process::exit(1);
    });
    let json = snapshot.to_json().unwrap_or_else(|e| {
        eprintln!("Error encoding ledger: {}", e);
        process::exit(1);
    });

    if let Some(path) = parsed.output {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated {} loans across {} members -> {}",
            snapshot.loan_count(),
            parsed.members,
            path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "give" => cmd_give(rest),
        "repay" => cmd_repay(rest),
        "forgive" => cmd_forgive(rest),
        "list" => cmd_list(rest),
        "clear" => cmd_clear(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}
