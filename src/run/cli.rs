use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;

use crate::budget::alert::AlertTier;
use crate::budget::BudgetTracker;
use crate::db::{Database, LedgerStore, TransactionFilter};
use crate::models::{
    parse_flag, BudgetMonth, SettingKey, TransactionInput, TransactionKind, UserId,
};
use crate::notify::Notifier;
use crate::report::{export_csv, Report, ReportPeriod};
use crate::workflow::TransactionWorkflow;

/// Handles the commands that need neither the database nor a session.
/// Returns whether one was handled.
pub(crate) fn print_info(args: &[String]) -> bool {
    match args.get(1).map(String::as_str) {
        None | Some("--help" | "-h" | "help") => {
            print_usage();
            true
        }
        Some("--version" | "-V" | "version") => {
            println!("smartexpense {}", env!("CARGO_PKG_VERSION"));
            true
        }
        Some(_) => false,
    }
}

pub(crate) fn run_command(
    args: &[String],
    db: &mut Database,
    user_id: &UserId,
    notifier: &Notifier,
) -> Result<()> {
    let Some(command) = args.get(1) else {
        print_usage();
        return Ok(());
    };
    let rest = &args[2..];
    match command.as_str() {
        "add" | "a" => cli_add(rest, db, user_id, notifier),
        "delete" | "rm" => cli_delete(rest, db, user_id, notifier),
        "list" | "ls" => cli_list(rest, db, user_id),
        "budget" => cli_budget(rest, db, user_id),
        "budgets" | "b" => cli_budgets(rest, db, user_id),
        "unbudget" => cli_unbudget(rest, db, user_id),
        "report" | "r" => cli_report(rest, db, user_id),
        "export" => cli_export(rest, db, user_id),
        "settings" => cli_settings(db, user_id),
        "set" => cli_set(rest, db, user_id),
        "contact" => cli_contact(rest, notifier),
        other => {
            print_usage();
            bail!("Unknown command: {other}");
        }
    }
}

fn print_usage() {
    println!("SmartExpense - personal budgeting with spending alerts");
    println!();
    println!("Usage: smartexpense <command>");
    println!();
    println!("Commands:");
    println!("  add <income|expense> <amount> <category>");
    println!("    --date <YYYY-MM-DD>         Date of the transaction (default: today)");
    println!("    --desc <text>               Description");
    println!("  delete <id>                   Delete a transaction");
    println!("  list                          List transactions, newest first");
    println!("    --kind <income|expense>");
    println!("    --category <name>");
    println!("    --from <YYYY-MM-DD>");
    println!("    --to <YYYY-MM-DD>");
    println!("  budget <category> <limit>     Create a monthly budget");
    println!("    --month <YYYY-MM>           Month of the budget (default: current)");
    println!("  budgets [YYYY-MM]             Show budgets and their usage");
    println!("  unbudget <id>                 Delete a budget");
    println!("  report [month|3months]        Income, expenses and trends");
    println!("  export [path]                 Export transactions to CSV");
    println!("    --month <YYYY-MM>           Month to export (default: current)");
    println!("  settings                      Show your settings");
    println!("  set <key> <value>             Change a setting");
    println!("  contact <name> <email> <subject>");
    println!("                                Send a contact notice to everyone connected");
    println!("  --help, -h                    Show this help");
    println!("  --version, -V                 Show version");
    println!();
    println!("Environment: SMARTEXPENSE_DB, SMARTEXPENSE_USER, SMARTEXPENSE_LOG");
}

// ── Transactions ─────────────────────────────────────────────

fn cli_add(args: &[String], db: &mut Database, user_id: &UserId, notifier: &Notifier) -> Result<()> {
    let positional = positionals(args, &["--date", "--desc"]);
    let [kind, amount, category] = positional[..] else {
        bail!("Usage: smartexpense add <income|expense> <amount> <category> [--date YYYY-MM-DD] [--desc TEXT]");
    };

    let input = TransactionInput {
        amount: parse_amount(amount)?,
        kind: kind.to_string(),
        category: category.to_string(),
        date: flag(args, "--date").map(parse_date).transpose()?,
        description: flag(args, "--desc").map(str::to_string),
    };

    let txn = TransactionWorkflow::new(db, notifier).submit_transaction(user_id, input)?;
    println!(
        "Added {} #{}: ${:.2} {} on {}",
        txn.kind,
        txn.id.unwrap_or(0),
        txn.amount,
        txn.category,
        txn.date
    );
    Ok(())
}

fn cli_delete(args: &[String], db: &mut Database, user_id: &UserId, notifier: &Notifier) -> Result<()> {
    let id = parse_id(args.first(), "Usage: smartexpense delete <id>")?;
    let txn = TransactionWorkflow::new(db, notifier).delete_transaction(id, user_id)?;
    println!(
        "Deleted {} #{id}: ${:.2} {} on {}",
        txn.kind, txn.amount, txn.category, txn.date
    );
    Ok(())
}

fn cli_list(args: &[String], db: &mut Database, user_id: &UserId) -> Result<()> {
    let kind = match flag(args, "--kind") {
        Some(k) => Some(
            TransactionKind::parse(k)
                .with_context(|| format!("Unknown kind '{k}', expected income or expense"))?,
        ),
        None => None,
    };
    let filter = TransactionFilter {
        kind,
        category: flag(args, "--category").map(str::to_string),
        from: flag(args, "--from").map(parse_date).transpose()?,
        to: flag(args, "--to").map(parse_date).transpose()?,
        month: None,
    };

    let txns = db.get_transactions(user_id, &filter)?;
    if txns.is_empty() {
        println!("No transactions");
        return Ok(());
    }

    println!(
        "{:<6} {:<10} {:<8} {:<20} {:>12}  Description",
        "ID", "Date", "Kind", "Category", "Amount"
    );
    println!("{}", "─".repeat(72));
    for txn in &txns {
        println!(
            "{:<6} {:<10} {:<8} {:<20} {:>12}  {}",
            txn.id.unwrap_or(0),
            txn.date,
            txn.kind,
            txn.category,
            format!("${:.2}", txn.amount),
            txn.description,
        );
    }
    Ok(())
}

// ── Budgets ──────────────────────────────────────────────────

fn cli_budget(args: &[String], db: &mut Database, user_id: &UserId) -> Result<()> {
    let positional = positionals(args, &["--month"]);
    let [category, limit] = positional[..] else {
        bail!("Usage: smartexpense budget <category> <limit> [--month YYYY-MM]");
    };
    let month = month_flag(args)?;
    let limit = Decimal::from_str(limit).with_context(|| format!("Invalid limit '{limit}'"))?;

    let budget = BudgetTracker::create_budget(db, user_id, category, limit, month)?;
    println!(
        "Budget #{} for {} in {month}: ${:.2} (spent so far ${:.2})",
        budget.id.unwrap_or(0),
        budget.category,
        budget.limit_amount,
        budget.spent
    );
    Ok(())
}

fn cli_budgets(args: &[String], db: &mut Database, user_id: &UserId) -> Result<()> {
    let month = match args.first().filter(|a| !a.starts_with('-')) {
        Some(m) => BudgetMonth::parse(m)?,
        None => BudgetMonth::current(),
    };

    let budgets = BudgetTracker::refresh_month(db, user_id, month)?;
    println!("Budgets — {month}");
    println!("{}", "─".repeat(64));
    if budgets.is_empty() {
        println!("  No budgets");
    }
    for budget in &budgets {
        let percentage = budget.percentage_used();
        println!(
            "  #{:<4} {:<20} ${:>10.2} of ${:>10.2}  {:>5.1}%  left ${:<10.2} {}",
            budget.id.unwrap_or(0),
            budget.category,
            budget.spent,
            budget.limit_amount,
            percentage,
            budget.remaining(),
            AlertTier::classify(percentage),
        );
    }

    let unbudgeted: Vec<(String, Decimal)> = db
        .get_spending_by_category(user_id, month)?
        .into_iter()
        .filter(|(name, _)| !budgets.iter().any(|b| b.matches_category(name)))
        .collect();
    if !unbudgeted.is_empty() {
        println!();
        println!("Spending without a budget:");
        for (name, amount) in &unbudgeted {
            println!("  {name:<26} ${amount:.2}");
        }
    }
    Ok(())
}

fn cli_unbudget(args: &[String], db: &mut Database, user_id: &UserId) -> Result<()> {
    let id = parse_id(args.first(), "Usage: smartexpense unbudget <id>")?;
    let budget = BudgetTracker::delete_budget(db, id, user_id)?;
    println!("Deleted budget #{id} for {} in {}", budget.category, budget.month);
    Ok(())
}

// ── Reports ──────────────────────────────────────────────────

fn cli_report(args: &[String], db: &mut Database, user_id: &UserId) -> Result<()> {
    let period = match args.first() {
        Some(p) => ReportPeriod::parse(p)
            .with_context(|| format!("Unknown period '{p}', expected month or 3months"))?,
        None => ReportPeriod::Month,
    };
    let report = Report::build(db, user_id, period, Local::now().date_naive())?;

    println!("SmartExpense — {} (since {})", report.period.label(), report.since);
    println!("{}", "─".repeat(40));
    println!("  Income:        ${:.2}", report.total_income);
    println!("  Expenses:      ${:.2}", report.total_expenses);
    println!("  Net savings:   ${:.2}", report.net_savings);
    println!("  Savings rate:  {:.1}%", report.savings_rate);
    match &report.largest_category {
        Some(name) => println!(
            "  Largest:       {name} ({:.1}% of expenses)",
            report.largest_category_share
        ),
        None => println!("  Largest:       None"),
    }
    println!("  Over budget:   {}", report.categories_over_budget);

    if !report.breakdown.is_empty() {
        println!();
        println!("Expenses by Category:");
        for (name, amount) in &report.breakdown {
            println!("  {name:<24} ${amount:.2}");
        }
    }
    if !report.trends.is_empty() {
        println!();
        println!("Monthly Trends:");
        for trend in &report.trends {
            println!(
                "  {}  in ${:>10.2}  out ${:>10.2}",
                trend.month, trend.income, trend.expenses
            );
        }
    }
    Ok(())
}

fn cli_export(args: &[String], db: &mut Database, user_id: &UserId) -> Result<()> {
    let month = month_flag(args)?;

    // Output path is the first non-flag argument
    let output_path = args
        .first()
        .filter(|a| !a.starts_with('-'))
        .map(|a| PathBuf::from(shellexpand(a)))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(format!("{home}/smartexpense-export-{month}.csv"))
        });

    let count = export_csv(db, &output_path, user_id, month)?;
    if count == 0 {
        println!("No transactions for {month}");
    } else {
        println!("Exported {count} transactions to {}", output_path.display());
    }
    Ok(())
}

// ── Settings ─────────────────────────────────────────────────

fn cli_settings(db: &mut Database, user_id: &UserId) -> Result<()> {
    let settings = db.get_user_settings(user_id)?;
    let flag_text = |on: bool| if on { "on" } else { "off" };

    println!("Settings for {user_id}");
    println!("{}", "─".repeat(40));
    println!("  Categories:          {}", settings.categories.join(", "));
    println!("  Currency:            {}", settings.currency);
    println!("  DateFormat:          {}", settings.date_format);
    println!("  Theme:               {}", settings.theme);
    println!("  DarkMode:            {}", flag_text(settings.dark_mode));
    println!("  ShowBudgetAlerts:    {}", flag_text(settings.show_budget_alerts));
    println!("  EmailNotifications:  {}", flag_text(settings.email_notifications));
    println!("  WeeklySummary:       {}", flag_text(settings.weekly_summary));
    println!("  AutoLogout:          {}", flag_text(settings.auto_logout));
    Ok(())
}

fn cli_set(args: &[String], db: &mut Database, user_id: &UserId) -> Result<()> {
    let (Some(key), Some(_)) = (args.first(), args.get(1)) else {
        bail!("Usage: smartexpense set <key> <value>");
    };
    let value = args[1..].join(" ");
    let key = SettingKey::parse(key).with_context(|| {
        let keys: Vec<&str> = SettingKey::all().iter().map(|k| k.as_str()).collect();
        format!("Unknown setting '{key}', expected one of: {}", keys.join(", "))
    })?;

    let stored = match key {
        SettingKey::Categories => {
            let categories: Vec<&str> = value
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect();
            if categories.is_empty() {
                bail!("At least one category is required");
            }
            serde_json::to_string(&categories)?
        }
        flag_key if flag_key.is_flag() => {
            let on = parse_flag(&value)
                .with_context(|| format!("{flag_key} expects on or off, got '{value}'"))?;
            on.to_string()
        }
        _ => value.trim().to_string(),
    };

    db.set_setting(user_id, key, &stored)?;
    println!("{key} = {stored}");
    Ok(())
}

// ── Contact ──────────────────────────────────────────────────

fn cli_contact(args: &[String], notifier: &Notifier) -> Result<()> {
    let [name, email, subject @ ..] = args else {
        bail!("Usage: smartexpense contact <name> <email> <subject>");
    };
    if subject.is_empty() {
        bail!("Usage: smartexpense contact <name> <email> <subject>");
    }
    notifier.notify_contact_submission(name, email, &subject.join(" "));
    println!("Contact notice sent");
    Ok(())
}

// ── Argument helpers ─────────────────────────────────────────

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

/// Arguments that are neither a flag nor the value following one.
fn positionals<'a>(args: &'a [String], value_flags: &[&str]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if value_flags.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(arg.as_str());
        }
    }
    out
}

fn month_flag(args: &[String]) -> Result<BudgetMonth> {
    match flag(args, "--month") {
        Some(m) => BudgetMonth::parse(m),
        None => Ok(BudgetMonth::current()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{s}', expected YYYY-MM-DD"))
}

fn parse_amount(s: &str) -> Result<Decimal> {
    let cleaned = s.trim().trim_start_matches('$').replace(',', "");
    Decimal::from_str(&cleaned).with_context(|| format!("Invalid amount '{s}'"))
}

fn parse_id(arg: Option<&String>, usage: &str) -> Result<i64> {
    let Some(arg) = arg else {
        bail!("{usage}");
    };
    arg.parse()
        .with_context(|| format!("Invalid id '{arg}'"))
}

pub(crate) fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        format!("{home}/{rest}")
    } else {
        path.to_string()
    }
}
