use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::categorize::{categorize_pending, confirm_category, CategoryClassifier, RuleClassifier};
use crate::config::Settings;
use crate::db::Database;
use crate::fx::{RateSource, StaticRates};
use crate::import::{import_statement_file, SOURCE_CC_SLIP};
use crate::matching::{
    find_duplicate_groups, is_app_source, link_matches, match_new_receipt, merge_group, merge_p2p, reconcile_p2p,
    MergeOverrides,
};
use crate::models::{EmailReceipt, ReceiptItem, TxType};
use crate::sms::{ingest_sms, sweep_stale, IngestOutcome, SmsCandidate, SmsParser};

/// Flags that take a value. Everything else starting with `--` is a switch.
const VALUE_FLAGS: &[&str] = &[
    "--household",
    "--currency",
    "--items",
    "--notes",
    "--category",
    "--type",
    "--file",
    "--source",
];

pub(crate) fn as_cli(args: &[String], db: &mut Database, settings: &Settings) -> Result<()> {
    let rest = args.get(2..).unwrap_or_default();
    match args.get(1).map(String::as_str).unwrap_or("help") {
        "parse-sms" => cli_parse_sms(rest, settings),
        "sms" => cli_sms(rest, db, settings),
        "import" => cli_import(rest, db, settings),
        "receipt" => cli_receipt(rest, db, settings),
        "duplicates" => cli_duplicates(rest, db, settings),
        "merge" => cli_merge(rest, db),
        "p2p" => cli_p2p(rest, db, settings),
        "p2p-merge" => cli_p2p_merge(rest, db),
        "stale" => cli_stale(rest, db, settings),
        "categorize" => cli_categorize(rest, db, settings),
        "remember" => cli_remember(rest, db),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("ledgerlink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => {
            print_usage();
            anyhow::bail!("Unknown command: {other}");
        }
    }
}

pub(crate) fn print_usage() {
    println!("LedgerLink - one household ledger from SMS alerts, receipts, statements and P2P apps");
    println!();
    println!("Usage: ledgerlink <command> [--household <id>]");
    println!();
    println!("Commands:");
    println!("  parse-sms <text>                    Show how an SMS alert is read");
    println!("    --trusted                         Message came from a known card sender");
    println!("  sms <text>                          Record an SMS alert as a provisional transaction");
    println!("    --file <path>                     One message per line instead of <text>");
    println!("  import <file.csv>                   Import a card statement (auto-detects issuer)");
    println!("    --source <tag>                    screenshot or app_upload for P2P app exports");
    println!("  receipt <merchant> <amount> <YYYY-MM-DD>");
    println!("                                      Record a receipt and link it to a transaction");
    println!("    --currency <code>                 Receipt currency (default: local currency)");
    println!("    --items <json>                    Line items as a JSON array");
    println!("  duplicates                          List groups of likely duplicate transactions");
    println!("  merge <id> <id>...                  Merge transactions into the first id");
    println!("    --notes <text> --category <name> --type <expense|income|transfer>");
    println!("  p2p                                 Propose app payment / statement line pairs");
    println!("  p2p-merge <app_id> <cc_id>          Fold an app payment into its statement line");
    println!("    --category <name>                 Category for the merged row");
    println!("  stale                               Flag SMS alerts no statement confirmed");
    println!("  categorize                          Categorize open transactions");
    println!("  remember <transaction_id> <category>");
    println!("                                      Confirm a category and remember the merchant");
    println!("  --help, -h                          Show this help");
    println!("  --version, -V                       Show version");
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Arguments that are neither flags nor flag values.
fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(arg.as_str());
        }
    }
    out
}

fn household(args: &[String], settings: &Settings) -> Result<i64> {
    match flag(args, "--household") {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid household id: {raw}")),
        None => Ok(settings.default_household),
    }
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .with_context(|| format!("Invalid transaction id: {raw}"))
}

fn rate_source(settings: &Settings) -> Arc<dyn RateSource> {
    Arc::new(StaticRates::new(
        &settings.local_currency,
        settings.fx_rates.clone(),
    ))
}

fn print_candidate(c: &SmsCandidate) {
    println!("  Valid:       {}", c.is_valid);
    println!("  Confidence:  {}", c.confidence);
    println!("  Provider:    {}", c.provider.as_str());
    println!("  Card:        {}", c.card_ending.as_deref().unwrap_or("-"));
    println!("  Merchant:    {}", c.merchant_name.as_deref().unwrap_or("-"));
    match c.amount {
        Some(amount) => println!("  Amount:      {amount} {}", c.currency),
        None => println!("  Amount:      -"),
    }
    let found = if c.date_found { "" } else { " (not in message)" };
    println!("  Date:        {}{found}", c.transaction_date);
}

fn cli_parse_sms(args: &[String], settings: &Settings) -> Result<()> {
    let text = positionals(args).join(" ");
    if text.trim().is_empty() {
        anyhow::bail!("Usage: ledgerlink parse-sms <text> [--trusted]");
    }
    let parser = SmsParser::new(&settings.local_currency)?;
    print_candidate(&parser.parse(&text, has_flag(args, "--trusted")));
    Ok(())
}

fn cli_sms(args: &[String], db: &mut Database, settings: &Settings) -> Result<()> {
    let household_id = household(args, settings)?;
    let trusted = has_flag(args, "--trusted");
    let messages: Vec<String> = match flag(args, "--file") {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {path}"))?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        None => vec![positionals(args).join(" ")],
    };
    if messages.iter().all(|m| m.trim().is_empty()) {
        anyhow::bail!("Usage: ledgerlink sms <text> | --file <path> [--trusted] [--household <id>]");
    }

    let parser = SmsParser::new(&settings.local_currency)?;
    let window = Duration::minutes(settings.sms_duplicate_window_minutes);
    let (mut created, mut duplicates, mut rejected) = (0, 0, 0);
    for candidate in parser.parse_batch(&messages, trusted) {
        match ingest_sms(db, household_id, &candidate, Utc::now(), window)? {
            IngestOutcome::Created {
                transaction_id,
                sms_id,
            } => {
                created += 1;
                println!(
                    "Recorded SMS {sms_id} as provisional transaction {transaction_id}: {} {}",
                    candidate.merchant_name.as_deref().unwrap_or("?"),
                    candidate.amount.unwrap_or_default()
                );
            }
            IngestOutcome::Duplicate { existing_sms_id } => {
                duplicates += 1;
                println!("Already recorded as SMS {existing_sms_id}");
            }
            IngestOutcome::Rejected { confidence } => {
                rejected += 1;
                println!("Not a transaction alert (confidence {confidence})");
            }
        }
    }
    if messages.len() > 1 {
        println!("{created} recorded, {duplicates} duplicates, {rejected} rejected");
    }
    Ok(())
}

fn cli_import(args: &[String], db: &mut Database, settings: &Settings) -> Result<()> {
    let household_id = household(args, settings)?;
    let Some(file_path) = positionals(args).first().copied() else {
        anyhow::bail!("Usage: ledgerlink import <file.csv> [--household <id>]");
    };
    let path = Path::new(file_path);
    if !path.exists() {
        anyhow::bail!("File not found: {file_path}");
    }
    let source = flag(args, "--source").unwrap_or(SOURCE_CC_SLIP).to_lowercase();
    if source != SOURCE_CC_SLIP && !is_app_source(&source) {
        anyhow::bail!("Unknown source '{source}'. Use cc_slip, screenshot or app_upload");
    }

    let report = import_statement_file(
        db,
        household_id,
        path,
        None,
        &source,
        settings,
        &rate_source(settings),
        Utc::now(),
    )?;
    println!("{}", report.detail);
    println!(
        "Household {household_id} now has {} transactions",
        db.get_transaction_count(household_id)?
    );
    Ok(())
}

fn cli_receipt(args: &[String], db: &mut Database, settings: &Settings) -> Result<()> {
    let household_id = household(args, settings)?;
    let pos = positionals(args);
    let [merchant, amount, date] = pos.as_slice() else {
        anyhow::bail!(
            "Usage: ledgerlink receipt <merchant> <amount> <YYYY-MM-DD> [--currency <code>] [--items <json>]"
        );
    };
    let amount = crate::import::parse_decimal(amount)?.abs();
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {date}"))?;
    let currency = flag(args, "--currency")
        .unwrap_or(&settings.local_currency)
        .to_uppercase();

    let mut receipt = EmailReceipt::new(household_id, merchant.to_string(), amount, currency, date);
    if let Some(items) = flag(args, "--items") {
        receipt.items = serde_json::from_str::<Vec<ReceiptItem>>(items)
            .context("Failed to parse --items as a JSON array")?;
    }
    receipt.id = Some(db.insert_receipt(&receipt)?);
    println!("Recorded receipt {}", receipt.id.unwrap_or(0));

    match match_new_receipt(db, &receipt, &settings.fx_bands())? {
        Some(m) => {
            let report = link_matches(db, std::slice::from_ref(&m), Utc::now());
            if report.linked == 1 {
                println!(
                    "Linked to transaction {} ({}, confidence {})",
                    m.transaction_id,
                    m.reason.as_str(),
                    m.confidence
                );
            } else {
                println!("{}", report.detail);
            }
        }
        None => println!("No matching transaction yet"),
    }
    Ok(())
}

fn cli_duplicates(args: &[String], db: &mut Database, settings: &Settings) -> Result<()> {
    let household_id = household(args, settings)?;
    let txns = db.get_household_transactions(household_id)?;
    let groups = find_duplicate_groups(&txns);
    if groups.is_empty() {
        println!("No likely duplicates");
        return Ok(());
    }

    for group in &groups {
        println!("Group {}", group.key);
        for t in &group.members {
            println!(
                "  {:<6} {}  {:>10} {}  {:<24} {}",
                t.id.unwrap_or(0),
                t.date,
                t.amount,
                t.currency,
                t.display_merchant(),
                t.source
            );
        }
        let ids: Vec<String> = group.ids().iter().map(i64::to_string).collect();
        println!("  merge: ledgerlink merge {}", ids.join(" "));
    }
    println!();
    println!("{} groups", groups.len());
    Ok(())
}

fn cli_merge(args: &[String], db: &mut Database) -> Result<()> {
    let ids = positionals(args)
        .into_iter()
        .map(parse_id)
        .collect::<Result<Vec<i64>>>()?;
    if ids.len() < 2 {
        anyhow::bail!("Usage: ledgerlink merge <id> <id>... [--notes <text>] [--category <name>] [--type <type>]");
    }

    let overrides = MergeOverrides {
        notes: flag(args, "--notes").map(str::to_string),
        category: flag(args, "--category").map(str::to_string),
        tx_type: flag(args, "--type").map(TxType::parse),
    };
    let outcome = merge_group(db, &ids, &overrides)?;
    println!("{}", outcome.detail);
    Ok(())
}

fn cli_p2p(args: &[String], db: &mut Database, settings: &Settings) -> Result<()> {
    let household_id = household(args, settings)?;
    let report = reconcile_p2p(db, household_id)?;

    for m in &report.matches {
        println!(
            "  app {:<6} -> statement {:<6} confidence {}  {}",
            m.app_transaction_id, m.cc_transaction_id, m.confidence, m.reason
        );
    }
    for a in &report.ambiguous {
        let ids: Vec<String> = a.candidate_ids.iter().map(i64::to_string).collect();
        println!(
            "  app {:<6} has several candidates: {}",
            a.app_transaction_id,
            ids.join(", ")
        );
    }
    println!("{}", report.detail);
    Ok(())
}

fn cli_p2p_merge(args: &[String], db: &mut Database) -> Result<()> {
    let pos = positionals(args);
    let [app_id, cc_id] = pos.as_slice() else {
        anyhow::bail!("Usage: ledgerlink p2p-merge <app_id> <cc_id> [--category <name>]");
    };
    let (app_id, cc_id) = (parse_id(app_id)?, parse_id(cc_id)?);
    merge_p2p(db, app_id, cc_id, flag(args, "--category"))?;
    println!("Merged app payment {app_id} into statement line {cc_id}");
    Ok(())
}

fn cli_stale(args: &[String], db: &mut Database, settings: &Settings) -> Result<()> {
    let household_id = household(args, settings)?;
    let report = sweep_stale(
        db,
        household_id,
        Duration::days(settings.stale_sms_days),
        Utc::now(),
    )?;
    for sms in &report.stale {
        println!(
            "  SMS {:<6} {}  {:>10} {}  {}",
            sms.id.unwrap_or(0),
            sms.transaction_date,
            sms.amount,
            sms.currency,
            sms.merchant_name.as_deref().unwrap_or("?")
        );
    }
    println!("{}", report.detail);
    Ok(())
}

fn cli_categorize(args: &[String], db: &mut Database, settings: &Settings) -> Result<()> {
    let household_id = household(args, settings)?;
    let rules = RuleClassifier::new(&settings.category_rules);
    let classifier: Option<Arc<dyn CategoryClassifier>> = if rules.is_empty() {
        None
    } else {
        Some(Arc::new(rules))
    };
    let report = categorize_pending(
        db,
        household_id,
        classifier.as_ref(),
        settings.classifier_chunk_size,
        std::time::Duration::from_millis(settings.classifier_timeout_ms),
    )?;
    println!("{}", report.detail);
    Ok(())
}

fn cli_remember(args: &[String], db: &mut Database) -> Result<()> {
    let pos = positionals(args);
    let Some((id, category)) = pos.split_first() else {
        anyhow::bail!("Usage: ledgerlink remember <transaction_id> <category>");
    };
    if category.is_empty() {
        anyhow::bail!("Usage: ledgerlink remember <transaction_id> <category>");
    }
    let stored = confirm_category(db, parse_id(id)?, &category.join(" "))?;
    println!("Transaction {id} is now {stored}");
    Ok(())
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
