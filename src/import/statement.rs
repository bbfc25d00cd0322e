use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{detect_statement_format, CsvImporter, CsvProfile};
use crate::config::Settings;
use crate::db::Database;
use crate::fx::{rate_or_parity, RateSource};
use crate::matching::{is_app_source, link_matches, match_new_transactions};
use crate::models::{ParsedTransaction, Transaction};
use crate::sms::{find_sms_for_slip, merge_slip_into_sms, SlipEvidence};

pub(crate) const SOURCE_CC_SLIP: &str = "cc_slip";

#[derive(Debug, Clone, Default)]
pub(crate) struct StatementReport {
    pub(crate) imported: usize,
    pub(crate) merged_with_sms: usize,
    pub(crate) skipped: usize,
    pub(crate) receipts_linked: usize,
    pub(crate) failed: usize,
    pub(crate) detail: String,
}

enum RowOutcome {
    Imported(i64),
    MergedWithSms(i64),
    Skipped,
}

/// A statement line expressed in the ledger currency.
struct LocalLine<'a> {
    amount: Decimal,
    currency: &'a str,
    original: Option<(Decimal, &'a str)>,
}

fn localize<'a>(
    row: &'a ParsedTransaction,
    settings: &'a Settings,
    rates: &Arc<dyn RateSource>,
) -> LocalLine<'a> {
    let declared = match (row.original_amount, row.original_currency.as_deref()) {
        (Some(amount), Some(currency)) => Some((amount, currency)),
        _ => None,
    };
    if row.currency.eq_ignore_ascii_case(&settings.local_currency) || declared.is_some() {
        return LocalLine {
            amount: row.amount,
            currency: &row.currency,
            original: declared,
        };
    }

    let timeout = Duration::from_millis(settings.rate_timeout_ms);
    let rate = rate_or_parity(rates, &row.currency, &settings.local_currency, timeout);
    debug!(currency = %row.currency, %rate, "Converting statement line");
    LocalLine {
        amount: (row.amount * rate).round_dp(2),
        currency: &settings.local_currency,
        original: Some((row.amount.abs(), &row.currency)),
    }
}

/// Everything shared by the lines of one statement file.
struct StatementRun<'a> {
    db: &'a Database,
    household_id: i64,
    source_file: &'a str,
    source: &'a str,
    settings: &'a Settings,
    rates: &'a Arc<dyn RateSource>,
    now: DateTime<Utc>,
}

fn ingest_row(run: &StatementRun<'_>, row: &ParsedTransaction, source_row: i64) -> Result<RowOutcome> {
    let StatementRun {
        db,
        household_id,
        source_file,
        source,
        settings,
        rates,
        now,
    } = *run;
    if db
        .find_transaction_by_source_row(household_id, source_file, source_row)?
        .is_some()
    {
        return Ok(RowOutcome::Skipped);
    }

    let line = localize(row, settings, rates);

    let slip = SlipEvidence {
        date: row.date,
        amount: line.amount,
        currency: line.currency,
        merchant_raw: &row.merchant_raw,
        original: line.original,
        card_ending: row.card_ending.as_deref(),
        source_file: Some(source_file),
        source_row: Some(source_row),
    };
    // SMS alerts only ever announce card charges.
    let sms_match = if line.amount < Decimal::ZERO && !is_app_source(source) {
        find_sms_for_slip(db, household_id, &slip)?
    } else {
        None
    };
    if let Some(found) = sms_match {
        debug!(sms_id = ?found.sms.id, score = found.score, "Statement line matches SMS");
        let id = merge_slip_into_sms(db, &found.sms, &slip, now)?;
        return Ok(RowOutcome::MergedWithSms(id));
    }

    let mut txn = Transaction::new(
        household_id,
        row.date,
        line.amount,
        line.currency.to_string(),
        row.merchant_raw.clone(),
        source.to_string(),
    );
    txn.tx_type = row.tx_type;
    if let Some((amount, currency)) = line.original {
        txn.original_amount = Some(amount);
        txn.original_currency = Some(currency.to_string());
    }
    txn.source_file = Some(source_file.to_string());
    txn.source_row = Some(source_row);
    Ok(RowOutcome::Imported(db.insert_transaction(&txn)?))
}

/// Bring parsed statement lines into the ledger.
///
/// Lines already imported from the same file are skipped. A card line that
/// confirms an SMS alert is folded into the provisional row; anything else
/// becomes a new pending transaction tagged with `source`. Lines from a
/// payment app (`screenshot` and friends) never merge with SMS alerts.
/// Afterwards open receipts are matched against every touched row. One bad
/// line never stops the rest.
#[allow(clippy::too_many_arguments)]
pub(crate) fn ingest_statement(
    db: &mut Database,
    household_id: i64,
    rows: &[ParsedTransaction],
    source_file: &str,
    source: &str,
    settings: &Settings,
    rates: &Arc<dyn RateSource>,
    now: DateTime<Utc>,
) -> Result<StatementReport> {
    let mut report = StatementReport::default();
    let mut touched: Vec<i64> = Vec::new();

    let run = StatementRun {
        db: &*db,
        household_id,
        source_file,
        source,
        settings,
        rates,
        now,
    };
    for (i, row) in rows.iter().enumerate() {
        let source_row = i as i64 + 1;
        match ingest_row(&run, row, source_row) {
            Ok(RowOutcome::Imported(id)) => {
                report.imported += 1;
                touched.push(id);
            }
            Ok(RowOutcome::MergedWithSms(id)) => {
                report.merged_with_sms += 1;
                touched.push(id);
            }
            Ok(RowOutcome::Skipped) => report.skipped += 1,
            Err(e) => {
                warn!(source_file, source_row, "Statement line failed: {e:#}");
                report.failed += 1;
            }
        }
    }

    if !touched.is_empty() {
        let txns = db.get_transactions_by_ids(&touched)?;
        match match_new_transactions(db, household_id, &txns, &settings.fx_bands()) {
            Ok(matches) => report.receipts_linked = link_matches(db, &matches, now).linked,
            Err(e) => warn!(household_id, "Receipt matching after import failed: {e:#}"),
        }
    }

    report.detail = format!(
        "{} imported, {} merged with SMS, {} already imported, {} receipts linked, {} failed",
        report.imported,
        report.merged_with_sms,
        report.skipped,
        report.receipts_linked,
        report.failed
    );
    info!(household_id, source_file, "{}", report.detail);
    Ok(report)
}

/// Read a CSV statement, recognize its layout and ingest it. An explicit
/// profile overrides detection.
#[allow(clippy::too_many_arguments)]
pub(crate) fn import_statement_file(
    db: &mut Database,
    household_id: i64,
    path: &Path,
    profile: Option<CsvProfile>,
    source: &str,
    settings: &Settings,
    rates: &Arc<dyn RateSource>,
    now: DateTime<Utc>,
) -> Result<StatementReport> {
    let (headers, rows) = CsvImporter::preview(path)?;
    let profile = match profile {
        Some(p) => p,
        None => detect_statement_format(&headers).with_context(|| {
            format!("Unrecognized statement layout in {}", path.display())
        })?,
    };
    info!(format = %profile.name, path = %path.display(), source, "Importing statement");

    let parsed = CsvImporter::parse(&rows, &profile, &settings.local_currency)?;
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    ingest_statement(db, household_id, &parsed, &source_file, source, settings, rates, now)
}

#[cfg(test)]
#[path = "statement_tests.rs"]
mod tests;
