use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::parser::SmsCandidate;
use crate::db::Database;
use crate::models::{timestamp, SmsTransaction, Transaction, TxStatus, TxType};

const SMS_SOURCE: &str = "sms";

const BASE_SCORE: u8 = 50;
const SAME_DAY_BONUS: u8 = 30;
const NEXT_DAY_BONUS: u8 = 20;
const CARD_BONUS: u8 = 15;
const ACCEPT_SCORE: u8 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IngestOutcome {
    Created { transaction_id: i64, sms_id: i64 },
    /// The gateway redelivered an alert we already hold.
    Duplicate { existing_sms_id: i64 },
    /// Not enough evidence to record anything.
    Rejected { confidence: u8 },
}

/// Record an accepted SMS: a provisional ledger row first, then the SMS row
/// pointing at it, then the back-reference.
pub(crate) fn ingest_sms(
    db: &Database,
    household_id: i64,
    candidate: &SmsCandidate,
    received_at: DateTime<Utc>,
    duplicate_window: Duration,
) -> Result<IngestOutcome> {
    let amount = match candidate.amount {
        Some(a) if candidate.is_valid => a.abs(),
        _ => {
            debug!(confidence = candidate.confidence, "SMS below threshold, not recorded");
            return Ok(IngestOutcome::Rejected {
                confidence: candidate.confidence,
            });
        }
    };

    let since = timestamp(received_at - duplicate_window);
    if let Some(existing) = db.find_recent_sms(
        household_id,
        candidate.card_ending.as_deref(),
        amount,
        candidate.transaction_date,
        &since,
    )? {
        info!(sms_id = existing, "Duplicate SMS delivery ignored");
        return Ok(IngestOutcome::Duplicate {
            existing_sms_id: existing,
        });
    }

    let merchant = candidate.merchant_name.clone().unwrap_or_default();
    let mut txn = Transaction::new(
        household_id,
        candidate.transaction_date,
        -amount,
        candidate.currency.clone(),
        merchant.clone(),
        SMS_SOURCE.into(),
    );
    txn.status = TxStatus::Provisional;
    txn.tx_type = TxType::Expense;
    let transaction_id = db
        .insert_transaction(&txn)
        .context("Failed to create provisional transaction")?;

    let sms = SmsTransaction {
        id: None,
        household_id,
        provider: candidate.provider.as_str().into(),
        card_ending: candidate.card_ending.clone(),
        merchant_name: candidate.merchant_name.clone(),
        amount,
        currency: candidate.currency.clone(),
        transaction_date: candidate.transaction_date,
        raw_message: candidate.raw_message.clone(),
        transaction_id,
        cc_matched: false,
        cc_matched_at: None,
        received_at: timestamp(received_at),
    };
    let sms_id = match db.insert_sms(&sms) {
        Ok(id) => id,
        Err(e) => {
            if let Err(cleanup) = db.delete_transaction(transaction_id) {
                warn!(transaction_id, "Failed to remove orphan transaction: {cleanup:#}");
            }
            return Err(e.context("Failed to record SMS"));
        }
    };
    db.set_transaction_sms_id(transaction_id, sms_id)?;

    info!(transaction_id, sms_id, %merchant, "Provisional transaction from SMS");
    Ok(IngestOutcome::Created {
        transaction_id,
        sms_id,
    })
}

/// The SMS a statement line confirms, with its score.
#[derive(Debug, Clone)]
pub(crate) struct SmsMatch {
    pub(crate) sms: SmsTransaction,
    pub(crate) score: u8,
}

/// Whether the SMS announced the same charge as the statement line: either
/// the settled amount or the declared original, each in its own currency.
fn same_charge(sms: &SmsTransaction, slip: &SlipEvidence<'_>) -> bool {
    let same = |amount: Decimal, currency: &str| {
        sms.amount.abs() == amount.abs() && sms.currency.eq_ignore_ascii_case(currency)
    };
    same(slip.amount, slip.currency) || slip.original.is_some_and(|(a, c)| same(a, c))
}

/// Score one unmatched SMS against a statement line. `None` when the SMS
/// cannot be the same purchase at all.
pub(crate) fn score_sms(sms: &SmsTransaction, slip: &SlipEvidence<'_>) -> Option<u8> {
    if !same_charge(sms, slip) {
        return None;
    }
    let mut score = BASE_SCORE;
    match (sms.transaction_date - slip.date).num_days().abs() {
        0 => score += SAME_DAY_BONUS,
        1 => score += NEXT_DAY_BONUS,
        _ => return None,
    }
    if let Some(card) = slip.card_ending {
        if sms.card_ending.as_deref() != Some(card) {
            return None;
        }
        score += CARD_BONUS;
    }
    Some(score)
}

/// Best unmatched SMS for a statement line, only if it clears the
/// acceptance score. Weaker candidates never auto-link.
pub(crate) fn find_sms_for_slip(
    db: &Database,
    household_id: i64,
    slip: &SlipEvidence<'_>,
) -> Result<Option<SmsMatch>> {
    let candidates = db.get_unmatched_sms_between(
        household_id,
        slip.date - Duration::days(1),
        slip.date + Duration::days(1),
    )?;

    let mut best: Option<SmsMatch> = None;
    for sms in candidates {
        let Some(score) = score_sms(&sms, slip) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(SmsMatch { sms, score });
        }
    }

    Ok(best.filter(|m| m.score >= ACCEPT_SCORE))
}

fn has_local_script(s: &str) -> bool {
    s.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c))
}

/// Pick the better merchant text: the one in local script, otherwise the
/// longer one. Ties go to the statement.
pub(crate) fn better_merchant<'a>(sms: &'a str, statement: &'a str) -> &'a str {
    match (has_local_script(sms), has_local_script(statement)) {
        (true, false) => sms,
        (false, true) => statement,
        _ if sms.trim().chars().count() > statement.trim().chars().count() => sms,
        _ => statement,
    }
}

/// Statement-side facts that confirm a provisional row.
#[derive(Debug, Clone)]
pub(crate) struct SlipEvidence<'a> {
    pub(crate) date: NaiveDate,
    pub(crate) amount: Decimal,
    pub(crate) currency: &'a str,
    pub(crate) merchant_raw: &'a str,
    pub(crate) original: Option<(Decimal, &'a str)>,
    pub(crate) card_ending: Option<&'a str>,
    pub(crate) source_file: Option<&'a str>,
    pub(crate) source_row: Option<i64>,
}

/// Fold a confirmed statement line into the SMS-born transaction.
///
/// The statement wins on amount and date; categorization is never touched.
/// Marking the SMS as matched is best-effort.
pub(crate) fn merge_slip_into_sms(
    db: &Database,
    sms: &SmsTransaction,
    slip: &SlipEvidence<'_>,
    now: DateTime<Utc>,
) -> Result<i64> {
    let mut txn = db
        .get_transaction(sms.transaction_id)?
        .with_context(|| format!("Transaction {} for SMS not found", sms.transaction_id))?;

    let sms_merchant = sms.merchant_name.as_deref().unwrap_or(&txn.merchant_raw);
    let merchant = better_merchant(sms_merchant, slip.merchant_raw).to_string();

    // An SMS in a foreign currency becomes the original charge once the
    // statement settles it locally.
    let original = slip
        .original
        .map(|(a, c)| (a, c.to_string()))
        .or_else(|| Some((txn.amount.abs(), txn.currency.clone())))
        .filter(|(_, c)| !c.eq_ignore_ascii_case(slip.currency));
    if let Some((amount, currency)) = original {
        txn.original_amount = Some(amount);
        txn.original_currency = Some(currency);
    }

    txn.date = slip.date;
    txn.amount = slip.amount;
    txn.currency = slip.currency.to_string();
    txn.merchant_raw = merchant;
    txn.status = TxStatus::Pending;
    txn.source_file = slip.source_file.map(str::to_string);
    txn.source_row = slip.source_row;
    db.update_transaction(&txn)?;

    if let Some(sms_id) = sms.id {
        if let Err(e) = db.mark_sms_cc_matched(sms_id, &timestamp(now)) {
            warn!(sms_id, "Could not mark SMS as matched: {e:#}");
        }
    }

    info!(transaction_id = sms.transaction_id, "Statement line confirmed SMS transaction");
    Ok(sms.transaction_id)
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StaleReport {
    pub(crate) stale: Vec<SmsTransaction>,
    pub(crate) flagged: usize,
    pub(crate) detail: String,
}

/// Surface SMS rows still unmatched after `max_age` and flag their
/// transactions if nobody resolved them yet.
pub(crate) fn sweep_stale(
    db: &Database,
    household_id: i64,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<StaleReport> {
    let cutoff = timestamp(now - max_age);
    let stale = db.get_stale_sms(household_id, &cutoff)?;

    let mut flagged = 0;
    for sms in &stale {
        match db.flag_if_provisional(sms.transaction_id) {
            Ok(true) => flagged += 1,
            Ok(false) => {}
            Err(e) => warn!(transaction_id = sms.transaction_id, "Failed to flag: {e:#}"),
        }
    }

    let detail = format!(
        "{} unmatched SMS older than {} days, {} flagged for review",
        stale.len(),
        max_age.num_days(),
        flagged
    );
    info!("{detail}");
    Ok(StaleReport {
        stale,
        flagged,
        detail,
    })
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
