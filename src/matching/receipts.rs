use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::cmp::Reverse;
use tracing::{info, warn};

use super::amount::{match_amounts, AmountMatch, FxBands, Money};
use crate::db::Database;
use crate::models::{timestamp, EmailReceipt, ReceiptItem, Transaction};

/// Receipt and transaction dates may differ by at most this many days.
pub(crate) const DATE_WINDOW_DAYS: i64 = 2;

/// Extra days around a batch when fetching receipts, so rows at the edge of
/// the batch still see their whole window.
const FETCH_BUFFER_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchReason {
    ExactDate,
    DateProximity,
}

impl MatchReason {
    fn from_days(days: i64) -> Self {
        if days == 0 {
            Self::ExactDate
        } else {
            Self::DateProximity
        }
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::ExactDate => "exact_date_match",
            Self::DateProximity => "date_proximity_match",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReceiptMatch {
    pub(crate) receipt_id: i64,
    pub(crate) transaction_id: i64,
    pub(crate) merchant_name: String,
    pub(crate) items: Vec<ReceiptItem>,
    pub(crate) confidence: u8,
    pub(crate) reason: MatchReason,
}

impl ReceiptMatch {
    fn new(receipt: &EmailReceipt, receipt_id: i64, transaction_id: i64, days: i64, step: i64) -> Self {
        let confidence = (100 - step * days).clamp(0, 100) as u8;
        Self {
            receipt_id,
            transaction_id,
            merchant_name: receipt.merchant_name.clone(),
            items: receipt.items.clone(),
            confidence,
            reason: MatchReason::from_days(days),
        }
    }
}

fn compare(receipt: &EmailReceipt, txn: &Transaction, bands: &FxBands) -> AmountMatch {
    match_amounts(
        Money::new(receipt.amount, &receipt.currency),
        Money::new(txn.amount, &txn.currency),
        txn.original().map(|(a, c)| Money::new(a, c)),
        bands,
    )
}

fn day_gap(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

/// Assign receipts to transactions in input order.
///
/// Each transaction takes the closest-dated receipt that matches its
/// amount, and that receipt leaves the pool. Ties go to the receipt that
/// came first in the pool.
pub(crate) fn allocate_receipts(
    txns: &[Transaction],
    mut pool: Vec<EmailReceipt>,
    bands: &FxBands,
) -> Vec<ReceiptMatch> {
    let mut matches = Vec::new();

    for txn in txns {
        let Some(transaction_id) = txn.id else {
            continue;
        };
        if txn.receipt_id.is_some() || txn.is_duplicate {
            continue;
        }

        let best = pool
            .iter()
            .enumerate()
            .filter(|(_, r)| r.id.is_some() && !r.is_matched())
            .filter_map(|(i, r)| {
                let days = day_gap(r.receipt_date, txn.date);
                (days <= DATE_WINDOW_DAYS && compare(r, txn, bands).matches).then_some((i, days))
            })
            .min_by_key(|&(_, days)| days);

        if let Some((index, days)) = best {
            let receipt = pool.remove(index);
            if let Some(receipt_id) = receipt.id {
                matches.push(ReceiptMatch::new(&receipt, receipt_id, transaction_id, days, 10));
            }
        }
    }

    matches
}

/// Match freshly imported transactions against the household's open
/// receipts.
pub(crate) fn match_new_transactions(
    db: &Database,
    household_id: i64,
    txns: &[Transaction],
    bands: &FxBands,
) -> Result<Vec<ReceiptMatch>> {
    let (Some(first), Some(last)) = (
        txns.iter().map(|t| t.date).min(),
        txns.iter().map(|t| t.date).max(),
    ) else {
        return Ok(Vec::new());
    };
    let buffer = Duration::days(FETCH_BUFFER_DAYS);
    let pool = db.get_unmatched_receipts_between(household_id, first - buffer, last + buffer)?;
    Ok(allocate_receipts(txns, pool, bands))
}

/// Pick the transaction a single receipt belongs to.
///
/// An exact foreign-charge match wins outright, then same-currency over a
/// band estimate, then the closest date.
pub(crate) fn best_transaction_for_receipt(
    receipt: &EmailReceipt,
    candidates: &[Transaction],
    bands: &FxBands,
) -> Option<ReceiptMatch> {
    let receipt_id = receipt.id?;
    let (txn, _, days) = candidates
        .iter()
        .filter(|t| t.id.is_some() && t.receipt_id.is_none() && !t.is_duplicate)
        .filter_map(|t| {
            let days = day_gap(receipt.receipt_date, t.date);
            let m = compare(receipt, t, bands);
            (days <= DATE_WINDOW_DAYS && m.matches).then_some((t, m, days))
        })
        .min_by_key(|(_, m, days)| (Reverse(m.strength()), *days))?;

    Some(ReceiptMatch::new(receipt, receipt_id, txn.id?, days, 5))
}

/// Match a freshly arrived receipt against the household's unlinked
/// transactions.
pub(crate) fn match_new_receipt(
    db: &Database,
    receipt: &EmailReceipt,
    bands: &FxBands,
) -> Result<Option<ReceiptMatch>> {
    if receipt.is_matched() {
        return Ok(None);
    }
    let window = Duration::days(DATE_WINDOW_DAYS);
    let candidates = db.get_unlinked_transactions(
        receipt.household_id,
        receipt.receipt_date - window,
        receipt.receipt_date + window,
    )?;
    Ok(best_transaction_for_receipt(receipt, &candidates, bands))
}

#[derive(Debug, Clone, Default)]
pub(crate) struct LinkReport {
    pub(crate) linked: usize,
    pub(crate) failed: usize,
    pub(crate) detail: String,
}

/// Write each match to both sides. A failed link is logged and counted,
/// never retried, and does not stop the remaining links.
pub(crate) fn link_matches(
    db: &mut Database,
    matches: &[ReceiptMatch],
    now: DateTime<Utc>,
) -> LinkReport {
    let matched_at = timestamp(now);
    let mut report = LinkReport::default();

    for m in matches {
        match db.link_receipt(m.receipt_id, m.transaction_id, m.confidence, &matched_at) {
            Ok(()) => {
                report.linked += 1;
                info!(
                    receipt_id = m.receipt_id,
                    transaction_id = m.transaction_id,
                    confidence = m.confidence,
                    reason = m.reason.as_str(),
                    items = m.items.len(),
                    "Linked receipt from {}",
                    m.merchant_name
                );
            }
            Err(e) => {
                report.failed += 1;
                warn!(
                    receipt_id = m.receipt_id,
                    transaction_id = m.transaction_id,
                    "Receipt link failed: {e:#}"
                );
            }
        }
    }

    report.detail = format!("{} receipts linked, {} failed", report.linked, report.failed);
    report
}

#[cfg(test)]
#[path = "receipts_tests.rs"]
mod tests;
