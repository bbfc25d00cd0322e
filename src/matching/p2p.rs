use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use crate::db::Database;
use crate::models::{Transaction, TxStatus};

/// Statement text must name one of these for a peer payment to match.
pub(crate) const P2P_KEYWORDS: &[&str] = &["bit", "ביט", "paybox", "פייבוקס", "pepper", "פפר"];

/// Provenance tags of rows read from app screenshots.
const APP_SOURCES: &[&str] = &["screenshot", "image", "ocr", "app_upload"];

/// The statement may post up to a day before and a week after the app
/// shows the payment.
const DAYS_BEFORE: i64 = 1;
const DAYS_AFTER: i64 = 7;

const BASE_CONFIDENCE: u8 = 90;
const CLOSE_DATE_CONFIDENCE: u8 = 95;
const EXACT_AMOUNT_BONUS: u8 = 2;
const MAX_CONFIDENCE: u8 = 99;

/// Whether a provenance tag marks rows read from a payment app.
pub(crate) fn is_app_source(source: &str) -> bool {
    let source = source.to_lowercase();
    APP_SOURCES.iter().any(|s| source.contains(s))
}

pub(crate) fn is_app_side(txn: &Transaction) -> bool {
    is_app_source(&txn.source)
}

pub(crate) fn has_p2p_keyword(merchant: &str) -> bool {
    let lower = merchant.to_lowercase();
    P2P_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// A proposed pairing of an app payment with its statement line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct P2pMatch {
    pub(crate) app_transaction_id: i64,
    pub(crate) cc_transaction_id: i64,
    pub(crate) confidence: u8,
    pub(crate) reason: String,
}

/// An app payment with several plausible statement lines, left for a
/// person to decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AmbiguousP2p {
    pub(crate) app_transaction_id: i64,
    pub(crate) candidate_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct P2pReport {
    pub(crate) matches: Vec<P2pMatch>,
    pub(crate) ambiguous: Vec<AmbiguousP2p>,
    pub(crate) detail: String,
}

fn is_candidate(app: &Transaction, cc: &Transaction) -> bool {
    let gap = (cc.date - app.date).num_days();
    (cc.abs_amount() - app.abs_amount()).abs() <= Decimal::ONE
        && (-DAYS_BEFORE..=DAYS_AFTER).contains(&gap)
        && (has_p2p_keyword(&cc.merchant_raw)
            || cc.merchant_normalized.as_deref().is_some_and(has_p2p_keyword))
}

fn confidence(app: &Transaction, cc: &Transaction) -> u8 {
    let gap = (cc.date - app.date).num_days().abs();
    let mut score = if gap <= 1 {
        CLOSE_DATE_CONFIDENCE
    } else {
        BASE_CONFIDENCE
    };
    if cc.abs_amount() == app.abs_amount() {
        score += EXACT_AMOUNT_BONUS;
    }
    score.min(MAX_CONFIDENCE)
}

/// Pair app-side payments with statement lines. Only an app payment with
/// exactly one surviving candidate gets a proposal.
pub(crate) fn find_p2p_matches(txns: &[Transaction]) -> P2pReport {
    let live: Vec<&Transaction> = txns
        .iter()
        .filter(|t| t.is_expense() && !t.is_duplicate && t.id.is_some())
        .collect();
    let (app_side, cc_side): (Vec<&Transaction>, Vec<&Transaction>) =
        live.into_iter().partition(|t| is_app_side(t));

    let mut report = P2pReport::default();
    for app in app_side {
        let candidates: Vec<&Transaction> = cc_side
            .iter()
            .copied()
            .filter(|cc| is_candidate(app, cc))
            .collect();
        let (Some(app_id), [cc]) = (app.id, candidates.as_slice()) else {
            if candidates.len() > 1 {
                report.ambiguous.push(AmbiguousP2p {
                    app_transaction_id: app.id.unwrap_or_default(),
                    candidate_ids: candidates.iter().filter_map(|c| c.id).collect(),
                });
            }
            continue;
        };
        let Some(cc_id) = cc.id else {
            continue;
        };
        report.matches.push(P2pMatch {
            app_transaction_id: app_id,
            cc_transaction_id: cc_id,
            confidence: confidence(app, cc),
            reason: format!(
                "{} {} on {} matches statement line '{}' on {}",
                app.display_merchant(),
                app.abs_amount(),
                app.date,
                cc.merchant_raw,
                cc.date
            ),
        });
    }

    report.detail = format!(
        "{} peer payments matched, {} need manual review",
        report.matches.len(),
        report.ambiguous.len()
    );
    report
}

pub(crate) fn reconcile_p2p(db: &Database, household_id: i64) -> Result<P2pReport> {
    let txns = db.get_household_transactions(household_id)?;
    let report = find_p2p_matches(&txns);
    info!(household_id, "{}", report.detail);
    Ok(report)
}

/// Fold an app payment into its statement line.
///
/// The app row is soft-deleted onto the statement row first, then the
/// statement row takes the app's merchant and category. Re-running after a
/// partial failure converges on the same result.
pub(crate) fn merge_p2p(
    db: &Database,
    app_id: i64,
    cc_id: i64,
    category_override: Option<&str>,
) -> Result<()> {
    if app_id == cc_id {
        bail!("Cannot merge transaction {app_id} into itself");
    }
    let mut app = db
        .get_transaction(app_id)?
        .with_context(|| format!("App transaction {app_id} not found"))?;
    let mut cc = db
        .get_transaction(cc_id)?
        .with_context(|| format!("Statement transaction {cc_id} not found"))?;
    if app.household_id != cc.household_id {
        bail!("Cannot merge transactions from different households");
    }

    app.is_duplicate = true;
    app.duplicate_of = Some(cc_id);
    app.status = TxStatus::Verified;
    db.update_transaction(&app)?;

    let app_merchant = app.display_merchant().trim().to_string();
    if !app_merchant.is_empty() {
        cc.merchant_normalized = Some(app_merchant);
    }

    if let Some(category) = category_override {
        cc.category = Some(category.to_string());
        cc.category_source = Some("user".into());
    } else if app.category.is_some() {
        cc.category = app.category.clone();
        cc.category_source = app.category_source.clone();
    }

    let annotation = format!("Statement text: {}", cc.merchant_raw);
    for note in [app.notes.trim(), annotation.as_str()] {
        if note.is_empty() || cc.notes.contains(note) {
            continue;
        }
        if !cc.notes.is_empty() {
            cc.notes.push_str(" | ");
        }
        cc.notes.push_str(note);
    }

    cc.status = TxStatus::Verified;
    db.update_transaction(&cc)?;

    info!(app_id, cc_id, "Merged peer payment into statement line");
    Ok(())
}

#[cfg(test)]
#[path = "p2p_tests.rs"]
mod tests;
