mod rules;

pub(crate) use rules::{CategoryRule, RuleClassifier};

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::models::{Category, MerchantMemory, Transaction, TxStatus};

/// Classifier confidence at or above this is trusted without review.
pub(crate) const TRUSTED_CONFIDENCE: u8 = 70;

pub(crate) const SOURCE_MEMORY: &str = "memory";
pub(crate) const SOURCE_CLASSIFIER: &str = "classifier";
pub(crate) const SOURCE_USER: &str = "user";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClassifyRequest {
    pub(crate) id: i64,
    pub(crate) merchant_raw: String,
    pub(crate) amount: Decimal,
    pub(crate) currency: String,
}

impl ClassifyRequest {
    fn from_transaction(txn: &Transaction, id: i64) -> Self {
        Self {
            id,
            merchant_raw: txn.merchant_raw.clone(),
            amount: txn.amount,
            currency: txn.currency.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Classification {
    pub(crate) id: i64,
    pub(crate) category: Option<String>,
    pub(crate) merchant_normalized: Option<String>,
    pub(crate) confidence: u8,
    pub(crate) suggestions: Vec<String>,
}

/// Anything that can put a category on a batch of merchants.
///
/// The household memory and the valid vocabulary are passed on every call.
pub(crate) trait CategoryClassifier: Send + Sync {
    fn classify(
        &self,
        batch: &[ClassifyRequest],
        memory: &MerchantMemory,
        vocabulary: &[Category],
    ) -> Result<Vec<Classification>>;
}

/// Map a returned category onto the vocabulary: exact (ignoring case), then
/// the first allowed name it is a prefix of. Anything else is dropped.
pub(crate) fn resolve_category(name: &str, vocabulary: &[Category]) -> Option<String> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    Category::find_by_name(vocabulary, &wanted)
        .or_else(|| {
            vocabulary
                .iter()
                .find(|c| c.name.to_lowercase().starts_with(&wanted))
        })
        .map(|c| c.name.clone())
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CategorizeReport {
    pub(crate) memory_hits: usize,
    pub(crate) categorized: usize,
    pub(crate) flagged: usize,
    pub(crate) failed: usize,
    pub(crate) detail: String,
}

/// Provisional rows keep their status until a statement confirms them.
fn next_status(txn: &Transaction, wanted: TxStatus) -> TxStatus {
    if txn.status == TxStatus::Provisional {
        TxStatus::Provisional
    } else {
        wanted
    }
}

/// One classifier call on a worker thread, abandoned after `timeout`.
fn classify_with_timeout(
    classifier: &Arc<dyn CategoryClassifier>,
    requests: Vec<ClassifyRequest>,
    memory: &Arc<MerchantMemory>,
    vocabulary: &Arc<Vec<Category>>,
    timeout: Duration,
) -> Result<Vec<Classification>> {
    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(classifier);
    let (memory, vocabulary) = (Arc::clone(memory), Arc::clone(vocabulary));
    thread::spawn(move || {
        // The receiver may be gone after a timeout.
        let _ = tx.send(worker.classify(&requests, &memory, &vocabulary));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => bail!("Classifier gave no answer within {} ms", timeout.as_millis()),
    }
}

/// Categorize every open, uncategorized transaction of a household.
///
/// Remembered merchants are applied first. The rest goes to the classifier
/// in chunks; a chunk that fails or outlives `timeout` marks its items
/// failed and the pass moves on.
pub(crate) fn categorize_pending(
    db: &Database,
    household_id: i64,
    classifier: Option<&Arc<dyn CategoryClassifier>>,
    chunk_size: usize,
    timeout: Duration,
) -> Result<CategorizeReport> {
    let txns = db.get_uncategorized_transactions(household_id)?;
    let memory = Arc::new(db.get_merchant_memory(household_id)?);
    let vocabulary = Arc::new(db.get_categories()?);
    let mut report = CategorizeReport::default();
    if !memory.is_empty() {
        debug!(household_id, merchants = memory.len(), "Loaded merchant memory");
    }

    let mut remaining: Vec<&Transaction> = Vec::new();
    for txn in &txns {
        let Some(id) = txn.id else { continue };
        let remembered = memory
            .lookup(txn.display_merchant())
            .or_else(|| memory.lookup(&txn.merchant_raw))
            .and_then(|c| resolve_category(c, &vocabulary));
        let Some(category) = remembered else {
            remaining.push(txn);
            continue;
        };
        let status = next_status(txn, TxStatus::Categorized);
        match db.update_transaction_category(id, Some(&category), Some(SOURCE_MEMORY), status) {
            Ok(()) => report.memory_hits += 1,
            Err(e) => {
                warn!(transaction_id = id, "Failed to apply remembered category: {e:#}");
                report.failed += 1;
            }
        }
    }

    let Some(classifier) = classifier else {
        report.detail = format!(
            "processed memory matches only: {} categorized from memory, {} left for review",
            report.memory_hits,
            remaining.len()
        );
        info!(household_id, "{}", report.detail);
        return Ok(report);
    };

    for chunk in remaining.chunks(chunk_size.max(1)) {
        let requests: Vec<ClassifyRequest> = chunk
            .iter()
            .filter_map(|t| t.id.map(|id| ClassifyRequest::from_transaction(t, id)))
            .collect();
        let items = requests.len();
        let results = match classify_with_timeout(classifier, requests, &memory, &vocabulary, timeout) {
            Ok(results) => results,
            Err(e) => {
                warn!(items, "Classifier call failed: {e:#}");
                report.failed += items;
                continue;
            }
        };
        let by_id: HashMap<i64, Classification> =
            results.into_iter().map(|c| (c.id, c)).collect();

        for txn in chunk {
            let Some(id) = txn.id else { continue };
            let Some(result) = by_id.get(&id) else {
                debug!(transaction_id = id, "Classifier returned nothing for item");
                report.failed += 1;
                continue;
            };
            match apply_classification(db, txn, result, &vocabulary) {
                Ok(TxStatus::Flagged) => report.flagged += 1,
                Ok(_) => report.categorized += 1,
                Err(e) => {
                    warn!(transaction_id = id, "Failed to store classification: {e:#}");
                    report.failed += 1;
                }
            }
        }
    }

    report.detail = format!(
        "{} from memory, {} categorized, {} flagged for review, {} failed",
        report.memory_hits, report.categorized, report.flagged, report.failed
    );
    info!(household_id, "{}", report.detail);
    Ok(report)
}

/// Store one classifier answer. Returns the review outcome: `Flagged` when
/// the category was unusable or the confidence too low.
fn apply_classification(
    db: &Database,
    txn: &Transaction,
    result: &Classification,
    vocabulary: &[Category],
) -> Result<TxStatus> {
    let mut updated = txn.clone();
    let category = result
        .category
        .as_deref()
        .and_then(|c| resolve_category(c, vocabulary));

    let outcome = match &category {
        Some(_) if result.confidence >= TRUSTED_CONFIDENCE => TxStatus::Categorized,
        _ => TxStatus::Flagged,
    };
    if outcome == TxStatus::Flagged && !result.suggestions.is_empty() {
        debug!(
            transaction_id = txn.id,
            "Flagged for review, suggested: {}",
            result.suggestions.join(", ")
        );
    }

    if let Some(category) = category {
        updated.category = Some(category);
        updated.category_source = Some(SOURCE_CLASSIFIER.into());
    }
    if let Some(name) = result
        .merchant_normalized
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        updated.merchant_normalized = Some(name.to_string());
    }
    updated.status = next_status(txn, outcome);
    db.update_transaction(&updated)?;
    Ok(outcome)
}

/// A person confirmed a category: store it on the row and remember the
/// merchant for next time.
pub(crate) fn confirm_category(db: &Database, transaction_id: i64, category: &str) -> Result<String> {
    let vocabulary = db.get_categories()?;
    let resolved = resolve_category(category, &vocabulary)
        .with_context(|| format!("Unknown category '{category}'"))?;
    let txn = db
        .get_transaction(transaction_id)?
        .with_context(|| format!("Transaction {transaction_id} not found"))?;

    db.update_transaction_category(
        transaction_id,
        Some(&resolved),
        Some(SOURCE_USER),
        next_status(&txn, TxStatus::Verified),
    )?;
    db.remember_merchant(txn.household_id, txn.display_merchant(), &resolved)?;
    info!(transaction_id, category = %resolved, "Category confirmed and remembered");
    Ok(resolved)
}
