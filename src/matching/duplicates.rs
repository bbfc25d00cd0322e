use anyhow::{bail, Result};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::db::Database;
use crate::models::{Transaction, TxStatus, TxType};

/// Rows more than this many days apart are never duplicates.
const WINDOW_DAYS: i64 = 3;

const NOTES_SEPARATOR: &str = " | ";

/// Transactions believed to record the same event. The first member is the
/// merge primary.
#[derive(Debug, Clone)]
pub(crate) struct DuplicateGroup {
    pub(crate) key: String,
    pub(crate) members: Vec<Transaction>,
}

impl DuplicateGroup {
    pub(crate) fn ids(&self) -> Vec<i64> {
        self.members.iter().filter_map(|t| t.id).collect()
    }
}

fn amounts_close(a: &Transaction, b: &Transaction) -> bool {
    (a.abs_amount() - b.abs_amount()).abs() <= Decimal::ONE
}

/// Cluster live transactions that look like the same purchase.
///
/// Rows are ordered newest date first, then by creation time. Each
/// unvisited row opens a window over the rows that follow it until the date
/// gap passes three days; every row in that window whose absolute amount is
/// within 1.0 joins its group. Grouped rows are not revisited.
pub(crate) fn find_duplicate_groups(txns: &[Transaction]) -> Vec<DuplicateGroup> {
    let mut sorted: Vec<&Transaction> = txns.iter().filter(|t| !t.is_duplicate).collect();
    sorted.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut visited = vec![false; sorted.len()];
    let mut groups = Vec::new();

    for i in 0..sorted.len() {
        if visited[i] {
            continue;
        }
        let head = sorted[i];
        let mut members = vec![i];

        for (j, candidate) in sorted.iter().enumerate().skip(i + 1) {
            if (head.date - candidate.date).num_days() > WINDOW_DAYS {
                break;
            }
            if !visited[j] && amounts_close(head, candidate) {
                members.push(j);
            }
        }

        if members.len() < 2 {
            continue;
        }
        for &m in &members {
            visited[m] = true;
        }
        groups.push(DuplicateGroup {
            key: format!("{}:{}", head.date, head.id.unwrap_or_default()),
            members: members.into_iter().map(|m| sorted[m].clone()).collect(),
        });
    }

    groups
}

/// Caller choices that beat the automatic merge policy.
#[derive(Debug, Clone, Default)]
pub(crate) struct MergeOverrides {
    pub(crate) notes: Option<String>,
    pub(crate) category: Option<String>,
    pub(crate) tx_type: Option<TxType>,
}

/// The primary row as it should look after absorbing `others`.
pub(crate) fn smart_merge(
    primary: &Transaction,
    others: &[Transaction],
    overrides: &MergeOverrides,
) -> Transaction {
    let mut merged = primary.clone();
    let group = || std::iter::once(primary).chain(others.iter());

    merged.notes = match &overrides.notes {
        Some(notes) => notes.clone(),
        None => {
            let mut seen: Vec<&str> = Vec::new();
            let parts = group().flat_map(|t| t.notes.split(NOTES_SEPARATOR));
            for note in parts.map(str::trim).filter(|n| !n.is_empty()) {
                if !seen.contains(&note) {
                    seen.push(note);
                }
            }
            seen.join(NOTES_SEPARATOR)
        }
    };

    match &overrides.category {
        Some(category) => {
            merged.category = Some(category.clone());
            merged.category_source = Some("user".into());
        }
        None if primary.category.is_some() => {}
        None => {
            if let Some(donor) = others.iter().find(|t| t.category.is_some()) {
                merged.category = donor.category.clone();
                merged.category_source = donor.category_source.clone();
            }
        }
    }

    if primary.merchant_normalized.is_none() {
        merged.merchant_normalized = others
            .iter()
            .find_map(|t| t.merchant_normalized.clone());
    }

    if group().any(|t| t.status == TxStatus::Verified) {
        merged.status = TxStatus::Verified;
    }

    if let Some(tx_type) = overrides.tx_type {
        merged.tx_type = tx_type;
    }

    merged
}

#[derive(Debug, Clone)]
pub(crate) struct MergeOutcome {
    pub(crate) primary_id: i64,
    pub(crate) merged: usize,
    pub(crate) detail: String,
}

/// Merge a confirmed group into its first id.
///
/// Losers are soft-deleted first, then the primary is rewritten. Both
/// steps are plain overwrites, so re-running the same merge after a
/// partial failure finishes the job.
pub(crate) fn merge_group(
    db: &Database,
    ids: &[i64],
    overrides: &MergeOverrides,
) -> Result<MergeOutcome> {
    let Some(&primary_id) = ids.first() else {
        bail!("A merge needs at least two transactions");
    };
    let members = db.get_transactions_by_ids(ids)?;
    if members.len() != ids.len() {
        bail!("Some transactions in {ids:?} do not exist");
    }
    if members.len() < 2 {
        bail!("A merge needs at least two transactions");
    }
    let (primary, others) = members.split_at(1);
    let primary = &primary[0];
    if others.iter().any(|t| t.household_id != primary.household_id) {
        bail!("Cannot merge transactions from different households");
    }

    for other in others {
        let mut loser = other.clone();
        loser.is_duplicate = true;
        loser.duplicate_of = Some(primary_id);
        if let Err(e) = db.update_transaction(&loser) {
            warn!(primary_id, "Merge stopped before rewriting the primary: {e:#}");
            return Err(e);
        }
    }

    let merged = smart_merge(primary, others, overrides);
    db.update_transaction(&merged)?;

    let detail = format!(
        "Merged {} duplicates into transaction {primary_id}",
        others.len()
    );
    info!("{detail}");
    Ok(MergeOutcome {
        primary_id,
        merged: others.len(),
        detail,
    })
}

#[cfg(test)]
#[path = "duplicates_tests.rs"]
mod tests;
