mod amount;
mod duplicates;
mod p2p;
mod receipts;

pub(crate) use amount::{FxBand, FxBands};
pub(crate) use duplicates::{find_duplicate_groups, merge_group, MergeOverrides};
pub(crate) use p2p::{is_app_source, merge_p2p, reconcile_p2p};
pub(crate) use receipts::{link_matches, match_new_receipt, match_new_transactions};
