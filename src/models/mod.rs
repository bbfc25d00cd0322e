mod category;
mod receipt;
mod sms;
mod transaction;

pub use category::{Category, MerchantMemory};
pub use receipt::{EmailReceipt, ReceiptItem};
pub use sms::SmsTransaction;
pub use transaction::{ParsedTransaction, Transaction, TxStatus, TxType};

use chrono::SecondsFormat;

/// Current UTC time as a fixed-width RFC 3339 string.
///
/// Timestamps are stored as text and compared lexicographically, so every
/// writer must use this exact shape.
pub fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn now_timestamp() -> String {
    timestamp(chrono::Utc::now())
}

#[cfg(test)]
mod tests;
